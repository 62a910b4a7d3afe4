//! Trajectory recording: full-event tracing and interval sampling, with
//! fragmenting of the on-disk output stream.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SimError;
use crate::network::Network;

/// Internal sentinel for "never fragment".
const FRAG_DISABLED: u32 = u32::MAX;

#[derive(Clone, Debug)]
pub enum RecorderKind {
    /// One record per fired event.
    FullTrace,
    /// One record per simulated-time interval crossing.
    TimeSampler { interval: f64, next_at: f64 },
    /// One record per iteration-count interval crossing.
    IterSampler { interval: u64, next_at: u64 },
}

pub struct TrajectoryRecorder {
    kind: RecorderKind,
    dir: PathBuf,
    stem: String,
    ext: String,
    frag_size: u32,
    cur_frag: u32,
    records_in_frag: u32,
    writer: Option<BufWriter<File>>,
    species_labels: Vec<String>,
    counts: Vec<u64>,
    events_seen: u64,
    num_steps: u64,
}

impl TrajectoryRecorder {
    pub fn trace() -> Self {
        Self::with_kind(RecorderKind::FullTrace)
    }

    pub fn time_sampler(interval: f64) -> Self {
        Self::with_kind(RecorderKind::TimeSampler {
            interval,
            next_at: interval,
        })
    }

    pub fn iter_sampler(interval: u64) -> Self {
        Self::with_kind(RecorderKind::IterSampler {
            interval,
            next_at: interval,
        })
    }

    fn with_kind(kind: RecorderKind) -> Self {
        Self {
            kind,
            dir: PathBuf::new(),
            stem: String::from("trajectory"),
            ext: String::new(),
            frag_size: FRAG_DISABLED,
            cur_frag: 0,
            records_in_frag: 0,
            writer: None,
            species_labels: Vec::new(),
            counts: Vec::new(),
            events_seen: 0,
            num_steps: 0,
        }
    }

    pub fn kind(&self) -> &RecorderKind {
        &self.kind
    }

    /// Number of records emitted so far.
    pub fn num_steps(&self) -> u64 {
        self.num_steps
    }

    /// Split the output path into directory, stem, and extension, and set
    /// how many records go into each fragment file. Size 0 disables
    /// fragmenting.
    pub fn set_outfile(&mut self, outfile: &str, frag_size: u32) -> Result<(), SimError> {
        if frag_size == FRAG_DISABLED {
            return Err(SimError::InvalidFragmentSize(FRAG_DISABLED));
        }
        let path = Path::new(outfile);
        self.dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("trajectory")
            .to_string();
        self.ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        self.frag_size = if frag_size == 0 { FRAG_DISABLED } else { frag_size };
        Ok(())
    }

    fn fragment_path(&self) -> PathBuf {
        if self.frag_size == FRAG_DISABLED {
            self.dir.join(format!("{}{}", self.stem, self.ext))
        } else {
            self.dir
                .join(format!("{}.{}{}", self.stem, self.cur_frag, self.ext))
        }
    }

    /// Snapshot the initial species counts (in species-index order) as
    /// fragment 0's header state and open the first fragment.
    pub fn initialize(&mut self, net: &Network) -> Result<(), SimError> {
        self.species_labels = (0..net.num_species())
            .map(|s| net.species(s).label().to_string())
            .collect();
        self.counts = net.species_counts();
        self.cur_frag = 0;
        self.records_in_frag = 0;
        self.events_seen = 0;
        self.num_steps = 0;
        self.open_fragment()?;
        Ok(())
    }

    fn open_fragment(&mut self) -> Result<(), SimError> {
        let file = File::create(self.fragment_path())?;
        let mut writer = BufWriter::new(file);
        if self.cur_frag == 0 {
            writeln!(writer, "Species: {}", self.species_labels.join(" "))?;
            let counts: Vec<String> = self.counts.iter().map(u64::to_string).collect();
            writeln!(writer, "InitialState: {}", counts.join(" "))?;
        }
        self.writer = Some(writer);
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, SimError> {
        self.writer.as_mut().ok_or_else(|| {
            SimError::InvalidArgument("trajectory recorder used before initialize".into())
        })
    }

    fn emit(&mut self, line: &str) -> Result<(), SimError> {
        // Roll over lazily so a run ending exactly on a fragment boundary
        // does not leave an empty trailing fragment behind.
        if self.records_in_frag >= self.frag_size {
            self.flush()?;
            self.cur_frag += 1;
            self.open_fragment()?;
        }
        let writer = self.writer()?;
        writeln!(writer, "{line}")?;
        self.num_steps += 1;
        self.records_in_frag += 1;
        Ok(())
    }

    /// Append one step to the trajectory: every event for the trace variant,
    /// one record per boundary crossing for the samplers.
    pub fn record_step(
        &mut self,
        t: f64,
        fired_label: &str,
        count_updates: &[(usize, i64)],
    ) -> Result<(), SimError> {
        for &(s, delta) in count_updates {
            if delta < 0 {
                self.counts[s] -= (-delta) as u64;
            } else {
                self.counts[s] += delta as u64;
            }
        }
        self.events_seen += 1;

        match self.kind.clone() {
            RecorderKind::FullTrace => {
                let mut line = format!("{t} {fired_label}");
                for &(s, delta) in count_updates {
                    line.push_str(&format!(" {}:{delta:+}", self.species_labels[s]));
                }
                self.emit(&line)?;
            }
            RecorderKind::TimeSampler { interval, next_at } => {
                let mut next_at = next_at;
                while t >= next_at {
                    let counts: Vec<String> = self.counts.iter().map(u64::to_string).collect();
                    self.emit(&format!("{next_at} {}", counts.join(" ")))?;
                    next_at += interval;
                }
                self.kind = RecorderKind::TimeSampler { interval, next_at };
            }
            RecorderKind::IterSampler { interval, next_at } => {
                // Iterations advance one at a time, so at most one crossing.
                if self.events_seen >= next_at {
                    let counts: Vec<String> = self.counts.iter().map(u64::to_string).collect();
                    self.emit(&format!("{t} {}", counts.join(" ")))?;
                    self.kind = RecorderKind::IterSampler {
                        interval,
                        next_at: next_at + interval,
                    };
                }
            }
        }
        Ok(())
    }

    /// Finalize the current fragment and reset the in-fragment counter.
    pub fn flush(&mut self) -> Result<(), SimError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        self.records_in_frag = 0;
        Ok(())
    }

    /// Flush and close the output stream.
    pub fn finalize(&mut self) -> Result<(), SimError> {
        self.flush()?;
        self.writer = None;
        Ok(())
    }
}
