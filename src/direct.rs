//! Direct-method SSA scheduler: schedule the next event time, sample which
//! reaction fires, apply it, and propagate to the affected propensities.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::digest::StepDigest;
use crate::error::SimError;
use crate::network::Network;
use crate::propensity::PropensityList;
use crate::rng::{EventRng, RNG_BLOB_SIZE};
use crate::trajectory::TrajectoryRecorder;

const METHOD_TAG: &str = "SSA_Direct";

/// Outcome of scheduling the next event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Schedule {
    /// The next event fires at the given time.
    Success(f64),
    /// No reaction exists to schedule.
    Empty,
    /// No more reaction can fire within the time ceiling.
    Inactive,
}

pub struct SsaDirect {
    net: Network,
    propensity: PropensityList,
    rgen_evt: EventRng,
    rgen_tm: EventRng,
    digests: VecDeque<StepDigest>,
    rollback: bool,
    recorder: Option<TrajectoryRecorder>,
    recording: bool,
    max_iter: u64,
    max_time: f64,
    sim_iter: u64,
    sim_time: f64,
    stop: Arc<AtomicBool>,
}

impl SsaDirect {
    pub fn new(net: Network) -> Self {
        Self {
            net,
            propensity: PropensityList::new(),
            rgen_evt: EventRng::from_entropy(),
            rgen_tm: EventRng::from_entropy(),
            digests: VecDeque::new(),
            rollback: false,
            recorder: None,
            recording: false,
            max_iter: 0,
            max_time: 0.0,
            sim_iter: 0,
            sim_time: 0.0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn network(&self) -> &Network {
        &self.net
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.net
    }

    pub fn propensity(&self) -> &PropensityList {
        &self.propensity
    }

    pub fn sim_iter(&self) -> u64 {
        self.sim_iter
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn max_iter(&self) -> u64 {
        self.max_iter
    }

    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    /// Cooperative stop flag, checked at the top of the run loop. An external
    /// handler may set it; the current step still completes.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Keep per-step digests so firings can be rolled back. Must be enabled
    /// before [`init`](Self::init). Records are then deferred to commit time.
    pub fn enable_rollback(&mut self) {
        self.rollback = true;
    }

    /// Record the state at every event.
    pub fn set_tracing(&mut self, outfile: &str, frag_size: u32) -> Result<(), SimError> {
        let mut rec = TrajectoryRecorder::trace();
        rec.set_outfile(outfile, frag_size)?;
        self.recorder = Some(rec);
        self.recording = true;
        Ok(())
    }

    /// Record the state at every given simulated-time interval.
    pub fn set_sampling_time(
        &mut self,
        interval: f64,
        outfile: &str,
        frag_size: u32,
    ) -> Result<(), SimError> {
        if !interval.is_finite() || interval <= 0.0 {
            return Err(SimError::InvalidArgument(format!(
                "sampling time interval must be positive, got {interval}"
            )));
        }
        let mut rec = TrajectoryRecorder::time_sampler(interval);
        rec.set_outfile(outfile, frag_size)?;
        self.recorder = Some(rec);
        self.recording = true;
        Ok(())
    }

    /// Record the state at every given iteration interval.
    pub fn set_sampling_iter(
        &mut self,
        interval: u64,
        outfile: &str,
        frag_size: u32,
    ) -> Result<(), SimError> {
        if interval == 0 {
            return Err(SimError::InvalidArgument(
                "sampling iteration interval must be positive".into(),
            ));
        }
        let mut rec = TrajectoryRecorder::iter_sampler(interval);
        rec.set_outfile(outfile, frag_size)?;
        self.recorder = Some(rec);
        self.recording = true;
        Ok(())
    }

    pub fn unset_recording(&mut self) {
        self.recorder = None;
        self.recording = false;
    }

    /// Finalize the internal trajectory recorder.
    pub fn finalize_recording(&mut self) -> Result<(), SimError> {
        if let Some(rec) = self.recorder.as_mut() {
            rec.finalize()?;
        }
        Ok(())
    }

    /// Seed the generators, snapshot the initial state into the recorder,
    /// and build the propensity list.
    pub fn init(&mut self, max_iter: u64, max_time: f64, seed: u64) -> Result<(), SimError> {
        if !self.net.is_initialized() {
            return Err(SimError::InvalidNetwork(
                "network must be initialized before the scheduler".into(),
            ));
        }
        self.max_iter = max_iter;
        self.max_time = max_time;
        self.sim_iter = 0;
        self.sim_time = 0.0;

        if seed == 0 {
            self.rgen_evt = EventRng::from_entropy();
            self.rgen_tm = EventRng::from_entropy();
        } else {
            let rank = self.net.partition_id();
            self.rgen_evt = EventRng::from_parts(seed, 1, METHOD_TAG, rank);
            self.rgen_tm = EventRng::from_parts(seed, 2, METHOD_TAG, rank);
        }

        if let Some(rec) = self.recorder.as_mut() {
            rec.initialize(&self.net)?;
        }

        self.propensity.build(&mut self.net);

        self.digests.clear();
        if self.rollback {
            self.digests.push_back(StepDigest::sentinel(self.sim_time));
        }
        Ok(())
    }

    /// Serialized states of the event and time generators, back-to-back.
    pub fn rng_state(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(2 * RNG_BLOB_SIZE);
        self.rgen_evt.save_state(&mut blob);
        self.rgen_tm.save_state(&mut blob);
        blob
    }

    /// Waiting time until the next event: exponential with the total
    /// propensity as rate, or the event-time upper limit when no reaction
    /// has a positive rate.
    fn inter_event_time(&mut self) -> f64 {
        let total = self.propensity.total();
        if total <= 0.0 {
            self.net.etime_ulimit()
        } else {
            -self.rgen_tm.uniform().ln() / total
        }
    }

    /// Determine when the next reaction occurs.
    pub fn schedule(&mut self) -> Schedule {
        if self.propensity.is_empty() {
            debug!("no reaction exists");
            return Schedule::Empty;
        }
        let dt = self.inter_event_time();
        let next_time = self.sim_time + dt;
        if dt >= self.net.etime_ulimit() || next_time > self.max_time {
            debug!("no more reaction can fire");
            return Schedule::Inactive;
        }
        Schedule::Success(next_time)
    }

    /// Execute one event at the scheduled time: sample the reaction, fire
    /// it, and refresh the affected propensities. Returns false without
    /// firing when an iteration or time ceiling is reached.
    pub fn forward(&mut self, next_time: f64) -> Result<bool, SimError> {
        if self.sim_iter >= self.max_iter || next_time > self.max_time {
            return Ok(false);
        }
        self.sim_iter += 1;
        self.sim_time = next_time;

        let mut digest = StepDigest {
            sim_time: next_time,
            ..StepDigest::default()
        };
        // RNG states are captured before the selection draw so a rollback
        // replays the same choice.
        self.rgen_evt.save_state(&mut digest.rng_state);
        self.rgen_tm.save_state(&mut digest.rng_state);

        let u = self.rgen_evt.uniform();
        let fired = self.propensity.sample(u)?;
        digest.fired = Some(fired);

        self.net.fire(fired, &mut digest)?;
        self.propensity
            .refresh(&mut self.net, fired, &digest.affected, true);

        if self.rollback {
            self.digests.push_back(digest);
        } else if self.recording {
            let Self { recorder, net, .. } = self;
            if let Some(rec) = recorder.as_mut() {
                rec.record_step(
                    digest.sim_time,
                    net.reaction(fired).label(),
                    &digest.count_updates,
                )?;
            }
        }
        Ok(true)
    }

    /// Undo the most recent firing: restore species counts, propensities,
    /// RNG states, and the simulation clock. Returns the time at which the
    /// undone event had been scheduled.
    pub fn backward(&mut self) -> Result<f64, SimError> {
        // The front digest is the bootstrap sentinel; it cannot be undone.
        if self.digests.len() < 2 {
            return Err(SimError::NoPriorEvent);
        }
        let digest = match self.digests.pop_back() {
            Some(d) => d,
            None => return Err(SimError::NoPriorEvent),
        };
        let fired = match digest.fired {
            Some(r) => r,
            None => {
                self.digests.push_back(digest);
                return Err(SimError::NoPriorEvent);
            }
        };

        self.net.undo(fired)?;
        self.propensity
            .refresh(&mut self.net, fired, &digest.affected, false);
        self.rgen_evt.restore_state(&digest.rng_state[..RNG_BLOB_SIZE])?;
        self.rgen_tm.restore_state(&digest.rng_state[RNG_BLOB_SIZE..])?;

        self.sim_iter -= 1;
        self.sim_time = match self.digests.back() {
            Some(prior) => prior.sim_time,
            None => return Err(SimError::NoPriorEvent),
        };
        Ok(digest.sim_time)
    }

    /// Commit up to `n` of the oldest buffered digests into the recorder,
    /// in event order, and drop them from the digest list. The newest
    /// committed digest becomes the new bootstrap sentinel.
    pub fn record_first_n(&mut self, n: u64) -> Result<(), SimError> {
        if self.digests.len() < 2 {
            return Ok(());
        }
        let n = (n as usize).min(self.digests.len() - 1);
        if self.recording {
            let Self {
                digests,
                recorder,
                net,
                ..
            } = self;
            if let Some(rec) = recorder.as_mut() {
                for d in digests.iter().skip(1).take(n) {
                    if let Some(fired) = d.fired {
                        rec.record_step(d.sim_time, net.reaction(fired).label(), &d.count_updates)?;
                    }
                }
            }
        }
        self.digests.drain(..n);
        Ok(())
    }

    /// Drive the simulation until a ceiling is hit, no reaction can fire,
    /// or the stop flag is raised. Returns the iteration count and the
    /// simulated time reached.
    pub fn run(&mut self) -> Result<(u64, f64), SimError> {
        info!(
            max_iter = self.max_iter,
            max_time = self.max_time,
            reactions = self.propensity.len(),
            "starting SSA Direct run"
        );
        let mut outcome = self.schedule();
        while let Schedule::Success(t) = outcome {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested, ending run");
                break;
            }
            if !self.forward(t)? {
                break;
            }
            outcome = self.schedule();
        }
        if self.rollback {
            self.record_first_n(self.sim_iter)?;
        }
        info!(
            sim_iter = self.sim_iter,
            sim_time = self.sim_time,
            "run complete"
        );
        Ok((self.sim_iter, self.sim_time))
    }
}
