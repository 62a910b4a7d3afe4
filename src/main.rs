//! Command-line driver: load a model, run the selected SSA method, and
//! write the trajectory or the final-state summary.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, Level};

use rxnsim::{Network, SimError, SsaDirect};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Method {
    Direct,
    NextReaction,
    SortedOptimized,
}

impl FromStr for Method {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Method::Direct),
            "next-reaction" => Ok(Method::NextReaction),
            "sorted-optimized" => Ok(Method::SortedOptimized),
            other => Err(SimError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Direct => write!(f, "direct"),
            Method::NextReaction => write!(f, "next-reaction"),
            Method::SortedOptimized => write!(f, "sorted-optimized"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "rxnsim",
    about = "Stochastic simulation of chemical reaction networks (Gillespie SSA)"
)]
struct Cli {
    /// Model file (JSON)
    model: PathBuf,

    /// SSA variant: direct, next-reaction, sorted-optimized
    #[arg(short, long, default_value = "direct")]
    method: String,

    /// Upper bound on the number of reaction events
    #[arg(long, default_value_t = u64::MAX)]
    max_iter: u64,

    /// Upper bound on the simulated time
    #[arg(long, default_value_t = f64::MAX)]
    max_time: f64,

    /// RNG seed; 0 seeds from OS entropy
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Record the state at every event
    #[arg(long, conflicts_with = "sampling")]
    tracing: bool,

    /// Record the state at a time or iteration interval
    #[arg(long)]
    sampling: bool,

    /// Sampling interval in simulated time
    #[arg(long)]
    time_interval: Option<f64>,

    /// Sampling interval in iterations (takes precedence over --time-interval)
    #[arg(long)]
    iter_interval: Option<u64>,

    /// Output file for the trajectory or the final-state summary
    #[arg(short, long, default_value = "trajectory.txt")]
    outfile: String,

    /// Records per trajectory fragment file; 0 writes a single file
    #[arg(long, default_value_t = 0)]
    frag_size: u32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("rxnsim: {err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), SimError> {
    let method: Method = cli.method.parse()?;

    let mut net = Network::load(&cli.model)?;
    net.init()?;

    let mut ssa = match method {
        Method::Direct => SsaDirect::new(net),
        other => {
            return Err(SimError::UnknownMethod(format!(
                "{other} is not available in this build"
            )))
        }
    };

    if cli.tracing {
        ssa.set_tracing(&cli.outfile, cli.frag_size)?;
        info!("tracing enabled");
    } else if cli.sampling {
        match (cli.iter_interval, cli.time_interval) {
            (Some(iters), _) => {
                ssa.set_sampling_iter(iters, &cli.outfile, cli.frag_size)?;
                info!(interval = iters, "sampling at iteration interval");
            }
            (None, Some(dt)) => {
                ssa.set_sampling_time(dt, &cli.outfile, cli.frag_size)?;
                info!(interval = dt, "sampling at time interval");
            }
            (None, None) => {
                return Err(SimError::InvalidArgument(
                    "--sampling requires --time-interval or --iter-interval".into(),
                ))
            }
        }
    }

    ssa.init(cli.max_iter, cli.max_time, cli.seed)?;

    let start = Instant::now();
    let outcome = ssa.run();
    let elapsed = start.elapsed().as_secs_f64();

    match outcome {
        Ok((sim_iter, sim_time)) => {
            info!(elapsed, sim_iter, sim_time, "simulation finished");
        }
        Err(err) => {
            // Salvage whatever was recorded and report the statistics
            // reached before surfacing the failure.
            error!(
                elapsed,
                sim_iter = ssa.sim_iter(),
                sim_time = ssa.sim_time(),
                "simulation failed: {err}"
            );
            let _ = ssa.finalize_recording();
            return Err(err);
        }
    }

    if cli.tracing || cli.sampling {
        ssa.finalize_recording()?;
    } else {
        let mut out = std::fs::File::create(&cli.outfile)?;
        writeln!(out, "Species   : {}", ssa.network().show_species_labels())?;
        writeln!(out, "FinalState: {}", ssa.network().show_species_counts())?;
    }

    Ok(())
}
