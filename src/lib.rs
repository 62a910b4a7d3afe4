//! Event-driven stochastic simulation of chemical reaction networks using
//! the Gillespie Direct method, with per-step rollback digests and
//! fragmented trajectory recording.

mod digest;
mod direct;
mod ensemble;
mod error;
mod model;
mod network;
mod propensity;
mod rate;
mod rng;
mod trajectory;

pub use digest::StepDigest;
pub use direct::{Schedule, SsaDirect};
pub use ensemble::{run_ensemble, EnsembleOptions, ReplicaResult};
pub use error::SimError;
pub use model::{ModelFile, ReactionDef, SpeciesDef};
pub use network::{
    Network, PartitionId, Reaction, ReactionIndex, Species, SpeciesIndex, StoichEdge,
};
pub use propensity::PropensityList;
pub use rate::{RateLaw, RateLawSpec};
pub use rng::{derive_seed, EventRng, RNG_BLOB_SIZE, RNG_STATE_SIZE};
pub use trajectory::{RecorderKind, TrajectoryRecorder};
