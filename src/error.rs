use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid network: {0}")]
    InvalidNetwork(String),
    #[error("invalid model format: {0}")]
    InvalidFormat(String),
    #[error("unresolved symbol '{symbol}' in rate law of reaction '{reaction}'")]
    MissingSymbol { symbol: String, reaction: String },
    #[error("no eligible reaction to fire")]
    NoEligibleReaction,
    #[error("no prior event to roll back")]
    NoPriorEvent,
    #[error("fragment size must be less than {0}")]
    InvalidFragmentSize(u32),
    #[error("trajectory I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown SSA method '{0}'")]
    UnknownMethod(String),
    #[error("firing reaction '{reaction}' would drive species '{species}' negative")]
    StoichiometryUnderflow { reaction: String, species: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}
