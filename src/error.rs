use thiserror::Error;

/// Stable error kinds surfaced by declaration-time and test-only read operations.
///
/// The hot write path (`Set`/`AddToInt`/`AddToDistribution`/...) never returns this type: writes
/// against an undefined metric are dropped and rate-limited-logged instead, per the propagation
/// policy of the write path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TszError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("out of memory")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, TszError>;
