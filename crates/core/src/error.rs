use thiserror::Error;

pub type RecResult<T> = Result<T, RecError>;

#[derive(Error, Debug)]
pub enum RecError {
    /// The storage collaborator was unreachable or returned nothing usable.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Malformed ids, unknown interaction kinds, non-positive limits.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A scorer ran but produced zero candidates.
    #[error("Computation degraded: {0}")]
    ComputationDegraded(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RecError {
    /// Degraded results are expected (cold users, sparse catalogs) and are
    /// logged at a lower level than genuine failures.
    pub fn is_degraded(&self) -> bool {
        matches!(self, RecError::ComputationDegraded(_))
    }
}
