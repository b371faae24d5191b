//! Error types for the scoring engines

use thiserror::Error;

/// Result type for scoring operations
pub type Result<T> = std::result::Result<T, Error>;

/// Scoring errors
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// History query exceeded its time budget
    #[error("History query timeout in {source_name} after {timeout_ms}ms")]
    HistoryQueryTimeout {
        /// Evaluator or check that issued the query
        source_name: String,
        /// Budget that was exceeded
        timeout_ms: u64,
    },

    /// Currency cannot be converted
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// Customer or merchant could not be resolved
    #[error("Unresolved identity: {0}")]
    UnresolvedIdentity(String),

    /// Optimistic write lost a race against another writer
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    /// Evaluation could not be completed (retries exhausted)
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    /// Transaction record not found in the store
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Upstream collaborator failure (history store, directory, ...)
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Predictive model broke its output contract
    #[error("Model error: {0}")]
    Model(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error is a history/evaluator timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::HistoryQueryTimeout { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(format!("Failed to parse config: {}", err))
    }
}
