use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ComplianceError {
    #[error("Reference list not loaded: {0}")]
    ListNotLoaded(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error(transparent)]
    Core(#[from] scoring_core::Error),
}

pub type Result<T> = std::result::Result<T, ComplianceError>;

impl From<ComplianceError> for scoring_core::Error {
    fn from(err: ComplianceError) -> Self {
        match err {
            ComplianceError::Core(inner) => inner,
            ComplianceError::InvalidPattern(msg) => scoring_core::Error::Configuration(msg),
            other => scoring_core::Error::Collaborator(other.to_string()),
        }
    }
}
