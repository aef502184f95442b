use thiserror::Error;

pub type Result<T> = std::result::Result<T, JournalError>;

/// Failure taxonomy for the classify-and-persist pipeline
#[derive(Debug, Error)]
pub enum JournalError {
    /// Malformed or out-of-bounds input, raised before any write
    #[error("validation failed: {0}")]
    Validation(String),

    /// A fragment's type label matched no known synonym
    #[error("invalid segment type: {0:?}")]
    InvalidSegmentType(String),

    /// Decoded classifier payload has no usable `segments` array
    #[error("invalid response structure: {0}")]
    InvalidResponseStructure(String),

    /// Classifier payload could not be decoded at all
    #[error("failed to parse classifier response: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database connection lock poisoned")]
    LockPoisoned,
}

impl JournalError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        JournalError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for errors caused by the caller's input rather than the store
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            JournalError::Validation(_)
                | JournalError::InvalidSegmentType(_)
                | JournalError::InvalidResponseStructure(_)
                | JournalError::Parse(_)
        )
    }
}
