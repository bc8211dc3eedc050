use thiserror::Error;

/// Errors raised by the storage collaborators (assignment and occurrence stores).
#[derive(Error, Debug)]
pub enum PaywallError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for PaywallError {
    fn from(e: serde_json::Error) -> Self {
        PaywallError::Serialize(e.to_string())
    }
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, PaywallError>;
