//! Error types and load result structures for the trigger loader.

use std::path::PathBuf;

/// Errors that can occur while loading trigger documents.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document parsed but breaks a structural invariant.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Outcome of loading a single file.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

#[derive(Debug)]
pub enum LoadStatus {
    /// Document parsed and validated. `triggers` is 0 for disabled documents.
    Loaded { document_id: String, triggers: usize },
    /// Dotfile or unsupported extension.
    Skipped { reason: String },
    /// Parse or validation error; the scan carries on.
    Failed { error: String },
}
