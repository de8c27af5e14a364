use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the clickstream preparation pipeline.
#[derive(Error, Debug)]
pub enum PrepError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The course-structure table is unusable.
    #[error("Invalid course structure: {0}")]
    Structure(String),

    /// A configuration value is missing or invalid. Aborts the run before any
    /// user is processed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single user's pipeline exceeded its time budget.
    #[error("Processing user {user_id} timed out after {seconds}s")]
    UserTimeout { user_id: String, seconds: u64 },

    /// A user id that cannot be used as an output file name.
    #[error("User id {0:?} is not a valid file name")]
    InvalidUserId(String),

    /// A worker task panicked or was cancelled.
    #[error("Worker failure: {0}")]
    Worker(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the clickstream crates.
pub type Result<T> = std::result::Result<T, PrepError>;
