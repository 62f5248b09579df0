// Error taxonomy for task store operations

use thiserror::Error;

/// Errors surfaced by store, codec and storage operations
#[derive(Debug, Error)]
pub enum TaskError {
    /// A create or update would leave the title empty
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    /// Import payload had no usable data rows
    #[error("Import contained no data rows")]
    EmptyImport,

    #[error("Another import is already in progress")]
    ImportInProgress,

    /// The ticket was not issued by this store for its pending import
    #[error("Import ticket does not match the pending import")]
    ImportTicketMismatch,

    /// Reading or writing the durable store failed, or its content is corrupt
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A patch named a field that cannot be changed
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        TaskError::Persistence(e.to_string())
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        TaskError::Persistence(e.to_string())
    }
}

impl From<rusqlite::Error> for TaskError {
    fn from(e: rusqlite::Error) -> Self {
        TaskError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
