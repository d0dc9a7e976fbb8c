//! Error types for fieldsync-core

use thiserror::Error;

/// Result type alias using fieldsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`], used when deciding how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Central store unreachable or timed out
    Connectivity,
    /// Missing table or column
    Schema,
    /// A single record could not be applied
    Record,
    /// Device id could not be persisted
    IdentityDurability,
    /// Cycle rejected or interrupted
    Cycle,
    /// Local store or other internal failure
    Internal,
}

/// Errors that can occur in fieldsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Central store could not be reached
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Operation did not finish within its time budget
    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// Missing table or column
    #[error("Schema error: {0}")]
    Schema(String),

    /// A record failed validation or could not be written
    #[error("Record error ({table}): {message}")]
    Record { table: String, message: String },

    /// Device identity could not be persisted
    #[error("Device id {device_id} was not persisted: {message}")]
    IdentityDurability { device_id: String, message: String },

    /// A sync cycle is already running on this store
    #[error("A sync cycle is already in progress")]
    CycleInProgress,

    /// The cycle was cancelled between tables
    #[error("Sync cycle cancelled")]
    Cancelled,

    /// Central store rejected an operation
    #[error("Central store error: {0}")]
    Central(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a per-record error for `table`
    pub fn record(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Record {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Category of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity(_) | Self::Timeout { .. } => ErrorKind::Connectivity,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Record { .. } | Self::InvalidInput(_) => ErrorKind::Record,
            Self::IdentityDurability { .. } => ErrorKind::IdentityDurability,
            Self::CycleInProgress | Self::Cancelled => ErrorKind::Cycle,
            Self::Central(_)
            | Self::Database(_)
            | Self::LibSql(_)
            | Self::Io(_)
            | Self::Config(_)
            | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the whole operation later may succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connectivity(_) | Self::Timeout { .. } | Self::CycleInProgress
        )
    }
}
