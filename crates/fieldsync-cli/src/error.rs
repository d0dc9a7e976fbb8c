use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync did not complete: {0}")]
    SyncFailed(String),
    #[error(
        "Sync is not configured. Pass --central-url, set FIELDSYNC_CENTRAL_URL, or add central_url to the config file."
    )]
    SyncNotConfigured,
}
