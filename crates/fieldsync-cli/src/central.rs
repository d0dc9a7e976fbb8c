//! Central store selected from configuration

use fieldsync_core::central::LibSqlSession;
use fieldsync_core::{CentralStore, Error, LibSqlCentralStore, SyncConfig};

use crate::error::CliError;

/// The configured central store, or none.
///
/// Local-only commands (`status`, `device`, `admin`) still work without a
/// central URL; connecting simply reports the store as unreachable.
pub enum CliCentral {
    Configured(LibSqlCentralStore),
    Unconfigured,
}

impl CliCentral {
    pub fn from_config(config: &SyncConfig) -> Result<Self, CliError> {
        match config.central_url() {
            Some(url) => Ok(Self::Configured(LibSqlCentralStore::from_url(
                &url,
                config.auth_token().as_deref(),
            )?)),
            None => Ok(Self::Unconfigured),
        }
    }

    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Configured(_))
    }
}

impl CentralStore for CliCentral {
    type Session = LibSqlSession;

    async fn connect(&self) -> fieldsync_core::Result<LibSqlSession> {
        match self {
            Self::Configured(store) => store.connect().await,
            Self::Unconfigured => Err(Error::Connectivity(
                "no central store configured".to_string(),
            )),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Configured(store) => store.describe(),
            Self::Unconfigured => "<unconfigured>".to_string(),
        }
    }
}
