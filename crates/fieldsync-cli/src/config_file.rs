//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use fieldsync_core::util::normalize_text_option;
use fieldsync_core::{ConflictPolicy, SyncConfig};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "fieldsync.db";

pub const ENV_DB_PATH: &str = "FIELDSYNC_DB_PATH";

/// Values given on the command line; they win over file and environment
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub central_url: Option<String>,
    pub conflict_policy: Option<ConflictPolicy>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fieldsync").join(CONFIG_FILE_NAME))
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldsync")
        .join(DB_FILE_NAME)
}

pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    cli_db_path
        .or_else(|| normalize_text_option(lookup(ENV_DB_PATH)).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

/// Read a config file; a missing file yields the defaults
pub fn load_from_path(path: &Path) -> Result<SyncConfig, CliError> {
    if !path.exists() {
        return Ok(SyncConfig::default());
    }

    let raw = std::fs::read_to_string(path).map_err(|error| {
        CliError::Config(format!("Failed to read config at {}: {error}", path.display()))
    })?;
    serde_json::from_str::<SyncConfig>(&raw).map_err(|error| {
        CliError::Config(format!("Failed to parse config at {}: {error}", path.display()))
    })
}

/// File, then environment, then command-line flags.
///
/// An explicit `config_path` must exist; the default location is optional.
pub fn resolve_sync_config(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SyncConfig, CliError> {
    let mut config = match config_path {
        Some(path) if !path.exists() => {
            return Err(CliError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Some(path) => load_from_path(path)?,
        None => match default_config_path() {
            Some(path) => load_from_path(&path)?,
            None => SyncConfig::default(),
        },
    };

    config.apply_env(lookup)?;

    if let Some(url) = normalize_text_option(overrides.central_url.clone()) {
        config.central_url = Some(url);
    }
    if let Some(policy) = overrides.conflict_policy {
        config.conflict_policy = policy;
    }

    config.validate()?;
    Ok(config)
}
