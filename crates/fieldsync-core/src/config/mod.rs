//! Replication settings shared by the CLI and embedding applications.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::SyncTable;
use crate::sync::ConflictPolicy;
use crate::util::normalize_text_option;

pub const ENV_CENTRAL_URL: &str = "FIELDSYNC_CENTRAL_URL";
pub const ENV_AUTH_TOKEN: &str = "FIELDSYNC_AUTH_TOKEN";
pub const ENV_CONFLICT_POLICY: &str = "FIELDSYNC_CONFLICT_POLICY";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TABLE_TIMEOUT_SECS: u64 = 30;

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

const fn default_table_timeout_secs() -> u64 {
    DEFAULT_TABLE_TIMEOUT_SECS
}

fn default_tables() -> Vec<SyncTable> {
    SyncTable::ALL.to_vec()
}

/// How and where a device replicates.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// `libsql://`, `https://`, `file:` URL or a path to a shared database file
    #[serde(default)]
    pub central_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_table_timeout_secs")]
    pub table_timeout_secs: u64,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Tables to replicate; always processed parents first
    #[serde(default = "default_tables")]
    pub tables: Vec<SyncTable>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            central_url: None,
            auth_token: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            table_timeout_secs: DEFAULT_TABLE_TIMEOUT_SECS,
            conflict_policy: ConflictPolicy::default(),
            tables: default_tables(),
        }
    }
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("central_url", &self.central_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("table_timeout_secs", &self.table_timeout_secs)
            .field("conflict_policy", &self.conflict_policy)
            .field("tables", &self.tables)
            .finish()
    }
}

impl SyncConfig {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub const fn table_timeout(&self) -> Duration {
        Duration::from_secs(self.table_timeout_secs)
    }

    /// Configured tables in processing order, without duplicates
    pub fn ordered_tables(&self) -> Vec<SyncTable> {
        SyncTable::ALL
            .into_iter()
            .filter(|table| self.tables.contains(table))
            .collect()
    }

    /// Normalized central URL, if one is set
    pub fn central_url(&self) -> Option<String> {
        normalize_text_option(self.central_url.clone())
    }

    /// Normalized auth token, if one is set
    pub fn auth_token(&self) -> Option<String> {
        normalize_text_option(self.auth_token.clone())
    }

    /// Apply overrides from environment-style variables.
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = normalize_text_option(lookup(ENV_CENTRAL_URL)) {
            self.central_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup(ENV_AUTH_TOKEN)) {
            self.auth_token = Some(token);
        }
        if let Some(policy) = normalize_text_option(lookup(ENV_CONFLICT_POLICY)) {
            self.conflict_policy = policy.parse()?;
        }
        Ok(())
    }

    /// Reject settings the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.table_timeout_secs == 0 {
            return Err(Error::Config(
                "table_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.tables.is_empty() {
            return Err(Error::Config("at least one table must be synced".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_json_uses_defaults() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.table_timeout(), Duration::from_secs(30));
        assert_eq!(config.conflict_policy, ConflictPolicy::LocalWins);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<SyncConfig>(r#"{"centralUrl": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn policy_parses_from_snake_case() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"conflict_policy": "newest_wins"}"#).unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::NewestWins);
    }

    #[test]
    fn ordered_tables_puts_parents_first() {
        let config = SyncConfig {
            tables: vec![
                SyncTable::SessionNodes,
                SyncTable::Cabinets,
                SyncTable::SessionNodes,
            ],
            ..SyncConfig::default()
        };
        assert_eq!(
            config.ordered_tables(),
            vec![SyncTable::Cabinets, SyncTable::SessionNodes]
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = SyncConfig {
            central_url: Some("file:/tmp/old.db".to_string()),
            ..SyncConfig::default()
        };
        config
            .apply_env(|key| match key {
                ENV_CENTRAL_URL => Some(" libsql://fleet.turso.io ".to_string()),
                ENV_CONFLICT_POLICY => Some("newest-wins".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.central_url().as_deref(), Some("libsql://fleet.turso.io"));
        assert_eq!(config.auth_token(), None);
        assert_eq!(config.conflict_policy, ConflictPolicy::NewestWins);
    }

    #[test]
    fn bad_policy_in_env_is_an_error() {
        let mut config = SyncConfig::default();
        let result = config.apply_env(|key| (key == ENV_CONFLICT_POLICY).then(|| "coin".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts_and_empty_tables() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.table_timeout_secs = 0;
        assert!(config.validate().is_err());

        config = SyncConfig {
            tables: Vec::new(),
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let config = SyncConfig {
            auth_token: Some("secret".to_string()),
            ..SyncConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
