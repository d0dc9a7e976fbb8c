//! Stable per-store device identity

use std::sync::OnceLock;

use libsql::Connection;
use regex::Regex;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{LibSqlMetadataRepository, MetadataRepository};
use crate::error::{Error, Result};

/// Metadata key holding the device id
pub const DEVICE_ID_KEY: &str = "device_id";

const FALLBACK_HOST: &str = "device";

/// The id this device writes into `origin_device`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    /// False when the id could not be persisted and only lives in this process
    pub durable: bool,
}

/// Creates the device id on first use and keeps returning it afterwards.
#[derive(Debug, Default)]
pub struct DeviceIdentityProvider {
    cached: Mutex<Option<DeviceIdentity>>,
}

impl DeviceIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored device id, creating and persisting one if needed.
    ///
    /// A failed write does not fail the call: the fresh id is returned with
    /// `durable = false` and reused for the rest of the process.
    pub async fn get_or_create(&self, conn: &Connection) -> Result<DeviceIdentity> {
        let mut cached = self.cached.lock().await;
        if let Some(identity) = cached.as_ref() {
            return Ok(identity.clone());
        }

        let repo = LibSqlMetadataRepository::new(conn);
        repo.ensure().await?;
        if let Some(device_id) = repo.get(DEVICE_ID_KEY).await? {
            let identity = DeviceIdentity {
                device_id,
                durable: true,
            };
            *cached = Some(identity.clone());
            return Ok(identity);
        }

        let device_id = generate_device_id(&local_hostname());
        let durable = match repo.set(DEVICE_ID_KEY, &device_id).await {
            Ok(()) => {
                tracing::info!("Created device id {}", device_id);
                true
            }
            Err(error) => {
                let error = Error::IdentityDurability {
                    device_id: device_id.clone(),
                    message: error.to_string(),
                };
                tracing::error!("{error}; the id will change after restart");
                false
            }
        };

        let identity = DeviceIdentity { device_id, durable };
        *cached = Some(identity.clone());
        Ok(identity)
    }
}

/// Host name as reported by the OS, or an empty string
pub fn local_hostname() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<sanitized-host>-<random suffix>`
pub fn generate_device_id(hostname: &str) -> String {
    let suffix = Uuid::now_v7().simple().to_string();
    format!("{}-{}", sanitize_hostname(hostname), &suffix[suffix.len() - 12..])
}

fn sanitize_hostname(hostname: &str) -> String {
    static DISALLOWED: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

    let Ok(pattern) = DISALLOWED.get_or_init(|| Regex::new(r"[^A-Za-z0-9-]+")) else {
        return FALLBACK_HOST.to_string();
    };
    let cleaned = pattern.replace_all(hostname.trim(), "-");
    let cleaned = cleaned.trim_matches('-').to_ascii_lowercase();
    if cleaned.is_empty() {
        FALLBACK_HOST.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use tempfile::tempdir;

    #[test]
    fn hostname_is_sanitized() {
        assert_eq!(sanitize_hostname("Field Tablet #3.local"), "field-tablet-3-local");
        assert_eq!(sanitize_hostname("  "), "device");
        assert_eq!(sanitize_hostname("___"), "device");
    }

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let first = generate_device_id("Tablet-A");
        let second = generate_device_id("Tablet-A");
        assert!(first.starts_with("tablet-a-"));
        assert_ne!(first, second);
        assert_eq!(first.len(), "tablet-a-".len() + 12);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identity_is_created_once() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let provider = DeviceIdentityProvider::new();

        let first = provider.get_or_create(store.connection()).await.unwrap();
        let second = DeviceIdentityProvider::new()
            .get_or_create(store.connection())
            .await
            .unwrap();

        assert!(first.durable);
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identity_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("device.db");

        let store = LocalStore::open(&path).await.unwrap();
        let before = DeviceIdentityProvider::new()
            .get_or_create(store.connection())
            .await
            .unwrap();
        drop(store);

        let store = LocalStore::open(&path).await.unwrap();
        let after = DeviceIdentityProvider::new()
            .get_or_create(store.connection())
            .await
            .unwrap();
        assert_eq!(before.device_id, after.device_id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_write_degrades_but_stays_stable() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .connection()
            .execute(
                "CREATE TRIGGER reject_metadata BEFORE INSERT ON sync_metadata
                 BEGIN SELECT RAISE(ABORT, 'metadata is read-only'); END",
                (),
            )
            .await
            .unwrap();
        let provider = DeviceIdentityProvider::new();

        let first = provider.get_or_create(store.connection()).await.unwrap();
        let second = provider.get_or_create(store.connection()).await.unwrap();

        assert!(!first.durable);
        assert_eq!(first, second);
    }
}
