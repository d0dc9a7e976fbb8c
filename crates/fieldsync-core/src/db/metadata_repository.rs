//! Key-value metadata area (device id, pull cursors)

use crate::error::Result;
use libsql::Connection;

/// Trait for metadata storage operations (async)
#[allow(async_fn_in_trait)]
pub trait MetadataRepository {
    /// Create the metadata table if it does not exist yet
    async fn ensure(&self) -> Result<()>;

    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;
}

/// libSQL implementation of `MetadataRepository`
pub struct LibSqlMetadataRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMetadataRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl MetadataRepository for LibSqlMetadataRepository<'_> {
    async fn ensure(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS sync_metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                )",
                (),
            )
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_metadata WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_metadata (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("{escaped}%");
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_metadata WHERE key LIKE ? ESCAPE '\\'",
                [pattern.as_str()],
            )
            .await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;

    async fn setup() -> LocalStore {
        LocalStore::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_key_is_none() {
        let store = setup().await;
        let repo = LibSqlMetadataRepository::new(store.connection());

        assert_eq!(repo.get("device_id").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_replaces_value() {
        let store = setup().await;
        let repo = LibSqlMetadataRepository::new(store.connection());

        repo.set("device_id", "first").await.unwrap();
        repo.set("device_id", "second").await.unwrap();

        assert_eq!(
            repo.get("device_id").await.unwrap().as_deref(),
            Some("second")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ensure_recreates_dropped_table() {
        let store = setup().await;
        store
            .connection()
            .execute("DROP TABLE sync_metadata", ())
            .await
            .unwrap();
        let repo = LibSqlMetadataRepository::new(store.connection());

        repo.ensure().await.unwrap();
        repo.ensure().await.unwrap();
        repo.set("k", "v").await.unwrap();
        assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_prefix_treats_underscore_literally() {
        let store = setup().await;
        let repo = LibSqlMetadataRepository::new(store.connection());

        repo.set("last_sync_nodes", "10").await.unwrap();
        repo.set("last_sync_cabinets", "20").await.unwrap();
        repo.set("lastXsyncXother", "30").await.unwrap();
        repo.set("device_id", "tablet-1").await.unwrap();

        let removed = repo.delete_prefix("last_sync_").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.get("last_sync_nodes").await.unwrap(), None);
        assert!(repo.get("lastXsyncXother").await.unwrap().is_some());
        assert!(repo.get("device_id").await.unwrap().is_some());
    }
}
