//! Local store connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::{migrations, schema_guard};
use crate::models::SyncTable;

/// Embedded libSQL store held by one device
pub struct LocalStore {
    // Kept alive for the lifetime of `conn`
    _db: LibSqlDatabase,
    conn: Connection,
}

impl LocalStore {
    /// Open a local store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations and the schema guard automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::from_database(db).await
    }

    /// Open an in-memory store (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        let store = Self { _db: db, conn };
        store.configure().await?;
        migrations::run(&store.conn).await?;
        let specs = SyncTable::ALL.map(SyncTable::spec);
        schema_guard::ensure_sync_columns(&store.conn, &specs).await?;
        Ok(store)
    }

    /// Configure `SQLite` for a single-writer device store
    async fn configure(&self) -> Result<()> {
        // Not every pragma applies to every build (in-memory has no WAL)
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA busy_timeout = 5000;", ()).await.ok();
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
