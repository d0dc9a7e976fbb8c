//! Per-table pull cursors

use libsql::Connection;

use crate::db::{LibSqlMetadataRepository, MetadataRepository};
use crate::error::{Error, Result};
use crate::models::SyncTable;

/// Prefix shared by every cursor key
pub const CURSOR_PREFIX: &str = "last_sync_";

/// Pull cursors kept in the metadata area, one per table
pub struct CursorStore<'a> {
    repo: LibSqlMetadataRepository<'a>,
}

impl<'a> CursorStore<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            repo: LibSqlMetadataRepository::new(conn),
        }
    }

    /// Central watermark of the last successful pull of `table`
    pub async fn get(&self, table: SyncTable) -> Result<Option<i64>> {
        let Some(raw) = self.repo.get(&table.cursor_key()).await? else {
            return Ok(None);
        };
        raw.trim().parse::<i64>().map(Some).map_err(|_| {
            Error::Database(format!("cursor {} holds {raw:?}", table.cursor_key()))
        })
    }

    /// Record a successful pull; never moves a cursor backwards
    pub async fn advance(&self, table: SyncTable, watermark: i64) -> Result<i64> {
        let current = self.get(table).await.ok().flatten();
        let next = current.map_or(watermark, |current| current.max(watermark));
        self.repo
            .set(&table.cursor_key(), &next.to_string())
            .await?;
        Ok(next)
    }

    /// Forget every cursor, returning how many were removed
    pub async fn clear_all(&self) -> Result<u64> {
        self.repo.delete_prefix(CURSOR_PREFIX).await
    }
}
