//! Change tracking for local writes

use libsql::Connection;

use crate::db::TableStore;
use crate::error::Result;
use crate::models::{Fields, LocalId, Record, SyncTable};
use crate::util::now_millis;

/// Marks local writes so the next push picks them up.
///
/// The domain CRUD layer calls `insert`/`update`/`delete` instead of writing
/// synced tables directly.
pub struct ChangeTracker<'a> {
    conn: &'a Connection,
    device_id: String,
}

impl<'a> ChangeTracker<'a> {
    pub fn new(conn: &'a Connection, device_id: impl Into<String>) -> Self {
        Self {
            conn,
            device_id: device_id.into(),
        }
    }

    fn table(&self, table: SyncTable) -> TableStore<'a> {
        TableStore::new(self.conn, table.spec())
    }

    /// Flag a row as changed on this device. Returns false if the row is unknown.
    pub async fn mark_dirty(&self, table: SyncTable, id: &LocalId) -> Result<bool> {
        self.table(table)
            .mark_dirty(id, &self.device_id, now_millis())
            .await
    }

    /// Rows waiting to be pushed, tombstones included
    pub async fn list_unsynced(&self, table: SyncTable) -> Result<Vec<Record>> {
        self.table(table).list_unsynced().await
    }

    pub async fn list_all(&self, table: SyncTable) -> Result<Vec<Record>> {
        self.table(table).list_all().await
    }

    pub async fn mark_synced(&self, table: SyncTable, id: &LocalId) -> Result<bool> {
        self.table(table).mark_synced(id).await
    }

    /// Create a row; it carries no global id until its first push
    pub async fn insert(&self, table: SyncTable, fields: &Fields) -> Result<Record> {
        let record = self
            .table(table)
            .insert_local(fields, &self.device_id, now_millis())
            .await?;
        tracing::debug!("Inserted {} row {}", table, record.id);
        Ok(record)
    }

    pub async fn update(&self, table: SyncTable, id: &LocalId, fields: &Fields) -> Result<Record> {
        self.table(table)
            .update_local(id, fields, &self.device_id, now_millis())
            .await
    }

    /// Soft-delete a row so the deletion reaches other devices
    pub async fn delete(&self, table: SyncTable, id: &LocalId) -> Result<bool> {
        let deleted = self
            .table(table)
            .soft_delete(id, &self.device_id, now_millis())
            .await?;
        if deleted {
            tracing::debug!("Tombstoned {} row {}", table, id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use crate::models::SyncState;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_local_write_leaves_the_row_dirty() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let tracker = ChangeTracker::new(store.connection(), "tablet-a");

        let row = tracker
            .insert(SyncTable::Cabinets, &fields(json!({"name": "C-1"})))
            .await
            .unwrap();
        assert!(row.is_dirty());

        tracker.mark_synced(SyncTable::Cabinets, &row.id).await.unwrap();
        let updated = tracker
            .update(SyncTable::Cabinets, &row.id, &fields(json!({"location": "Hall B"})))
            .await
            .unwrap();
        assert_eq!(updated.sync_state, SyncState::Unsynced);
        assert_eq!(updated.fields["name"], json!("C-1"));
        assert_eq!(updated.fields["location"], json!("Hall B"));

        tracker.mark_synced(SyncTable::Cabinets, &row.id).await.unwrap();
        assert!(tracker.list_unsynced(SyncTable::Cabinets).await.unwrap().is_empty());
        assert!(tracker.mark_dirty(SyncTable::Cabinets, &row.id).await.unwrap());
        assert_eq!(tracker.list_unsynced(SyncTable::Cabinets).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_is_a_dirty_tombstone() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let tracker = ChangeTracker::new(store.connection(), "tablet-a");
        let row = tracker
            .insert(SyncTable::Cabinets, &fields(json!({"name": "C-9"})))
            .await
            .unwrap();
        tracker.mark_synced(SyncTable::Cabinets, &row.id).await.unwrap();

        assert!(tracker.delete(SyncTable::Cabinets, &row.id).await.unwrap());
        assert!(!tracker.delete(SyncTable::Cabinets, &row.id).await.unwrap());

        let unsynced = tracker.list_unsynced(SyncTable::Cabinets).await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert!(unsynced[0].deleted);
        assert_eq!(tracker.list_all(SyncTable::Cabinets).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_rows_are_reported() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let tracker = ChangeTracker::new(store.connection(), "tablet-a");

        assert!(!tracker
            .mark_dirty(SyncTable::Nodes, &LocalId::Int(404))
            .await
            .unwrap());
        assert!(tracker
            .update(SyncTable::Nodes, &LocalId::Int(404), &fields(json!({"label": "x"})))
            .await
            .is_err());
    }
}
