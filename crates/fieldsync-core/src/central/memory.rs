//! In-process central store, shared between simulated devices

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use super::{CentralSession, CentralStore, FetchBatch, RemoteDocument, UpsertOutcome};
use crate::error::{Error, Result};
use crate::models::{GlobalId, SyncTable};
use crate::util::{millis_to_rfc3339, now_millis};

#[derive(Debug)]
struct MemoryState {
    tables: HashMap<SyncTable, BTreeMap<String, RemoteDocument>>,
    clock: i64,
    available: bool,
    table_delays: HashMap<SyncTable, Duration>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            clock: 0,
            available: true,
            table_delays: HashMap::new(),
        }
    }
}

impl MemoryState {
    fn next_stamp(&mut self) -> i64 {
        self.clock = now_millis().max(self.clock + 1);
        self.clock
    }
}

/// Central store held in memory. Clones share the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryCentralStore {
    state: Arc<Mutex<MemoryState>>,
    sessions: Arc<AtomicUsize>,
}

impl MemoryCentralStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail with a connectivity error while `false`
    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.available = available;
    }

    /// Delay every fetch of `table` by `delay`
    pub async fn set_table_delay(&self, table: SyncTable, delay: Duration) {
        self.state.lock().await.table_delays.insert(table, delay);
    }

    /// Sessions opened and not yet closed or dropped
    pub fn open_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Every document of `table`, tombstones included
    pub async fn documents(&self, table: SyncTable) -> Vec<RemoteDocument> {
        self.state
            .lock()
            .await
            .tables
            .get(&table)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Store `document` as-is apart from a fresh stamp, bypassing validation
    pub async fn insert_raw(&self, table: SyncTable, mut document: RemoteDocument) {
        let mut state = self.state.lock().await;
        document.server_stamp = state.next_stamp();
        state
            .tables
            .entry(table)
            .or_default()
            .insert(document.global_id.clone(), document);
    }
}

impl CentralStore for MemoryCentralStore {
    type Session = MemorySession;

    async fn connect(&self) -> Result<MemorySession> {
        let mut state = self.state.lock().await;
        if !state.available {
            return Err(Error::Connectivity(
                "in-memory central store is offline".to_string(),
            ));
        }
        drop(state);
        self.sessions.fetch_add(1, Ordering::SeqCst);

        Ok(MemorySession {
            store: self.clone(),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Session over a [`MemoryCentralStore`]
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryCentralStore,
}

impl CentralSession for MemorySession {
    async fn fetch_changed(
        &self,
        table: SyncTable,
        since: Option<i64>,
        exclude_origin: &str,
    ) -> Result<FetchBatch> {
        let delay = self.store.state.lock().await.table_delays.get(&table).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.store.state.lock().await;
        let mut documents = state
            .tables
            .get(&table)
            .map(|documents| {
                documents
                    .values()
                    .filter(|doc| doc.origin_device != exclude_origin)
                    .filter(|doc| match since {
                        Some(since) => doc.server_stamp > since,
                        None => !doc.deleted,
                    })
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        documents.sort_by_key(|doc| doc.server_stamp);

        Ok(FetchBatch {
            documents,
            watermark: state.clock,
        })
    }

    async fn find(&self, table: SyncTable, global_id: &GlobalId) -> Result<Option<RemoteDocument>> {
        let state = self.store.state.lock().await;
        Ok(state
            .tables
            .get(&table)
            .and_then(|documents| documents.get(&global_id.as_str()))
            .cloned())
    }

    async fn find_by_natural_key(
        &self,
        table: SyncTable,
        key: &[(&str, JsonValue)],
    ) -> Result<Option<RemoteDocument>> {
        if key.is_empty() {
            return Ok(None);
        }
        let state = self.store.state.lock().await;
        Ok(state.tables.get(&table).and_then(|documents| {
            documents
                .values()
                .filter(|doc| !doc.deleted)
                .filter(|doc| {
                    key.iter()
                        .all(|(column, value)| doc.data.get(*column) == Some(value))
                })
                .min_by_key(|doc| doc.server_stamp)
                .cloned()
        }))
    }

    async fn upsert(&self, table: SyncTable, mut document: RemoteDocument) -> Result<UpsertOutcome> {
        let mut state = self.store.state.lock().await;
        document.server_stamp = state.next_stamp();
        let previous = state
            .tables
            .entry(table)
            .or_default()
            .insert(document.global_id.clone(), document);
        Ok(if previous.is_some() {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn tombstone(
        &self,
        table: SyncTable,
        global_id: &GlobalId,
        origin_device: &str,
        updated_at: i64,
    ) -> Result<bool> {
        let mut state = self.store.state.lock().await;
        let stamp = state.next_stamp();
        let Some(document) = state
            .tables
            .get_mut(&table)
            .and_then(|documents| documents.get_mut(&global_id.as_str()))
        else {
            return Ok(false);
        };
        document.deleted = true;
        document.origin_device = origin_device.to_string();
        document.updated_at = millis_to_rfc3339(updated_at);
        document.server_stamp = stamp;
        Ok(true)
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.store.sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
