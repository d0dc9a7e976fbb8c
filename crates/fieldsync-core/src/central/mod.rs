//! Central document store.
//!
//! The central store keeps one document per logical record, keyed by
//! `(table, global_id)`. Every write gets a `server_stamp` from a clock owned by
//! the central store, so pull cursors never depend on device clocks.
//!
//! Two implementations ship with the crate:
//! - [`LibSqlCentralStore`] keeps documents in a libSQL database, either a
//!   remote Turso/libSQL server or a shared file.
//! - [`MemoryCentralStore`] keeps documents in process; several simulated
//!   devices can share one instance.

mod libsql_store;
mod memory;

pub use libsql_store::{LibSqlCentralStore, LibSqlSession};
pub use memory::{MemoryCentralStore, MemorySession};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::models::{GlobalId, IncomingRecord, Record, SyncTable, TableSpec};
use crate::util::{millis_to_rfc3339, rfc3339_to_millis};

/// A record as stored centrally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub global_id: String,
    pub origin_device: String,
    pub deleted: bool,
    /// RFC 3339
    pub created_at: String,
    /// RFC 3339
    pub updated_at: String,
    /// Domain fields; anything but a JSON object is rejected on pull
    pub data: JsonValue,
    /// Assigned by the central store on write
    #[serde(default)]
    pub server_stamp: i64,
}

impl RemoteDocument {
    /// Central form of a local record about to be pushed
    pub fn from_record(record: &Record, global_id: &GlobalId) -> Self {
        Self {
            global_id: global_id.as_str(),
            origin_device: record.origin_device.clone(),
            deleted: record.deleted,
            created_at: millis_to_rfc3339(record.created_at),
            updated_at: millis_to_rfc3339(record.updated_at),
            data: JsonValue::Object(record.fields.clone()),
            server_stamp: 0,
        }
    }

    /// Validate this document against `spec`.
    ///
    /// Any failure is a per-record error: the caller skips the document.
    pub fn to_incoming(&self, spec: &TableSpec) -> Result<IncomingRecord> {
        let invalid = |message: String| Error::record(spec.name, message);

        let global_id = self
            .global_id
            .parse::<GlobalId>()
            .map_err(|_| invalid(format!("invalid global id {:?}", self.global_id)))?;
        let created_at = rfc3339_to_millis(&self.created_at).ok_or_else(|| {
            invalid(format!(
                "{global_id}: malformed created_at {:?}",
                self.created_at
            ))
        })?;
        let updated_at = rfc3339_to_millis(&self.updated_at).ok_or_else(|| {
            invalid(format!(
                "{global_id}: malformed updated_at {:?}",
                self.updated_at
            ))
        })?;
        let JsonValue::Object(data) = &self.data else {
            return Err(invalid(format!("{global_id}: data is not an object")));
        };

        let mut fields = serde_json::Map::new();
        for column in spec.columns {
            let value = data.get(column.name).cloned().unwrap_or(JsonValue::Null);
            if column.required && value.is_null() && !self.deleted {
                return Err(invalid(format!(
                    "{global_id}: required field {} is missing",
                    column.name
                )));
            }
            fields.insert(column.name.to_string(), value);
        }

        Ok(IncomingRecord {
            global_id,
            origin_device: self.origin_device.clone(),
            deleted: self.deleted,
            created_at,
            updated_at,
            fields,
            server_stamp: self.server_stamp,
        })
    }
}

/// Documents changed since a cursor, plus the cursor to store afterwards
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchBatch {
    pub documents: Vec<RemoteDocument>,
    /// Central clock value the batch is complete up to
    pub watermark: i64,
}

/// Whether an upsert created or replaced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// A reachable central store
#[allow(async_fn_in_trait)]
pub trait CentralStore {
    type Session: CentralSession;

    /// Open one logical session; the caller must `close` it
    async fn connect(&self) -> Result<Self::Session>;

    /// Human readable target for logs, without credentials
    fn describe(&self) -> String;
}

/// One open session against the central store
#[allow(async_fn_in_trait)]
pub trait CentralSession {
    /// Documents of `table` written after `since`, excluding `exclude_origin`'s.
    ///
    /// Without a cursor only live documents are returned.
    async fn fetch_changed(
        &self,
        table: SyncTable,
        since: Option<i64>,
        exclude_origin: &str,
    ) -> Result<FetchBatch>;

    /// Document carrying `global_id`, tombstoned or not
    async fn find(&self, table: SyncTable, global_id: &GlobalId) -> Result<Option<RemoteDocument>>;

    /// Live document whose data matches every `(column, value)` pair
    async fn find_by_natural_key(
        &self,
        table: SyncTable,
        key: &[(&str, JsonValue)],
    ) -> Result<Option<RemoteDocument>>;

    /// Insert the document if its global id is unknown, else replace it
    async fn upsert(&self, table: SyncTable, document: RemoteDocument) -> Result<UpsertOutcome>;

    /// Mark a document deleted; returns whether it existed
    async fn tombstone(
        &self,
        table: SyncTable,
        global_id: &GlobalId,
        origin_device: &str,
        updated_at: i64,
    ) -> Result<bool>;

    /// Release the session
    async fn close(self) -> Result<()>;
}
