//! Synced record model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Domain column values of a record, keyed by column name
pub type Fields = Map<String, Value>;

/// A cross-device identifier, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(Uuid);

impl GlobalId {
    /// Create a new unique global ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for GlobalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GlobalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// A device-local primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalId {
    Int(i64),
    Text(String),
}

impl LocalId {
    pub(crate) fn to_value(&self) -> libsql::Value {
        match self {
            Self::Int(id) => libsql::Value::Integer(*id),
            Self::Text(id) => libsql::Value::Text(id.clone()),
        }
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for LocalId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for LocalId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

/// Whether a row still has changes the central store has not acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Unsynced,
    Synced,
}

impl SyncState {
    /// Stored column value
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Unsynced => 0,
            Self::Synced => 1,
        }
    }

    /// Decode a stored column value; anything but 1 needs sync
    pub const fn from_i64(value: i64) -> Self {
        if value == 1 {
            Self::Synced
        } else {
            Self::Unsynced
        }
    }
}

/// A row of a synced table as held in the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Local primary key
    pub id: LocalId,
    /// Cross-device identifier, absent until first push or adoption
    pub global_id: Option<GlobalId>,
    /// Device whose write produced this version
    pub origin_device: String,
    /// Dirty flag
    pub sync_state: SyncState,
    /// Soft delete flag for sync
    pub deleted: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Domain column values
    pub fields: Fields,
}

impl Record {
    /// Whether this row has changes waiting to be pushed
    pub fn is_dirty(&self) -> bool {
        self.sync_state == SyncState::Unsynced
    }
}

/// A validated record received from the central store
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRecord {
    pub global_id: GlobalId,
    pub origin_device: String,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub fields: Fields,
    /// Central write stamp, used for cursors
    pub server_stamp: i64,
}
