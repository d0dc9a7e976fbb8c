//! Structured results returned by the sync engine

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::{GlobalId, LocalId, SyncTable};

/// Lifecycle of a sync cycle.
///
/// ```text
/// Idle ──► Connecting ──► Pulling ──► Pushing ──► Idle
///              │             │           │
///              └─────────────┴───────────┴──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Connecting,
    Pulling,
    Pushing,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Pulling => write!(f, "Pulling"),
            Self::Pushing => write!(f, "Pushing"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// What happened to a conflicting remote version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictDisposition {
    KeptLocal,
    AcceptedRemote,
}

/// Two writers touched the same identity before either synced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub table: SyncTable,
    pub global_id: GlobalId,
    pub local_id: LocalId,
    pub local_updated_at: i64,
    pub remote_updated_at: i64,
    pub remote_origin: String,
    pub disposition: ConflictDisposition,
}

/// Pull outcome for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TablePullResult {
    pub pulled: usize,
    pub conflicts: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pull outcome for a whole cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub per_table: BTreeMap<SyncTable, TablePullResult>,
    pub total_pulled: usize,
    pub total_conflicts: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PullReport {
    pub(crate) fn record(&mut self, table: SyncTable, result: TablePullResult) {
        self.total_pulled += result.pulled;
        self.total_conflicts += result.conflicts;
        self.per_table.insert(table, result);
    }

    /// Sum of per-record and per-table errors
    pub fn total_errors(&self) -> usize {
        self.per_table.values().map(|table| table.errors).sum()
    }

    pub(crate) fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Push outcome for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TablePushResult {
    pub pushed: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Push outcome for a whole cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub per_table: BTreeMap<SyncTable, TablePushResult>,
    pub total_pushed: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushReport {
    pub(crate) fn record(&mut self, table: SyncTable, result: TablePushResult) {
        self.total_pushed += result.pushed;
        self.per_table.insert(table, result);
    }

    /// Sum of per-record and per-table errors
    pub fn total_errors(&self) -> usize {
        self.per_table.values().map(|table| table.errors).sum()
    }

    pub(crate) fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Outcome of a full pull-then-push cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pull: PullReport,
    pub push: PushReport,
    pub success: bool,
    pub state: CycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Local sync bookkeeping for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub local_count: u64,
    pub unsynced_count: u64,
    /// Unix ms of the last successful pull
    pub last_sync_time: Option<i64>,
}

/// Snapshot returned by `get_status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub device_id: String,
    pub identity_durable: bool,
    pub connected: bool,
    pub state: CycleState,
    pub per_table: BTreeMap<SyncTable, TableStatus>,
}

/// Snapshot returned by `get_device_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub identity_durable: bool,
    pub hostname: String,
    pub platform: String,
    pub sync_tables: Vec<SyncTable>,
}

/// Rows touched by an administrative operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdminReport {
    pub per_table: BTreeMap<SyncTable, u64>,
    pub rows_updated: u64,
    pub cursors_cleared: u64,
}
