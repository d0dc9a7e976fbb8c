//! Data models for fieldsync

mod record;
mod report;
mod table;

pub use record::{Fields, GlobalId, IncomingRecord, LocalId, Record, SyncState};
pub use report::{
    AdminReport, ConflictDisposition, ConflictRecord, CycleState, DeviceInfo, PullReport,
    PushReport, SyncReport, SyncStatus, TablePullResult, TablePushResult, TableStatus,
};
pub use table::{ColumnSpec, ColumnType, KeyKind, SyncTable, TableSpec};
