//! fieldsync-core: offline-first replication between field devices and a
//! central store.
//!
//! Each device keeps an embedded libSQL store. [`SyncCoordinator`] pulls
//! central changes into it and pushes local changes out.

pub mod central;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use central::{CentralSession, CentralStore, LibSqlCentralStore, MemoryCentralStore};
pub use config::SyncConfig;
pub use db::LocalStore;
pub use error::{Error, ErrorKind, Result};
pub use models::{
    CycleState, GlobalId, LocalId, PullReport, PushReport, Record, SyncReport, SyncStatus,
    SyncTable,
};
pub use sync::{CancelHandle, ChangeTracker, ConflictPolicy, DeviceIdentity, SyncCoordinator};
