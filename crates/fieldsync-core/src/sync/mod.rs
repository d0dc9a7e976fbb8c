//! Replication engine: device identity, change tracking, conflict resolution,
//! identity reconciliation and the sync cycle itself.

mod coordinator;
mod cursor;
mod device;
mod identity;
mod resolver;
mod tracker;


pub use coordinator::{CancelHandle, SyncCoordinator};
pub use cursor::{CursorStore, CURSOR_PREFIX};
pub use device::{
    generate_device_id, local_hostname, DeviceIdentity, DeviceIdentityProvider, DEVICE_ID_KEY,
};
pub use identity::{IdentityReconciler, Placement};
pub use resolver::{resolve, ConflictPolicy, Resolution};
pub use tracker::ChangeTracker;
