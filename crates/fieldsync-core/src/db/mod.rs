//! Local store layer for fieldsync

mod connection;
mod metadata_repository;
mod migrations;
pub mod schema_guard;
mod table_store;

pub use connection::LocalStore;
pub use metadata_repository::{LibSqlMetadataRepository, MetadataRepository};
pub use schema_guard::{ensure_sync_columns, GuardReport};
pub use table_store::TableStore;
