//! Schema evolution guard
//!
//! Adds the bookkeeping columns the engine needs to every synced table. Only
//! ever adds columns and indexes; never rewrites or drops anything.

use std::collections::{BTreeMap, BTreeSet};

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{SyncTable, TableSpec};
use crate::util::quote_identifier;

/// Bookkeeping columns and the definitions used when they are missing
pub const SYNC_COLUMNS: [(&str, &str); 6] = [
    ("global_id", "TEXT"),
    ("origin_device", "TEXT NOT NULL DEFAULT ''"),
    ("is_deleted", "INTEGER NOT NULL DEFAULT 0"),
    ("sync_state", "INTEGER NOT NULL DEFAULT 0"),
    ("created_at", "INTEGER NOT NULL DEFAULT 0"),
    ("updated_at", "INTEGER NOT NULL DEFAULT 0"),
];

/// Outcome of one guard pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardReport {
    /// Columns added during this pass
    pub added: BTreeMap<SyncTable, Vec<String>>,
    /// Tables that do not exist locally and were skipped
    pub missing_tables: BTreeSet<SyncTable>,
    /// Tables the guard could not bring up to date
    pub failed: BTreeMap<SyncTable, String>,
}

impl GuardReport {
    /// Whether `table` is safe for the tracker and coordinator to touch
    pub fn is_ready(&self, table: SyncTable) -> bool {
        !self.missing_tables.contains(&table) && !self.failed.contains_key(&table)
    }

    /// Why `table` is not ready, if it isn't
    pub fn table_error(&self, table: SyncTable) -> Option<Error> {
        if self.missing_tables.contains(&table) {
            return Some(Error::Schema(format!("table {table} does not exist")));
        }
        self.failed
            .get(&table)
            .map(|message| Error::Schema(format!("table {table}: {message}")))
    }
}

/// Ensure every table in `specs` carries the sync columns.
///
/// Safe to call on every start and before every cycle.
pub async fn ensure_sync_columns(conn: &Connection, specs: &[&TableSpec]) -> Result<GuardReport> {
    let mut report = GuardReport::default();

    for spec in specs {
        match ensure_table(conn, spec).await {
            Ok(None) => {
                tracing::warn!("Synced table {} does not exist; skipping", spec.name);
                report.missing_tables.insert(spec.table);
            }
            Ok(Some(added)) => {
                if !added.is_empty() {
                    tracing::info!("Added sync columns to {}: {}", spec.name, added.join(", "));
                    report.added.insert(spec.table, added);
                }
            }
            Err(error) => {
                tracing::error!("Schema guard failed for {}: {}", spec.name, error);
                report.failed.insert(spec.table, error.to_string());
            }
        }
    }

    Ok(report)
}

/// Returns `None` when the table is missing, otherwise the columns added
async fn ensure_table(conn: &Connection, spec: &TableSpec) -> Result<Option<Vec<String>>> {
    let table = quote_identifier(spec.name)
        .ok_or_else(|| Error::Schema(format!("invalid table name {:?}", spec.name)))?;
    let existing = table_columns(conn, &table).await?;
    if existing.is_empty() {
        return Ok(None);
    }

    let mut added = Vec::new();
    for (column, definition) in SYNC_COLUMNS {
        if existing.contains(column) {
            continue;
        }
        let statement = format!("ALTER TABLE {table} ADD COLUMN {column} {definition}");
        match conn.execute(&statement, ()).await {
            Ok(_) => added.push(column.to_string()),
            Err(error) if is_duplicate_column(&error) => {}
            Err(error) => return Err(error.into()),
        }
    }

    conn.execute(
        &format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{}_global_id ON {table}(global_id)",
            spec.name
        ),
        (),
    )
    .await?;
    conn.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_sync_state ON {table}(sync_state)",
            spec.name
        ),
        (),
    )
    .await?;

    Ok(Some(added))
}

async fn table_columns(conn: &Connection, quoted_table: &str) -> Result<BTreeSet<String>> {
    let mut rows = conn
        .query(&format!("PRAGMA table_info({quoted_table})"), ())
        .await?;

    let mut columns = BTreeSet::new();
    while let Some(row) = rows.next().await? {
        columns.insert(row.get::<String>(1)?);
    }
    Ok(columns)
}

fn is_duplicate_column(error: &libsql::Error) -> bool {
    error
        .to_string()
        .to_ascii_lowercase()
        .contains("duplicate column")
}
