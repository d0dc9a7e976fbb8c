//! Synced table registry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a table's local primary key is typed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`
    Integer,
    /// `TEXT PRIMARY KEY`, generated locally
    Text,
}

/// Declared SQL type of a domain column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

/// A domain column of a synced table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnType,
    /// Records missing this value are rejected on pull
    pub required: bool,
}

const fn column(name: &'static str, kind: ColumnType, required: bool) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        required,
    }
}

/// Static description of one synced table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub table: SyncTable,
    pub name: &'static str,
    pub key: KeyKind,
    pub columns: &'static [ColumnSpec],
    /// Columns that identify the same real-world thing across devices
    pub natural_key: Option<&'static [&'static str]>,
}

impl TableSpec {
    /// Look up a domain column by name
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// The fixed set of tables the engine replicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    Cabinets,
    Nodes,
    MaintenanceSessions,
    SessionNodes,
    InspectionNotes,
}

impl SyncTable {
    /// Every synced table, parents before children
    pub const ALL: [Self; 5] = [
        Self::Cabinets,
        Self::Nodes,
        Self::MaintenanceSessions,
        Self::SessionNodes,
        Self::InspectionNotes,
    ];

    /// Table name in both the local and the central store
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Static table description
    pub fn spec(self) -> &'static TableSpec {
        match self {
            Self::Cabinets => &CABINETS,
            Self::Nodes => &NODES,
            Self::MaintenanceSessions => &MAINTENANCE_SESSIONS,
            Self::SessionNodes => &SESSION_NODES,
            Self::InspectionNotes => &INSPECTION_NOTES,
        }
    }

    /// Metadata key holding this table's pull cursor
    pub fn cursor_key(self) -> String {
        format!("last_sync_{}", self.name())
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SyncTable {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|table| table.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown sync table: {s}")))
    }
}

static CABINETS: TableSpec = TableSpec {
    table: SyncTable::Cabinets,
    name: "cabinets",
    key: KeyKind::Integer,
    columns: &[
        column("name", ColumnType::Text, true),
        column("location", ColumnType::Text, false),
    ],
    natural_key: None,
};

static NODES: TableSpec = TableSpec {
    table: SyncTable::Nodes,
    name: "nodes",
    key: KeyKind::Integer,
    columns: &[
        column("cabinet_id", ColumnType::Integer, true),
        column("label", ColumnType::Text, true),
        column("status", ColumnType::Text, false),
    ],
    natural_key: None,
};

static MAINTENANCE_SESSIONS: TableSpec = TableSpec {
    table: SyncTable::MaintenanceSessions,
    name: "maintenance_sessions",
    key: KeyKind::Integer,
    columns: &[
        column("title", ColumnType::Text, true),
        column("technician", ColumnType::Text, false),
        column("started_at", ColumnType::Integer, false),
        column("notes", ColumnType::Text, false),
    ],
    natural_key: None,
};

static SESSION_NODES: TableSpec = TableSpec {
    table: SyncTable::SessionNodes,
    name: "session_nodes",
    key: KeyKind::Integer,
    columns: &[
        column("session_id", ColumnType::Integer, true),
        column("node_id", ColumnType::Integer, true),
        column("result", ColumnType::Text, false),
        column("reading", ColumnType::Real, false),
    ],
    natural_key: Some(&["session_id", "node_id"]),
};

static INSPECTION_NOTES: TableSpec = TableSpec {
    table: SyncTable::InspectionNotes,
    name: "inspection_notes",
    key: KeyKind::Text,
    columns: &[
        column("session_id", ColumnType::Integer, true),
        column("body", ColumnType::Text, true),
    ],
    natural_key: None,
};
