//! Central documents kept in a libSQL database

use std::fmt;
use std::path::{Path, PathBuf};

use libsql::{
    params_from_iter, Builder, Connection, Database as LibSqlDatabase, Row, TransactionBehavior,
    Value,
};
use serde_json::Value as JsonValue;

use super::{CentralSession, CentralStore, FetchBatch, RemoteDocument, UpsertOutcome};
use crate::error::{Error, Result};
use crate::models::{GlobalId, SyncTable};
use crate::util::{is_http_url, millis_to_rfc3339, now_millis};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS sync_documents (
        table_name TEXT NOT NULL,
        global_id TEXT NOT NULL,
        origin_device TEXT NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        data TEXT NOT NULL,
        server_stamp INTEGER NOT NULL,
        PRIMARY KEY (table_name, global_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_documents_stamp
        ON sync_documents(table_name, server_stamp)",
    "CREATE TABLE IF NOT EXISTS sync_clock (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        stamp INTEGER NOT NULL
    )",
    "INSERT OR IGNORE INTO sync_clock (id, stamp) VALUES (1, 0)",
];

const DOCUMENT_COLUMNS: &str =
    "global_id, origin_device, is_deleted, created_at, updated_at, data, server_stamp";

#[derive(Clone)]
enum Target {
    Remote { url: String, auth_token: String },
    Local(PathBuf),
}

/// Central store backed by a remote libSQL server or a shared database file
#[derive(Clone)]
pub struct LibSqlCentralStore {
    target: Target,
}

impl fmt::Debug for LibSqlCentralStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibSqlCentralStore")
            .field("target", &self.describe())
            .finish()
    }
}

impl LibSqlCentralStore {
    /// Remote libSQL / Turso database
    pub fn remote(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            target: Target::Remote {
                url: url.into(),
                auth_token: auth_token.into(),
            },
        }
    }

    /// Database file shared by every device
    pub fn local(path: impl AsRef<Path>) -> Self {
        Self {
            target: Target::Local(path.as_ref().to_path_buf()),
        }
    }

    /// Pick the target from a configured URL.
    ///
    /// `libsql://`, `http://` and `https://` URLs are remote; `file:` URLs and
    /// bare paths are local files.
    pub fn from_url(url: &str, auth_token: Option<&str>) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::Config("central URL is empty".to_string()));
        }
        if url.starts_with("libsql://") || is_http_url(url) {
            return Ok(Self::remote(url, auth_token.unwrap_or_default()));
        }
        let path = url.strip_prefix("file:").unwrap_or(url);
        Ok(Self::local(path))
    }

    async fn open(&self) -> Result<(LibSqlDatabase, Connection)> {
        let db = match &self.target {
            Target::Remote { url, auth_token } => {
                Builder::new_remote(url.clone(), auth_token.clone())
                    .build()
                    .await?
            }
            Target::Local(path) => {
                Builder::new_local(path.to_string_lossy().to_string())
                    .build()
                    .await?
            }
        };
        let conn = db.connect()?;
        for statement in SCHEMA {
            conn.execute(statement, ()).await?;
        }
        Ok((db, conn))
    }
}

impl CentralStore for LibSqlCentralStore {
    type Session = LibSqlSession;

    async fn connect(&self) -> Result<LibSqlSession> {
        let (db, conn) = self
            .open()
            .await
            .map_err(|error| Error::Connectivity(format!("{}: {error}", self.describe())))?;
        tracing::debug!("Opened central session on {}", self.describe());
        Ok(LibSqlSession { _db: db, conn })
    }

    fn describe(&self) -> String {
        match &self.target {
            Target::Remote { url, .. } => url.clone(),
            Target::Local(path) => path.display().to_string(),
        }
    }
}

/// Session over a [`LibSqlCentralStore`]
pub struct LibSqlSession {
    // Kept alive for the lifetime of `conn`
    _db: LibSqlDatabase,
    conn: Connection,
}

fn central(error: libsql::Error) -> Error {
    Error::Central(error.to_string())
}

fn parse_document(row: &Row) -> Result<RemoteDocument> {
    let raw = row.get::<String>(5).map_err(central)?;
    // Unparseable data is surfaced as a string and rejected per record on pull
    let data = serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw));
    Ok(RemoteDocument {
        global_id: row.get::<String>(0).map_err(central)?,
        origin_device: row.get::<String>(1).map_err(central)?,
        deleted: row.get::<i64>(2).map_err(central)? != 0,
        created_at: row.get::<String>(3).map_err(central)?,
        updated_at: row.get::<String>(4).map_err(central)?,
        data,
        server_stamp: row.get::<i64>(6).map_err(central)?,
    })
}

fn json_param(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(flag) => Value::Integer(i64::from(*flag)),
        JsonValue::Number(number) => number
            .as_i64()
            .map(Value::Integer)
            .or_else(|| number.as_f64().map(Value::Real))
            .unwrap_or(Value::Null),
        JsonValue::String(text) => Value::Text(text.clone()),
        other => Value::Text(other.to_string()),
    }
}

impl LibSqlSession {
    async fn query_documents(
        &self,
        conn: &Connection,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<RemoteDocument>> {
        let mut rows = conn
            .query(sql, params_from_iter(params))
            .await
            .map_err(central)?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next().await.map_err(central)? {
            documents.push(parse_document(&row)?);
        }
        Ok(documents)
    }

    async fn next_stamp(conn: &Connection) -> Result<i64> {
        let mut rows = conn
            .query(
                "UPDATE sync_clock SET stamp = MAX(stamp + 1, ?) WHERE id = 1 RETURNING stamp",
                [now_millis()],
            )
            .await
            .map_err(central)?;
        let row = rows
            .next()
            .await
            .map_err(central)?
            .ok_or_else(|| Error::Central("central clock row is missing".to_string()))?;
        row.get::<i64>(0).map_err(central)
    }

    async fn exists(conn: &Connection, table: SyncTable, global_id: &str) -> Result<bool> {
        let mut rows = conn
            .query(
                "SELECT 1 FROM sync_documents WHERE table_name = ? AND global_id = ?",
                [table.name(), global_id],
            )
            .await
            .map_err(central)?;
        Ok(rows.next().await.map_err(central)?.is_some())
    }
}

impl CentralSession for LibSqlSession {
    async fn fetch_changed(
        &self,
        table: SyncTable,
        since: Option<i64>,
        exclude_origin: &str,
    ) -> Result<FetchBatch> {
        // Clock and documents are read from one snapshot
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .await
            .map_err(central)?;

        let mut rows = tx
            .query("SELECT stamp FROM sync_clock WHERE id = 1", ())
            .await
            .map_err(central)?;
        let watermark = match rows.next().await.map_err(central)? {
            Some(row) => row.get::<i64>(0).map_err(central)?,
            None => 0,
        };
        drop(rows);

        let mut params = vec![
            Value::Text(table.name().to_string()),
            Value::Text(exclude_origin.to_string()),
        ];
        let filter = match since {
            Some(since) => {
                params.push(Value::Integer(since));
                "AND server_stamp > ?"
            }
            None => "AND is_deleted = 0",
        };
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM sync_documents
             WHERE table_name = ? AND origin_device != ? {filter}
             ORDER BY server_stamp ASC"
        );
        let documents = self.query_documents(&tx, &sql, params).await?;
        tx.commit().await.map_err(central)?;

        Ok(FetchBatch {
            documents,
            watermark,
        })
    }

    async fn find(&self, table: SyncTable, global_id: &GlobalId) -> Result<Option<RemoteDocument>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM sync_documents WHERE table_name = ? AND global_id = ?"
        );
        let params = vec![
            Value::Text(table.name().to_string()),
            Value::Text(global_id.as_str()),
        ];
        Ok(self
            .query_documents(&self.conn, &sql, params)
            .await?
            .into_iter()
            .next())
    }

    async fn find_by_natural_key(
        &self,
        table: SyncTable,
        key: &[(&str, JsonValue)],
    ) -> Result<Option<RemoteDocument>> {
        if key.is_empty() {
            return Ok(None);
        }

        let mut clauses = vec!["table_name = ?".to_string(), "is_deleted = 0".to_string()];
        let mut params = vec![Value::Text(table.name().to_string())];
        for (column, value) in key {
            if !column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::InvalidInput(format!("invalid key column {column:?}")));
            }
            if value.is_null() {
                clauses.push(format!("json_extract(data, '$.{column}') IS NULL"));
            } else {
                clauses.push(format!("json_extract(data, '$.{column}') = ?"));
                params.push(json_param(value));
            }
        }

        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM sync_documents WHERE {}
             ORDER BY server_stamp ASC LIMIT 1",
            clauses.join(" AND ")
        );
        Ok(self
            .query_documents(&self.conn, &sql, params)
            .await?
            .into_iter()
            .next())
    }

    async fn upsert(&self, table: SyncTable, document: RemoteDocument) -> Result<UpsertOutcome> {
        let data = serde_json::to_string(&document.data)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(central)?;

        let existed = Self::exists(&tx, table, &document.global_id).await?;
        let stamp = Self::next_stamp(&tx).await?;
        tx.execute(
            "INSERT INTO sync_documents
                (table_name, global_id, origin_device, is_deleted, created_at, updated_at, data, server_stamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(table_name, global_id) DO UPDATE SET
                origin_device = excluded.origin_device,
                is_deleted = excluded.is_deleted,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                data = excluded.data,
                server_stamp = excluded.server_stamp",
            params_from_iter(vec![
                Value::Text(table.name().to_string()),
                Value::Text(document.global_id),
                Value::Text(document.origin_device),
                Value::Integer(i64::from(document.deleted)),
                Value::Text(document.created_at),
                Value::Text(document.updated_at),
                Value::Text(data),
                Value::Integer(stamp),
            ]),
        )
        .await
        .map_err(central)?;
        tx.commit().await.map_err(central)?;

        Ok(if existed {
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
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(central)?;

        let global_id = global_id.as_str();
        if !Self::exists(&tx, table, &global_id).await? {
            return Ok(false);
        }
        let stamp = Self::next_stamp(&tx).await?;
        tx.execute(
            "UPDATE sync_documents
             SET is_deleted = 1, origin_device = ?, updated_at = ?, server_stamp = ?
             WHERE table_name = ? AND global_id = ?",
            params_from_iter(vec![
                Value::Text(origin_device.to_string()),
                Value::Text(millis_to_rfc3339(updated_at)),
                Value::Integer(stamp),
                Value::Text(table.name().to_string()),
                Value::Text(global_id),
            ]),
        )
        .await
        .map_err(central)?;
        tx.commit().await.map_err(central)?;
        Ok(true)
    }

    async fn close(self) -> Result<()> {
        tracing::debug!("Closed central session");
        Ok(())
    }
}
