//! SQL adapter for one synced table

use libsql::{params_from_iter, Connection, Row, Value};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::models::{
    ColumnType, Fields, GlobalId, IncomingRecord, KeyKind, LocalId, Record, SyncState, TableSpec,
};

const BOOKKEEPING_COLUMNS: &str =
    "id, global_id, origin_device, sync_state, is_deleted, created_at, updated_at";
const BOOKKEEPING_COUNT: i32 = 7;

/// Row-level operations the engine needs from one local table
pub struct TableStore<'a> {
    conn: &'a Connection,
    spec: &'static TableSpec,
}

impl<'a> TableStore<'a> {
    /// Create a new adapter over `spec`'s table
    pub const fn new(conn: &'a Connection, spec: &'static TableSpec) -> Self {
        Self { conn, spec }
    }

    /// Table description this adapter serves
    pub const fn spec(&self) -> &'static TableSpec {
        self.spec
    }

    fn select_sql(&self, filter: &str) -> String {
        let domain = self
            .spec
            .columns
            .iter()
            .map(|column| column.name)
            .collect::<Vec<_>>();
        let domain = if domain.is_empty() {
            String::new()
        } else {
            format!(", {}", domain.join(", "))
        };
        format!(
            "SELECT {BOOKKEEPING_COLUMNS}{domain} FROM {} {filter}",
            self.spec.name
        )
    }

    async fn query_records(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Record>> {
        let mut rows = self.conn.query(sql, params_from_iter(params)).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(self.parse_row(&row)?);
        }
        Ok(records)
    }

    async fn query_one(&self, sql: &str, params: Vec<Value>) -> Result<Option<Record>> {
        Ok(self.query_records(sql, params).await?.into_iter().next())
    }

    /// Parse a record from a row selected with [`Self::select_sql`]
    fn parse_row(&self, row: &Row) -> Result<Record> {
        let id = match row.get_value(0)? {
            Value::Integer(id) => LocalId::Int(id),
            Value::Text(id) => LocalId::Text(id),
            other => {
                return Err(Error::Database(format!(
                    "{}: unexpected primary key {other:?}",
                    self.spec.name
                )))
            }
        };
        let global_id = match row.get_value(1)? {
            Value::Text(raw) if !raw.trim().is_empty() => Some(raw.parse().map_err(|_| {
                Error::Database(format!("{}: invalid global id {raw}", self.spec.name))
            })?),
            _ => None,
        };

        let mut fields = Fields::new();
        for (offset, column) in (0_i32..).zip(self.spec.columns.iter()) {
            let value = row.get_value(BOOKKEEPING_COUNT + offset)?;
            fields.insert(column.name.to_string(), sql_to_json(value));
        }

        Ok(Record {
            id,
            global_id,
            origin_device: text_or_empty(row.get_value(2)?),
            sync_state: SyncState::from_i64(row.get::<i64>(3)?),
            deleted: row.get::<i64>(4)? != 0,
            created_at: row.get::<i64>(5)?,
            updated_at: row.get::<i64>(6)?,
            fields,
        })
    }

    /// Get a row by local id, including tombstoned rows
    pub async fn get(&self, id: &LocalId) -> Result<Option<Record>> {
        self.query_one(&self.select_sql("WHERE id = ?"), vec![id.to_value()])
            .await
    }

    /// Find the row carrying `global_id`
    pub async fn find_by_global_id(&self, global_id: &GlobalId) -> Result<Option<Record>> {
        self.query_one(
            &self.select_sql("WHERE global_id = ?"),
            vec![Value::Text(global_id.as_str())],
        )
        .await
    }

    /// Natural key values of `fields`, if this table has a natural key and all parts are set
    pub fn natural_key_of(&self, fields: &Fields) -> Option<Vec<(&'static str, JsonValue)>> {
        let key = self.spec.natural_key?;
        key.iter()
            .map(|name| match fields.get(*name) {
                Some(value) if !value.is_null() => Some((*name, value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Find a live row describing the same real-world thing as `fields`.
    ///
    /// Tombstones and rows that already carry `exclude` as global id are
    /// skipped. Among several matches an unsynced row comes first.
    pub async fn find_by_natural_key(
        &self,
        fields: &Fields,
        exclude: Option<&GlobalId>,
    ) -> Result<Option<Record>> {
        let Some(parts) = self.natural_key_of(fields) else {
            return Ok(None);
        };

        let mut clauses = Vec::with_capacity(parts.len() + 2);
        clauses.push("is_deleted = 0".to_string());
        let mut params = Vec::with_capacity(parts.len() + 1);
        for (name, value) in &parts {
            clauses.push(format!("{name} = ?"));
            params.push(self.json_to_sql(name, value)?);
        }
        if let Some(global_id) = exclude {
            clauses.push("(global_id IS NULL OR global_id != ?)".to_string());
            params.push(Value::Text(global_id.as_str()));
        }

        let filter = format!(
            "WHERE {} ORDER BY sync_state ASC, created_at ASC LIMIT 1",
            clauses.join(" AND ")
        );
        self.query_one(&self.select_sql(&filter), params).await
    }

    /// All rows with un-pushed changes, tombstones included
    pub async fn list_unsynced(&self) -> Result<Vec<Record>> {
        self.query_records(
            &self.select_sql("WHERE sync_state = 0 ORDER BY updated_at ASC"),
            Vec::new(),
        )
        .await
    }

    /// Every row, tombstones included
    pub async fn list_all(&self) -> Result<Vec<Record>> {
        self.query_records(&self.select_sql("ORDER BY created_at ASC"), Vec::new())
            .await
    }

    /// Insert a locally created row; it starts unsynced and without a global id
    pub async fn insert_local(&self, fields: &Fields, device_id: &str, now: i64) -> Result<Record> {
        self.validate(fields)?;
        let id = self.next_id();
        let mut names = vec!["origin_device", "sync_state", "is_deleted", "created_at", "updated_at"];
        let mut params = vec![
            Value::Text(device_id.to_string()),
            Value::Integer(SyncState::Unsynced.as_i64()),
            Value::Integer(0),
            Value::Integer(now),
            Value::Integer(now),
        ];
        if let Some(id) = &id {
            names.push("id");
            params.push(id.to_value());
        }
        self.push_domain_values(fields, &mut names, &mut params)?;

        let id = self.insert_row(&names, params, id).await?;
        self.get(&id)
            .await?
            .ok_or_else(|| Error::Database(format!("{}: inserted row {id} vanished", self.spec.name)))
    }

    /// Overwrite domain fields of a live row and mark it dirty
    pub async fn update_local(
        &self,
        id: &LocalId,
        fields: &Fields,
        device_id: &str,
        now: i64,
    ) -> Result<Record> {
        let mut assignments = vec![
            "origin_device = ?".to_string(),
            "sync_state = ?".to_string(),
            "updated_at = ?".to_string(),
        ];
        let mut params = vec![
            Value::Text(device_id.to_string()),
            Value::Integer(SyncState::Unsynced.as_i64()),
            Value::Integer(now),
        ];
        for (name, value) in fields {
            let column = self.spec.column(name).ok_or_else(|| {
                Error::InvalidInput(format!("{} has no column {name}", self.spec.name))
            })?;
            if column.required && value.is_null() {
                return Err(Error::InvalidInput(format!(
                    "{}.{name} must not be null",
                    self.spec.name
                )));
            }
            assignments.push(format!("{} = ?", column.name));
            params.push(self.json_to_sql(column.name, value)?);
        }
        params.push(id.to_value());

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? AND is_deleted = 0",
            self.spec.name,
            assignments.join(", ")
        );
        let rows = self.conn.execute(&sql, params_from_iter(params)).await?;
        if rows == 0 {
            return Err(Error::InvalidInput(format!(
                "{} row {id} not found",
                self.spec.name
            )));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("{} row {id} not found", self.spec.name)))
    }

    /// Tombstone a row and mark it dirty
    pub async fn soft_delete(&self, id: &LocalId, device_id: &str, now: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET is_deleted = 1, sync_state = ?, origin_device = ?, updated_at = ?
             WHERE id = ? AND is_deleted = 0",
            self.spec.name
        );
        let rows = self
            .conn
            .execute(
                &sql,
                params_from_iter(vec![
                    Value::Integer(SyncState::Unsynced.as_i64()),
                    Value::Text(device_id.to_string()),
                    Value::Integer(now),
                    id.to_value(),
                ]),
            )
            .await?;
        Ok(rows > 0)
    }

    /// Flag a row as changed by this device
    pub async fn mark_dirty(&self, id: &LocalId, device_id: &str, now: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET sync_state = ?, origin_device = ?, updated_at = ? WHERE id = ?",
            self.spec.name
        );
        let rows = self
            .conn
            .execute(
                &sql,
                params_from_iter(vec![
                    Value::Integer(SyncState::Unsynced.as_i64()),
                    Value::Text(device_id.to_string()),
                    Value::Integer(now),
                    id.to_value(),
                ]),
            )
            .await?;
        Ok(rows > 0)
    }

    /// Clear the dirty flag of a row
    pub async fn mark_synced(&self, id: &LocalId) -> Result<bool> {
        let sql = format!("UPDATE {} SET sync_state = ? WHERE id = ?", self.spec.name);
        let rows = self
            .conn
            .execute(
                &sql,
                params_from_iter(vec![
                    Value::Integer(SyncState::Synced.as_i64()),
                    id.to_value(),
                ]),
            )
            .await?;
        Ok(rows > 0)
    }

    /// Clear the dirty flag unless the row was written again after `updated_at`
    pub async fn mark_synced_at(&self, id: &LocalId, updated_at: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET sync_state = ? WHERE id = ? AND updated_at = ?",
            self.spec.name
        );
        let rows = self
            .conn
            .execute(
                &sql,
                params_from_iter(vec![
                    Value::Integer(SyncState::Synced.as_i64()),
                    id.to_value(),
                    Value::Integer(updated_at),
                ]),
            )
            .await?;
        Ok(rows > 0)
    }

    /// Persist the global id chosen for a row
    pub async fn set_global_id(&self, id: &LocalId, global_id: &GlobalId) -> Result<()> {
        let sql = format!("UPDATE {} SET global_id = ? WHERE id = ?", self.spec.name);
        self.conn
            .execute(
                &sql,
                params_from_iter(vec![Value::Text(global_id.as_str()), id.to_value()]),
            )
            .await?;
        Ok(())
    }

    /// Write an accepted remote version, inserting a row or replacing `existing`.
    ///
    /// The written row is synced and carries the remote global id.
    pub async fn upsert_local(
        &self,
        existing: Option<&LocalId>,
        incoming: &IncomingRecord,
    ) -> Result<LocalId> {
        let mut names = vec![
            "global_id",
            "origin_device",
            "sync_state",
            "is_deleted",
            "created_at",
            "updated_at",
        ];
        let mut params = vec![
            Value::Text(incoming.global_id.as_str()),
            Value::Text(incoming.origin_device.clone()),
            Value::Integer(SyncState::Synced.as_i64()),
            Value::Integer(i64::from(incoming.deleted)),
            Value::Integer(incoming.created_at),
            Value::Integer(incoming.updated_at),
        ];
        self.push_domain_values(&incoming.fields, &mut names, &mut params)?;

        if let Some(id) = existing {
            let assignments = names
                .iter()
                .map(|name| format!("{name} = ?"))
                .collect::<Vec<_>>()
                .join(", ");
            params.push(id.to_value());
            let sql = format!("UPDATE {} SET {assignments} WHERE id = ?", self.spec.name);
            self.conn.execute(&sql, params_from_iter(params)).await?;
            return Ok(id.clone());
        }

        let id = self.next_id();
        if let Some(id) = &id {
            names.push("id");
            params.push(id.to_value());
        }
        self.insert_row(&names, params, id).await
    }

    /// Number of rows, tombstones included
    pub async fn count(&self) -> Result<u64> {
        self.scalar(&format!("SELECT COUNT(*) FROM {}", self.spec.name))
            .await
    }

    /// Number of rows with un-pushed changes
    pub async fn count_unsynced(&self) -> Result<u64> {
        self.scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE sync_state = 0",
            self.spec.name
        ))
        .await
    }

    /// Force every row into `state`, returning how many changed
    pub async fn set_all_sync_state(&self, state: SyncState) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET sync_state = ? WHERE sync_state != ?",
            self.spec.name
        );
        let rows = self
            .conn
            .execute(&sql, [state.as_i64(), state.as_i64()])
            .await?;
        Ok(rows)
    }

    async fn scalar(&self, sql: &str) -> Result<u64> {
        let mut rows = self.conn.query(sql, ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn next_id(&self) -> Option<LocalId> {
        match self.spec.key {
            KeyKind::Integer => None,
            KeyKind::Text => Some(LocalId::Text(uuid::Uuid::now_v7().to_string())),
        }
    }

    async fn insert_row(
        &self,
        names: &[&str],
        params: Vec<Value>,
        id: Option<LocalId>,
    ) -> Result<LocalId> {
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.spec.name,
            names.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(params)).await?;
        Ok(id.unwrap_or_else(|| LocalId::Int(self.conn.last_insert_rowid())))
    }

    fn push_domain_values(
        &self,
        fields: &Fields,
        names: &mut Vec<&'static str>,
        params: &mut Vec<Value>,
    ) -> Result<()> {
        for column in self.spec.columns {
            names.push(column.name);
            let value = fields.get(column.name).unwrap_or(&JsonValue::Null);
            params.push(self.json_to_sql(column.name, value)?);
        }
        Ok(())
    }

    /// Reject field sets missing a required column
    pub fn validate(&self, fields: &Fields) -> Result<()> {
        for column in self.spec.columns.iter().filter(|column| column.required) {
            if fields.get(column.name).is_none_or(JsonValue::is_null) {
                return Err(Error::record(
                    self.spec.name,
                    format!("required field {} is missing", column.name),
                ));
            }
        }
        Ok(())
    }

    fn json_to_sql(&self, name: &str, value: &JsonValue) -> Result<Value> {
        let kind = self
            .spec
            .column(name)
            .map_or(ColumnType::Text, |column| column.kind);
        let invalid = || {
            Error::record(
                self.spec.name,
                format!("field {name} has unexpected value {value}"),
            )
        };

        Ok(match (kind, value) {
            (_, JsonValue::Null) => Value::Null,
            (ColumnType::Integer, JsonValue::Number(number)) => {
                Value::Integer(number.as_i64().ok_or_else(invalid)?)
            }
            (ColumnType::Integer, JsonValue::Bool(flag)) => Value::Integer(i64::from(*flag)),
            (ColumnType::Real, JsonValue::Number(number)) => {
                Value::Real(number.as_f64().ok_or_else(invalid)?)
            }
            (ColumnType::Text, JsonValue::String(text)) => Value::Text(text.clone()),
            (ColumnType::Text, JsonValue::Number(number)) => Value::Text(number.to_string()),
            (ColumnType::Text, JsonValue::Bool(flag)) => Value::Text(flag.to_string()),
            _ => return Err(invalid()),
        })
    }
}

fn sql_to_json(value: Value) -> JsonValue {
    match value {
        Value::Integer(number) => JsonValue::from(number),
        Value::Real(number) => serde_json::Number::from_f64(number)
            .map_or(JsonValue::Null, JsonValue::Number),
        Value::Text(text) => JsonValue::String(text),
        Value::Null | Value::Blob(_) => JsonValue::Null,
    }
}

fn text_or_empty(value: Value) -> String {
    match value {
        Value::Text(text) => text,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use crate::models::SyncTable;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: JsonValue) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn incoming(fields_value: JsonValue) -> IncomingRecord {
        IncomingRecord {
            global_id: GlobalId::new(),
            origin_device: "tablet-b".to_string(),
            deleted: false,
            created_at: 1_000,
            updated_at: 2_000,
            fields: fields(fields_value),
            server_stamp: 1,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_local_starts_unsynced_without_global_id() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::Cabinets.spec());

        let record = table
            .insert_local(&fields(json!({"name": "C-12"})), "tablet-a", 500)
            .await
            .unwrap();

        assert_eq!(record.id, LocalId::Int(1));
        assert_eq!(record.global_id, None);
        assert_eq!(record.sync_state, SyncState::Unsynced);
        assert_eq!(record.origin_device, "tablet-a");
        assert_eq!(record.fields["name"], json!("C-12"));
        assert_eq!(record.fields["location"], JsonValue::Null);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn text_keyed_tables_generate_ids() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::InspectionNotes.spec());

        let record = table
            .insert_local(
                &fields(json!({"session_id": 1, "body": "door seal worn"})),
                "tablet-a",
                500,
            )
            .await
            .unwrap();

        assert!(matches!(record.id, LocalId::Text(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_local_rejects_missing_required_field() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::Nodes.spec());

        let error = table
            .insert_local(&fields(json!({"label": "N-1"})), "tablet-a", 500)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("cabinet_id"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unsynced_listing_includes_tombstones() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::Cabinets.spec());

        let kept = table
            .insert_local(&fields(json!({"name": "keep"})), "a", 1)
            .await
            .unwrap();
        let gone = table
            .insert_local(&fields(json!({"name": "gone"})), "a", 2)
            .await
            .unwrap();
        table.mark_synced(&kept.id).await.unwrap();
        table.mark_synced(&gone.id).await.unwrap();
        assert!(table.soft_delete(&gone.id, "a", 3).await.unwrap());

        let unsynced = table.list_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, gone.id);
        assert!(unsynced[0].deleted);
        assert_eq!(table.count().await.unwrap(), 2);
        assert_eq!(table.count_unsynced().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_local_inserts_then_replaces() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::SessionNodes.spec());
        let mut remote = incoming(json!({"session_id": 5, "node_id": 9, "result": "ok"}));

        let id = table.upsert_local(None, &remote).await.unwrap();
        let stored = table.find_by_global_id(&remote.global_id).await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.sync_state, SyncState::Synced);
        assert_eq!(stored.origin_device, "tablet-b");

        remote.fields = fields(json!({"session_id": 5, "node_id": 9, "result": "fault", "reading": 3.5}));
        remote.updated_at = 3_000;
        let same = table.upsert_local(Some(&id), &remote).await.unwrap();
        assert_eq!(same, id);

        let stored = table.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.fields["result"], json!("fault"));
        assert_eq!(stored.fields["reading"], json!(3.5));
        assert_eq!(stored.updated_at, 3_000);
        assert_eq!(table.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn natural_key_lookup_matches_pair() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::SessionNodes.spec());
        let local = table
            .insert_local(&fields(json!({"session_id": 5, "node_id": 9})), "a", 1)
            .await
            .unwrap();

        let hit = table
            .find_by_natural_key(&fields(json!({"session_id": 5, "node_id": 9})), None)
            .await
            .unwrap();
        assert_eq!(hit.map(|record| record.id), Some(local.id));

        let miss = table
            .find_by_natural_key(&fields(json!({"session_id": 5, "node_id": 10})), None)
            .await
            .unwrap();
        assert!(miss.is_none());

        let cabinets = TableStore::new(store.connection(), SyncTable::Cabinets.spec());
        let none = cabinets
            .find_by_natural_key(&fields(json!({"name": "x"})), None)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn natural_key_lookup_skips_tombstones_and_prefers_unsynced() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::SessionNodes.spec());
        let pair = fields(json!({"session_id": 5, "node_id": 9}));

        let gone = table.insert_local(&pair, "a", 1).await.unwrap();
        table.mark_synced(&gone.id).await.unwrap();
        assert!(table.soft_delete(&gone.id, "a", 2).await.unwrap());
        assert!(table.find_by_natural_key(&pair, None).await.unwrap().is_none());

        let synced = table.insert_local(&pair, "a", 3).await.unwrap();
        table.mark_synced(&synced.id).await.unwrap();
        let pending = table.insert_local(&pair, "a", 4).await.unwrap();

        let hit = table.find_by_natural_key(&pair, None).await.unwrap();
        assert_eq!(hit.map(|record| record.id), Some(pending.id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mismatched_field_types_are_record_errors() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::SessionNodes.spec());
        let remote = incoming(json!({"session_id": "five", "node_id": 9}));

        let error = table.upsert_local(None, &remote).await.unwrap_err();
        assert!(matches!(error, Error::Record { .. }));
        assert_eq!(table.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_synced_at_skips_rows_written_since() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::Cabinets.spec());
        let record = table
            .insert_local(&fields(json!({"name": "C-1"})), "a", 100)
            .await
            .unwrap();
        table
            .update_local(&record.id, &fields(json!({"name": "C-1b"})), "a", 200)
            .await
            .unwrap();

        assert!(!table.mark_synced_at(&record.id, 100).await.unwrap());
        assert_eq!(table.count_unsynced().await.unwrap(), 1);
        assert!(table.mark_synced_at(&record.id, 200).await.unwrap());
        assert_eq!(table.count_unsynced().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn set_all_sync_state_counts_changed_rows() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let table = TableStore::new(store.connection(), SyncTable::Cabinets.spec());
        for name in ["a", "b", "c"] {
            table
                .insert_local(&fields(json!({"name": name})), "a", 1)
                .await
                .unwrap();
        }

        assert_eq!(table.set_all_sync_state(SyncState::Synced).await.unwrap(), 3);
        assert_eq!(table.set_all_sync_state(SyncState::Synced).await.unwrap(), 0);
        assert_eq!(table.count_unsynced().await.unwrap(), 0);
    }
}
