//! Identity reconciliation between local rows and central documents

use libsql::Connection;

use crate::central::CentralSession;
use crate::db::TableStore;
use crate::error::{Error, Result};
use crate::models::{GlobalId, IncomingRecord, Record, SyncTable};

/// Where an incoming record lands locally
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// A local row already carries the incoming global id
    Existing(Record),
    /// A local row describes the same thing; it adopts the incoming global id
    NaturalKey(Record),
    /// Nothing matches; a new row is inserted
    New,
}

impl Placement {
    /// The matched local row, if any
    pub const fn local(&self) -> Option<&Record> {
        match self {
            Self::Existing(record) | Self::NaturalKey(record) => Some(record),
            Self::New => None,
        }
    }
}

/// Matches incoming records to local rows and picks global ids for outgoing ones.
pub struct IdentityReconciler<'a> {
    conn: &'a Connection,
}

impl<'a> IdentityReconciler<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn table(&self, table: SyncTable) -> TableStore<'a> {
        TableStore::new(self.conn, table.spec())
    }

    /// Global id first, then natural key, else a new row.
    ///
    /// Tombstones only ever match by global id.
    pub async fn match_incoming(
        &self,
        table: SyncTable,
        incoming: &IncomingRecord,
    ) -> Result<Placement> {
        let store = self.table(table);
        if let Some(record) = store.find_by_global_id(&incoming.global_id).await? {
            return Ok(Placement::Existing(record));
        }
        if incoming.deleted {
            return Ok(Placement::New);
        }
        if let Some(record) = store
            .find_by_natural_key(&incoming.fields, Some(&incoming.global_id))
            .await?
        {
            tracing::debug!(
                "{} row {} matches incoming {} by natural key",
                table,
                record.id,
                incoming.global_id
            );
            return Ok(Placement::NaturalKey(record));
        }
        Ok(Placement::New)
    }

    /// Choose the global id `record` is pushed under and persist it locally.
    ///
    /// Adopts the id of a live central document with the same natural key when
    /// the central store does not know the record's own id yet.
    pub async fn assign_outgoing<S: CentralSession>(
        &self,
        session: &S,
        table: SyncTable,
        record: &Record,
    ) -> Result<GlobalId> {
        let store = self.table(table);

        if let Some(global_id) = record.global_id {
            if session.find(table, &global_id).await?.is_some() {
                return Ok(global_id);
            }
        }

        let adopted = match store.natural_key_of(&record.fields) {
            Some(key) => session
                .find_by_natural_key(table, &key)
                .await?
                .map(|document| {
                    document.global_id.parse::<GlobalId>().map_err(|_| {
                        Error::record(
                            table.name(),
                            format!("central document has invalid global id {:?}", document.global_id),
                        )
                    })
                })
                .transpose()?
                .filter(|found| Some(*found) != record.global_id),
            None => None,
        };

        let global_id = match (adopted, record.global_id) {
            (Some(adopted), previous) => {
                tracing::info!(
                    "{} row {} adopts central id {} (was {:?})",
                    table,
                    record.id,
                    adopted,
                    previous.map(|id| id.to_string())
                );
                adopted
            }
            (None, Some(existing)) => return Ok(existing),
            (None, None) => GlobalId::new(),
        };

        store.set_global_id(&record.id, &global_id).await?;
        Ok(global_id)
    }
}
