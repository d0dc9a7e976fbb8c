//! Sync cycle orchestration.
//!
//! A cycle connects to the central store, pulls every table in parent-first
//! order, then pushes every table in the same order:
//!
//! ```text
//! Idle ──► Connecting ──► Pulling ──► Pushing ──► Idle
//!              │
//!              └──► Failed (central store unreachable)
//! ```
//!
//! Only one cycle runs per coordinator at a time. Expected failures end up in
//! the returned report; only local store failures are returned as `Err`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::timeout;

use super::cursor::CursorStore;
use super::device::{local_hostname, DeviceIdentity, DeviceIdentityProvider};
use super::identity::IdentityReconciler;
use super::resolver::{resolve, Resolution};
use super::tracker::ChangeTracker;
use crate::central::{CentralSession, CentralStore, RemoteDocument};
use crate::config::SyncConfig;
use crate::db::{ensure_sync_columns, GuardReport, LocalStore, TableStore};
use crate::error::{Error, ErrorKind, Result};
use crate::models::{
    AdminReport, ConflictDisposition, ConflictRecord, CycleState, DeviceInfo, IncomingRecord,
    PullReport, PushReport, Record, SyncReport, SyncState, SyncStatus, SyncTable, TablePullResult,
    TablePushResult, TableStatus, TableSpec,
};

/// Stops a running cycle before its next table
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Full,
    PullOnly,
    PushOnly,
}

enum Applied {
    Written,
    Skipped,
    Conflict(ConflictRecord),
}

struct CycleOutcome {
    pull: PullReport,
    push: PushReport,
    state: CycleState,
    error: Option<String>,
}

impl CycleOutcome {
    fn failed(error: &Error, state: CycleState) -> Self {
        let message = error.to_string();
        Self {
            pull: PullReport::failed(message.clone()),
            push: PushReport::failed(message.clone()),
            state,
            error: Some(message),
        }
    }

    fn success(&self) -> bool {
        self.error.is_none() && self.pull.success && self.push.success
    }
}

/// Puts the state back to `Idle` when a cycle future is dropped mid-flight
struct StateReset<'a> {
    state_tx: &'a watch::Sender<CycleState>,
    armed: bool,
}

impl<'a> StateReset<'a> {
    const fn new(state_tx: &'a watch::Sender<CycleState>) -> Self {
        Self {
            state_tx,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StateReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            let previous = self.state_tx.send_replace(CycleState::Idle);
            tracing::warn!("Sync cycle abandoned while {}", previous);
        }
    }
}

/// Runs sync cycles between one local store and one central store.
pub struct SyncCoordinator<C: CentralStore> {
    store: LocalStore,
    central: C,
    config: SyncConfig,
    identity: DeviceIdentityProvider,
    cycle: Mutex<()>,
    state_tx: watch::Sender<CycleState>,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl<C: CentralStore> SyncCoordinator<C> {
    pub fn new(store: LocalStore, central: C, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(CycleState::Idle);
        let (cancel_tx, _) = watch::channel(false);
        Ok(Self {
            store,
            central,
            config,
            identity: DeviceIdentityProvider::new(),
            cycle: Mutex::new(()),
            state_tx,
            cancel_tx: Arc::new(cancel_tx),
        })
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current cycle state
    pub fn state(&self) -> CycleState {
        *self.state_tx.borrow()
    }

    /// Receiver notified on every state transition
    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state_tx.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// This device's identity, created on first use
    pub async fn device_identity(&self) -> Result<DeviceIdentity> {
        self.identity.get_or_create(self.store.connection()).await
    }

    /// Change tracker stamping writes with this device's id
    pub async fn tracker(&self) -> Result<ChangeTracker<'_>> {
        let identity = self.device_identity().await?;
        Ok(ChangeTracker::new(
            self.store.connection(),
            identity.device_id,
        ))
    }

    /// Pull every table, then push every table
    pub async fn run_full_sync(&self) -> Result<SyncReport> {
        let outcome = self.run_cycle(Mode::Full).await?;
        Ok(SyncReport {
            success: outcome.success(),
            pull: outcome.pull,
            push: outcome.push,
            state: outcome.state,
            error: outcome.error,
        })
    }

    pub async fn run_pull_only(&self) -> Result<PullReport> {
        let outcome = self.run_cycle(Mode::PullOnly).await?;
        let mut report = outcome.pull;
        if report.error.is_none() {
            report.error = outcome.error;
        }
        report.success = report.success && report.error.is_none();
        Ok(report)
    }

    pub async fn run_push_only(&self) -> Result<PushReport> {
        let outcome = self.run_cycle(Mode::PushOnly).await?;
        let mut report = outcome.push;
        if report.error.is_none() {
            report.error = outcome.error;
        }
        report.success = report.success && report.error.is_none();
        Ok(report)
    }

    /// Local bookkeeping plus a reachability probe of the central store
    pub async fn get_status(&self) -> Result<SyncStatus> {
        let identity = self.device_identity().await?;
        let connected = self.probe().await;
        let conn = self.store.connection();
        let cursors = CursorStore::new(conn);
        let guard = ensure_sync_columns(conn, &self.specs()).await?;

        let mut per_table = BTreeMap::new();
        for table in self.config.ordered_tables() {
            if !guard.is_ready(table) {
                continue;
            }
            let store = TableStore::new(conn, table.spec());
            per_table.insert(
                table,
                TableStatus {
                    local_count: store.count().await?,
                    unsynced_count: store.count_unsynced().await?,
                    last_sync_time: cursors.get(table).await?,
                },
            );
        }

        Ok(SyncStatus {
            device_id: identity.device_id,
            identity_durable: identity.durable,
            connected,
            state: self.state(),
            per_table,
        })
    }

    pub async fn get_device_info(&self) -> Result<DeviceInfo> {
        let identity = self.device_identity().await?;
        Ok(DeviceInfo {
            device_id: identity.device_id,
            identity_durable: identity.durable,
            hostname: local_hostname(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            sync_tables: self.config.ordered_tables(),
        })
    }

    /// Treat every local row as already pushed. Does not touch cursors.
    pub async fn force_mark_all_synced(&self) -> Result<AdminReport> {
        let _cycle = self.cycle.try_lock().map_err(|_| Error::CycleInProgress)?;
        let report = self.set_all_sync_state(SyncState::Synced).await?;
        tracing::warn!(
            "Marked {} rows as synced without pushing them",
            report.rows_updated
        );
        Ok(report)
    }

    /// Make the next cycle pull everything and push every row again
    pub async fn reset_sync_state(&self) -> Result<AdminReport> {
        let _cycle = self.cycle.try_lock().map_err(|_| Error::CycleInProgress)?;
        let mut report = self.set_all_sync_state(SyncState::Unsynced).await?;
        report.cursors_cleared = CursorStore::new(self.store.connection())
            .clear_all()
            .await?;
        tracing::warn!(
            "Reset sync state: {} rows unsynced, {} cursors cleared",
            report.rows_updated,
            report.cursors_cleared
        );
        Ok(report)
    }

    async fn set_all_sync_state(&self, state: SyncState) -> Result<AdminReport> {
        let conn = self.store.connection();
        let guard = ensure_sync_columns(conn, &self.specs()).await?;
        let mut report = AdminReport::default();
        for table in self.config.ordered_tables() {
            if !guard.is_ready(table) {
                continue;
            }
            let updated = TableStore::new(conn, table.spec())
                .set_all_sync_state(state)
                .await?;
            report.rows_updated += updated;
            report.per_table.insert(table, updated);
        }
        Ok(report)
    }

    fn specs(&self) -> Vec<&'static TableSpec> {
        self.config
            .ordered_tables()
            .into_iter()
            .map(SyncTable::spec)
            .collect()
    }

    fn set_state(&self, state: CycleState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!("Sync state {} -> {}", previous, state);
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    async fn connect(&self) -> Result<C::Session> {
        timeout(self.config.connect_timeout(), self.central.connect())
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout {
                    operation: format!("connect to {}", self.central.describe()),
                    seconds: self.config.connect_timeout_secs,
                })
            })
    }

    async fn probe(&self) -> bool {
        match self.connect().await {
            Ok(session) => {
                if let Err(error) = session.close().await {
                    tracing::debug!("Failed to close probe session: {}", error);
                }
                true
            }
            Err(error) => {
                tracing::debug!("Central store unreachable: {}", error);
                false
            }
        }
    }

    async fn run_cycle(&self, mode: Mode) -> Result<CycleOutcome> {
        let Ok(_cycle) = self.cycle.try_lock() else {
            tracing::warn!("Rejected sync request: a cycle is already running");
            return Ok(CycleOutcome::failed(&Error::CycleInProgress, self.state()));
        };
        self.cancel_tx.send_replace(false);

        let conn = self.store.connection();
        let identity = self.identity.get_or_create(conn).await?;
        let guard = ensure_sync_columns(conn, &self.specs()).await?;

        let mut reset = StateReset::new(&self.state_tx);
        self.set_state(CycleState::Connecting);
        let session = match self.connect().await {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!("Sync aborted: {}", error);
                reset.disarm();
                self.set_state(CycleState::Failed);
                return Ok(CycleOutcome::failed(&error, CycleState::Failed));
            }
        };
        tracing::info!(
            "Sync started as {} against {}",
            identity.device_id,
            self.central.describe()
        );

        let mut outcome = self
            .run_phases(&session, mode, &identity.device_id, &guard)
            .await;
        if let Err(error) = session.close().await {
            tracing::warn!("Failed to close central session: {}", error);
        }

        reset.disarm();
        outcome.state = CycleState::Idle;
        self.set_state(outcome.state);
        tracing::info!(
            "Sync finished: pulled {}, pushed {}, {} conflicts, {} errors",
            outcome.pull.total_pulled,
            outcome.push.total_pushed,
            outcome.pull.total_conflicts,
            outcome.pull.total_errors() + outcome.push.total_errors()
        );
        Ok(outcome)
    }

    async fn run_phases(
        &self,
        session: &C::Session,
        mode: Mode,
        device_id: &str,
        guard: &GuardReport,
    ) -> CycleOutcome {
        let mut outcome = CycleOutcome {
            pull: PullReport {
                success: true,
                ..PullReport::default()
            },
            push: PushReport {
                success: true,
                ..PushReport::default()
            },
            state: CycleState::Idle,
            error: None,
        };

        if mode != Mode::PushOnly {
            self.set_state(CycleState::Pulling);
            outcome.pull = self.pull_all(session, device_id, guard).await;
            if self.is_cancelled() {
                outcome.error = Some(Error::Cancelled.to_string());
                return outcome;
            }
        }

        if mode != Mode::PullOnly {
            self.set_state(CycleState::Pushing);
            outcome.push = self.push_all(session, device_id, guard).await;
            if self.is_cancelled() {
                outcome.error = Some(Error::Cancelled.to_string());
            }
        }

        outcome
    }

    async fn pull_all(
        &self,
        session: &C::Session,
        device_id: &str,
        guard: &GuardReport,
    ) -> PullReport {
        let mut report = PullReport {
            success: true,
            ..PullReport::default()
        };

        for table in self.config.ordered_tables() {
            if self.is_cancelled() {
                tracing::info!("Pull cancelled before {}", table);
                report.success = false;
                report.error = Some(Error::Cancelled.to_string());
                break;
            }

            let result = if let Some(error) = guard.table_error(table) {
                table_pull_error(&error)
            } else {
                match timeout(
                    self.config.table_timeout(),
                    self.pull_table(session, table, device_id),
                )
                .await
                {
                    Ok(Ok((result, conflicts))) => {
                        report.conflicts.extend(conflicts);
                        result
                    }
                    Ok(Err(error)) => table_pull_error(&error),
                    Err(_) => table_pull_error(&self.table_timeout_error("pull", table)),
                }
            };

            if let Some(error) = &result.error {
                tracing::warn!("Pull of {} failed: {}", table, error);
                report.success = false;
            }
            report.record(table, result);
        }

        report
    }

    async fn pull_table(
        &self,
        session: &C::Session,
        table: SyncTable,
        device_id: &str,
    ) -> Result<(TablePullResult, Vec<ConflictRecord>)> {
        let cursors = CursorStore::new(self.store.connection());
        let since = cursors.get(table).await?;
        let batch = session.fetch_changed(table, since, device_id).await?;

        let mut result = TablePullResult::default();
        let mut conflicts = Vec::new();
        for document in &batch.documents {
            match self.apply_incoming(table, document, device_id).await {
                Ok(Applied::Written) => result.pulled += 1,
                Ok(Applied::Skipped) => {}
                Ok(Applied::Conflict(conflict)) => {
                    result.conflicts += 1;
                    if conflict.disposition == ConflictDisposition::AcceptedRemote {
                        result.pulled += 1;
                    }
                    conflicts.push(conflict);
                }
                Err(error) if error.kind() == ErrorKind::Record => {
                    tracing::warn!(
                        "Skipping {} document {}: {}",
                        table,
                        document.global_id,
                        error
                    );
                    result.errors += 1;
                }
                // Leaves the cursor where it was so the batch is fetched again
                Err(error) => return Err(error),
            }
        }

        let cursor = cursors.advance(table, batch.watermark).await?;
        tracing::debug!(
            "Pulled {}: {} applied, {} conflicts, {} skipped, cursor {}",
            table,
            result.pulled,
            result.conflicts,
            result.errors,
            cursor
        );
        Ok((result, conflicts))
    }

    async fn apply_incoming(
        &self,
        table: SyncTable,
        document: &RemoteDocument,
        device_id: &str,
    ) -> Result<Applied> {
        let conn = self.store.connection();
        let mut incoming = document.to_incoming(table.spec())?;
        let placement = IdentityReconciler::new(conn)
            .match_incoming(table, &incoming)
            .await?;
        let local = placement.local();

        // Deletion of something this device never had
        if incoming.deleted && local.is_none() {
            return Ok(Applied::Skipped);
        }

        let conflict = match (resolve(local, &incoming, device_id), local) {
            (Resolution::KeepLocal, _) | (Resolution::Conflict, None) => {
                return Ok(Applied::Skipped)
            }
            (Resolution::AcceptRemote, _) => None,
            (Resolution::Conflict, Some(local)) => {
                let disposition = self.config.conflict_policy.settle(local, &incoming);
                let conflict = conflict_record(table, local, &incoming, disposition);
                tracing::info!(
                    "Conflict on {} {}: local {} vs remote {} from {}, {:?}",
                    table,
                    conflict.global_id,
                    conflict.local_updated_at,
                    conflict.remote_updated_at,
                    conflict.remote_origin,
                    conflict.disposition
                );
                if conflict.disposition == ConflictDisposition::KeptLocal {
                    return Ok(Applied::Conflict(conflict));
                }
                Some(conflict)
            }
        };

        if incoming.deleted {
            if let Some(local) = local {
                incoming.fields.clone_from(&local.fields);
            }
        }
        TableStore::new(conn, table.spec())
            .upsert_local(local.map(|record| &record.id), &incoming)
            .await?;

        Ok(conflict.map_or(Applied::Written, Applied::Conflict))
    }

    async fn push_all(
        &self,
        session: &C::Session,
        device_id: &str,
        guard: &GuardReport,
    ) -> PushReport {
        let mut report = PushReport {
            success: true,
            ..PushReport::default()
        };

        for table in self.config.ordered_tables() {
            if self.is_cancelled() {
                tracing::info!("Push cancelled before {}", table);
                report.success = false;
                report.error = Some(Error::Cancelled.to_string());
                break;
            }

            let result = if let Some(error) = guard.table_error(table) {
                table_push_error(&error)
            } else {
                match timeout(
                    self.config.table_timeout(),
                    self.push_table(session, table, device_id),
                )
                .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(error)) => table_push_error(&error),
                    Err(_) => table_push_error(&self.table_timeout_error("push", table)),
                }
            };

            if let Some(error) = &result.error {
                tracing::warn!("Push of {} failed: {}", table, error);
                report.success = false;
            }
            report.record(table, result);
        }

        report
    }

    async fn push_table(
        &self,
        session: &C::Session,
        table: SyncTable,
        device_id: &str,
    ) -> Result<TablePushResult> {
        let store = TableStore::new(self.store.connection(), table.spec());
        let pending = store.list_unsynced().await?;

        let mut result = TablePushResult::default();
        for record in &pending {
            match self.push_record(session, &store, table, record, device_id).await {
                Ok(true) => result.pushed += 1,
                Ok(false) => {}
                // The rest of the table would fail the same way
                Err(error) if is_session_error(&error) => return Err(error),
                Err(error) => {
                    tracing::warn!("Skipping {} row {}: {}", table, record.id, error);
                    result.errors += 1;
                }
            }
        }

        tracing::debug!(
            "Pushed {}: {} of {} rows, {} skipped",
            table,
            result.pushed,
            pending.len(),
            result.errors
        );
        Ok(result)
    }

    /// Returns whether a central document was written
    async fn push_record(
        &self,
        session: &C::Session,
        store: &TableStore<'_>,
        table: SyncTable,
        record: &Record,
        device_id: &str,
    ) -> Result<bool> {
        let origin = if record.origin_device.is_empty() {
            device_id
        } else {
            record.origin_device.as_str()
        };

        if record.deleted {
            let Some(global_id) = record.global_id else {
                // Never left this device
                store.mark_synced_at(&record.id, record.updated_at).await?;
                return Ok(false);
            };
            let found = session
                .tombstone(table, &global_id, origin, record.updated_at)
                .await?;
            store.mark_synced_at(&record.id, record.updated_at).await?;
            return Ok(found);
        }

        let global_id = IdentityReconciler::new(self.store.connection())
            .assign_outgoing(session, table, record)
            .await?;
        let mut document = RemoteDocument::from_record(record, &global_id);
        document.origin_device = origin.to_string();
        session.upsert(table, document).await?;
        store.mark_synced_at(&record.id, record.updated_at).await?;
        Ok(true)
    }

    fn table_timeout_error(&self, phase: &str, table: SyncTable) -> Error {
        Error::Timeout {
            operation: format!("{phase} {table}"),
            seconds: self.config.table_timeout_secs,
        }
    }
}

fn conflict_record(
    table: SyncTable,
    local: &Record,
    incoming: &IncomingRecord,
    disposition: ConflictDisposition,
) -> ConflictRecord {
    ConflictRecord {
        table,
        global_id: incoming.global_id,
        local_id: local.id.clone(),
        local_updated_at: local.updated_at,
        remote_updated_at: incoming.updated_at,
        remote_origin: incoming.origin_device.clone(),
        disposition,
    }
}

fn is_session_error(error: &Error) -> bool {
    error.kind() == ErrorKind::Connectivity || matches!(error, Error::Central(_))
}

fn table_pull_error(error: &Error) -> TablePullResult {
    TablePullResult {
        errors: 1,
        error: Some(error.to_string()),
        ..TablePullResult::default()
    }
}

fn table_push_error(error: &Error) -> TablePushResult {
    TablePushResult {
        errors: 1,
        error: Some(error.to_string()),
        ..TablePushResult::default()
    }
}
