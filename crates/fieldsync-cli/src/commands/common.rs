use std::future::Future;
use std::path::PathBuf;

use fieldsync_core::models::{AdminReport, DeviceInfo, TablePullResult, TablePushResult};
use fieldsync_core::util::millis_to_rfc3339;
use fieldsync_core::{
    CentralStore, LocalStore, PullReport, PushReport, SyncConfig, SyncCoordinator, SyncReport,
    SyncStatus,
};
use serde::Serialize;

use crate::central::CliCentral;
use crate::error::CliError;

/// Resolved inputs shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub config: SyncConfig,
}

pub async fn open_coordinator(
    context: &CliContext,
) -> Result<SyncCoordinator<CliCentral>, CliError> {
    let central = CliCentral::from_config(&context.config)?;
    let store = LocalStore::open(&context.db_path).await?;
    tracing::debug!(
        "Opened local store {} (central: {})",
        context.db_path.display(),
        central.describe()
    );
    Ok(SyncCoordinator::new(store, central, context.config.clone())?)
}

/// Like [`open_coordinator`], but refuses to run without a central store
pub async fn open_sync_coordinator(
    context: &CliContext,
) -> Result<SyncCoordinator<CliCentral>, CliError> {
    if context.config.central_url().is_none() {
        return Err(CliError::SyncNotConfigured);
    }
    open_coordinator(context).await
}

/// Run `operation`, cancelling the cycle before its next table on Ctrl-C
pub async fn with_interrupt<C, F, T>(coordinator: &SyncCoordinator<C>, operation: F) -> T
where
    C: CentralStore,
    F: Future<Output = T>,
{
    let cancel = coordinator.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping after the current table");
            cancel.cancel();
        }
    });
    let output = operation.await;
    watcher.abort();
    output
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_timestamp(millis: Option<i64>) -> String {
    millis.map_or_else(|| "never".to_string(), millis_to_rfc3339)
}

fn with_error(line: String, error: Option<&String>) -> String {
    match error {
        Some(error) => format!("{line} ({error})"),
        None => line,
    }
}

fn format_pull_table(result: &TablePullResult) -> String {
    with_error(
        format!(
            "pulled {}, conflicts {}, errors {}",
            result.pulled, result.conflicts, result.errors
        ),
        result.error.as_ref(),
    )
}

fn format_push_table(result: &TablePushResult) -> String {
    with_error(
        format!("pushed {}, errors {}", result.pushed, result.errors),
        result.error.as_ref(),
    )
}

pub fn format_pull_lines(report: &PullReport) -> Vec<String> {
    let mut lines = report
        .per_table
        .iter()
        .map(|(table, result)| format!("  {table}: {}", format_pull_table(result)))
        .collect::<Vec<_>>();
    lines.push(with_error(
        format!(
            "  total: pulled {}, conflicts {}",
            report.total_pulled, report.total_conflicts
        ),
        report.error.as_ref(),
    ));
    lines
}

pub fn format_push_lines(report: &PushReport) -> Vec<String> {
    let mut lines = report
        .per_table
        .iter()
        .map(|(table, result)| format!("  {table}: {}", format_push_table(result)))
        .collect::<Vec<_>>();
    lines.push(with_error(
        format!("  total: pushed {}", report.total_pushed),
        report.error.as_ref(),
    ));
    lines
}

pub fn format_sync_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec!["Pull:".to_string()];
    lines.extend(format_pull_lines(&report.pull));
    lines.push("Push:".to_string());
    lines.extend(format_push_lines(&report.push));
    lines.push(with_error(
        format!("State: {}", report.state),
        report.error.as_ref(),
    ));
    lines
}

pub fn format_status_lines(status: &SyncStatus) -> Vec<String> {
    let mut device = format!("Device: {}", status.device_id);
    if !status.identity_durable {
        device.push_str(" (not persisted)");
    }
    let mut lines = vec![
        device,
        format!(
            "Central: {}",
            if status.connected {
                "reachable"
            } else {
                "unreachable"
            }
        ),
        format!("State: {}", status.state),
    ];
    lines.extend(status.per_table.iter().map(|(table, table_status)| {
        format!(
            "  {table}: {} rows, {} unsynced, last sync {}",
            table_status.local_count,
            table_status.unsynced_count,
            format_timestamp(table_status.last_sync_time)
        )
    }));
    lines
}

pub fn format_device_lines(info: &DeviceInfo) -> Vec<String> {
    let mut device = format!("Device ID: {}", info.device_id);
    if !info.identity_durable {
        device.push_str(" (not persisted)");
    }
    vec![
        device,
        format!("Hostname: {}", info.hostname),
        format!("Platform: {}", info.platform),
        format!(
            "Tables: {}",
            info.sync_tables
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    ]
}

pub fn format_admin_lines(summary: &str, report: &AdminReport) -> Vec<String> {
    let mut lines = vec![format!("{summary}: {} rows", report.rows_updated)];
    lines.extend(
        report
            .per_table
            .iter()
            .map(|(table, count)| format!("  {table}: {count}")),
    );
    if report.cursors_cleared > 0 {
        lines.push(format!("Cleared {} pull cursors", report.cursors_cleared));
    }
    lines
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
