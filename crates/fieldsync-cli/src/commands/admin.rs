use crate::commands::common::{
    format_admin_lines, open_coordinator, print_json, print_lines, CliContext,
};
use crate::error::CliError;

pub async fn run_mark_synced(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let coordinator = open_coordinator(context).await?;
    let report = coordinator.force_mark_all_synced().await?;
    tracing::warn!(
        "Marked {} rows synced without pushing them",
        report.rows_updated
    );

    if as_json {
        print_json(&report)
    } else {
        print_lines(&format_admin_lines("Marked synced", &report));
        Ok(())
    }
}

pub async fn run_reset(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let coordinator = open_coordinator(context).await?;
    let report = coordinator.reset_sync_state().await?;

    if as_json {
        print_json(&report)
    } else {
        print_lines(&format_admin_lines("Marked unsynced", &report));
        Ok(())
    }
}
