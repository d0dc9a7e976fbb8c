use crate::commands::common::{
    format_pull_lines, format_push_lines, format_sync_report_lines, open_sync_coordinator,
    print_json, print_lines, with_interrupt, CliContext,
};
use crate::error::CliError;

fn failure(error: Option<&String>) -> CliError {
    CliError::SyncFailed(
        error
            .cloned()
            .unwrap_or_else(|| "one or more tables failed".to_string()),
    )
}

pub async fn run_sync(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let coordinator = open_sync_coordinator(context).await?;
    let report = with_interrupt(&coordinator, coordinator.run_full_sync()).await?;

    if as_json {
        print_json(&report)?;
    } else {
        print_lines(&format_sync_report_lines(&report));
    }

    if report.success {
        Ok(())
    } else {
        Err(failure(report.error.as_ref()))
    }
}

pub async fn run_pull(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let coordinator = open_sync_coordinator(context).await?;
    let report = with_interrupt(&coordinator, coordinator.run_pull_only()).await?;

    if as_json {
        print_json(&report)?;
    } else {
        println!("Pull:");
        print_lines(&format_pull_lines(&report));
    }

    if report.success {
        Ok(())
    } else {
        Err(failure(report.error.as_ref()))
    }
}

pub async fn run_push(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let coordinator = open_sync_coordinator(context).await?;
    let report = with_interrupt(&coordinator, coordinator.run_push_only()).await?;

    if as_json {
        print_json(&report)?;
    } else {
        println!("Push:");
        print_lines(&format_push_lines(&report));
    }

    if report.success {
        Ok(())
    } else {
        Err(failure(report.error.as_ref()))
    }
}
