use crate::commands::common::{
    format_status_lines, open_coordinator, print_json, print_lines, CliContext,
};
use crate::error::CliError;

pub async fn run_status(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let coordinator = open_coordinator(context).await?;
    let status = coordinator.get_status().await?;

    if as_json {
        print_json(&status)
    } else {
        print_lines(&format_status_lines(&status));
        Ok(())
    }
}
