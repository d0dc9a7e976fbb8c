use crate::commands::common::{
    format_device_lines, open_coordinator, print_json, print_lines, CliContext,
};
use crate::error::CliError;

pub async fn run_device(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let coordinator = open_coordinator(context).await?;
    let info = coordinator.get_device_info().await?;

    if as_json {
        print_json(&info)
    } else {
        print_lines(&format_device_lines(&info));
        Ok(())
    }
}
