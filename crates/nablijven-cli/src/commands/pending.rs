use nablijven_core::models::PendingOperation;

use crate::commands::common::{format_pending_lines, print_json, AppContext};
use crate::error::CliError;

pub async fn run_pending(
    context: &AppContext,
    as_json: bool,
) -> Result<Vec<PendingOperation>, CliError> {
    let operations = context.records.pending_operations().await?;

    if as_json {
        print_json(&operations)?;
    } else if operations.is_empty() {
        println!("No pending operations.");
    } else {
        for line in format_pending_lines(&operations) {
            println!("{line}");
        }
    }
    Ok(operations)
}
