//! Status command implementation.

use super::{fmt_opt, fmt_ts, open_store};
use std::path::Path;

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let indicators = store.status_indicators();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&indicators)?),
        _ => {
            if indicators.is_empty() {
                println!("No sync activity recorded.");
                return Ok(());
            }
            println!(
                "{:<20} {:<10} {:>8} {:<14} {}",
                "COLLECTION", "STATUS", "PENDING", "LAST SYNC", "ERROR"
            );
            for indicator in &indicators {
                println!(
                    "{:<20} {:<10} {:>8} {:<14} {}",
                    indicator.component,
                    indicator.status,
                    indicator.pending_changes,
                    fmt_ts(indicator.last_sync_at),
                    fmt_opt(&indicator.error_message),
                );
            }
        }
    }
    Ok(())
}
