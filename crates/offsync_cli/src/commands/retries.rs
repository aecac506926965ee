//! Retries command implementation.

use super::{fmt_opt, open_store};
use std::path::Path;

/// Runs the retries command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let records = store.list_retries();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => {
            if records.is_empty() {
                println!("Retry ledger is empty.");
                return Ok(());
            }
            println!(
                "{:<42} {:<28} {:<10} {:>7} {:>11} {:<14} {}",
                "OPERATION", "RECORD", "STATUS", "COUNT", "BACKOFF MS", "NEXT RETRY", "LAST ERROR"
            );
            for record in &records {
                println!(
                    "{:<42} {:<28} {:<10} {:>3}/{:<3} {:>11} {:<14} {}",
                    record.operation_id,
                    record.key,
                    record.status,
                    record.retry_count,
                    record.max_retries,
                    record.backoff_ms,
                    record.next_retry_at,
                    fmt_opt(&record.last_error),
                );
            }
        }
    }
    Ok(())
}
