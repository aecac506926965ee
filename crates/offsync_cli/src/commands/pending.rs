//! Pending command implementation.

use super::{fmt_opt, open_store};
use offsync_core::QueueFilter;
use offsync_protocol::SyncStatus;
use std::path::Path;

/// Runs the pending command.
pub fn run(
    path: &Path,
    collection: Option<String>,
    status: Option<String>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let filter = QueueFilter {
        collection,
        status: status.as_deref().map(str::parse::<SyncStatus>).transpose()?,
    };
    let items = store.list_pending(&filter);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&items)?),
        _ => {
            if items.is_empty() {
                println!("Queue is empty.");
                return Ok(());
            }
            println!(
                "{:<42} {:<10} {:<8} {:<28} {:<10} {:>7} {}",
                "ID", "SEQ", "ACTION", "RECORD", "STATUS", "RETRIES", "LAST ERROR"
            );
            for item in &items {
                println!(
                    "{:<42} {:<10} {:<8} {:<28} {:<10} {:>7} {}",
                    item.id,
                    item.sequence,
                    item.action,
                    item.key,
                    item.status,
                    item.retry_count,
                    fmt_opt(&item.last_error),
                );
            }
        }
    }
    Ok(())
}
