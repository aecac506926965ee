//! Conflicts command implementation.

use super::open_store;
use offsync_protocol::ConflictFilter;
use std::path::Path;

/// Runs the conflicts command.
pub fn run(
    path: &Path,
    all: bool,
    resolved: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let filter = if all {
        ConflictFilter::All
    } else if resolved {
        ConflictFilter::Resolved
    } else {
        ConflictFilter::Unresolved
    };
    let conflicts = store.list_conflicts(filter);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&conflicts)?),
        _ => {
            if conflicts.is_empty() {
                println!("No conflicts.");
                return Ok(());
            }
            println!(
                "{:<48} {:<28} {:<10} {:<14} {:<12} {}",
                "ID", "RECORD", "PRIORITY", "DETECTED", "RESOLUTION", "RESOLVED BY"
            );
            for conflict in &conflicts {
                println!(
                    "{:<48} {:<28} {:<10} {:<14} {:<12} {}",
                    conflict.id,
                    conflict.key,
                    conflict.priority,
                    conflict.detected_at,
                    conflict
                        .resolution
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "open".to_string()),
                    conflict.resolved_by.as_deref().unwrap_or("-"),
                );
            }
        }
    }
    Ok(())
}
