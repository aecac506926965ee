//! Resolve command implementation.

use super::open_store;
use offsync_protocol::{ConflictId, ResolutionStrategy, Timestamp};
use std::path::Path;

/// Runs the resolve command.
pub fn run(
    path: &Path,
    id: &str,
    strategy: &str,
    resolved_by: &str,
    merged: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let id: ConflictId = id.parse()?;
    let strategy: ResolutionStrategy = strategy.parse()?;
    let merged_payload = merged.map(String::into_bytes);

    let conflict = store.resolve_conflict(id, strategy, resolved_by, merged_payload, Timestamp::now())?;
    println!(
        "Resolved {} on {} with {} (operation {})",
        conflict.id, conflict.key, strategy, conflict.operation_id
    );
    Ok(())
}
