//! Enqueue command implementation.

use super::open_store;
use offsync_protocol::{MutationAction, RecordKey, Timestamp, Version};
use std::path::Path;

/// Runs the enqueue command.
pub fn run(
    path: &Path,
    collection: &str,
    record: &str,
    action: &str,
    payload: &str,
    base_version: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let action: MutationAction = action.parse()?;

    let item = store.enqueue(
        action,
        RecordKey::new(collection, record),
        payload.as_bytes().to_vec(),
        Version(base_version),
        Timestamp::now(),
    )?;

    println!("Enqueued {} as {} ({})", item.key, item.id, item.sequence);
    Ok(())
}
