//! Manual operation interventions: retry-now, abandon, resubmit.

use super::open_store;
use offsync_protocol::{OperationId, Timestamp};
use std::path::Path;

/// Cancels an operation's backoff wait.
pub fn retry_now(path: &Path, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let id: OperationId = id.parse()?;
    let record = store.force_retry(id, Timestamp::now())?;
    println!(
        "Retry scheduled for {} (attempt {}/{})",
        record.operation_id,
        record.retry_count + 1,
        record.max_retries
    );
    Ok(())
}

/// Drops an exhausted operation for good.
pub fn abandon(path: &Path, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let id: OperationId = id.parse()?;
    store.abandon_operation(id, Timestamp::now())?;
    println!("Abandoned {id}");
    Ok(())
}

/// Resets an exhausted operation's retry budget.
pub fn resubmit(path: &Path, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let id: OperationId = id.parse()?;
    let item = store.resubmit_operation(id, Timestamp::now())?;
    println!("Resubmitted {} on {} ({})", item.id, item.key, item.status);
    Ok(())
}
