//! CLI command implementations.

pub mod conflicts;
pub mod connections;
pub mod enqueue;
pub mod operations;
pub mod pending;
pub mod resolve;
pub mod retries;
pub mod rules;
pub mod status;

use offsync_core::{SyncStore, SyncStoreConfig};
use offsync_protocol::Timestamp;
use std::path::Path;

/// Opens the store at `path` with default tunables.
pub fn open_store(path: &Path) -> Result<SyncStore, Box<dyn std::error::Error>> {
    Ok(SyncStore::open(path, SyncStoreConfig::default())?)
}

/// Renders an optional timestamp for text output.
pub fn fmt_ts(ts: Option<Timestamp>) -> String {
    match ts {
        Some(ts) => ts.to_string(),
        None => "-".to_string(),
    }
}

/// Renders an optional string for text output.
pub fn fmt_opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_protocol::SyncStatus;

    #[test]
    fn enqueue_persists_to_the_store_directory() {
        let dir = tempfile::tempdir().unwrap();

        enqueue::run(dir.path(), "daily_logs", "log-1", "update", "{}", 3).unwrap();

        let store = open_store(dir.path()).unwrap();
        let items = store.list_operations();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key.collection, "daily_logs");
        assert_eq!(items[0].status, SyncStatus::Pending);
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(fmt_ts(None), "-");
        assert_eq!(fmt_ts(Some(Timestamp(5))), "5ms");
        assert_eq!(fmt_opt(&None), "-");
        assert_eq!(fmt_opt(&Some("boom".into())), "boom");
    }
}
