//! Conflict store: detections and append-only resolutions.

use crate::journal::JournalRecord;
use offsync_protocol::{Conflict, ConflictFilter, ConflictId, RecordKey};
use std::collections::HashMap;
use tracing::debug;

/// In-memory projection of detected conflicts.
///
/// Conflicts are never deleted; resolving one sets its resolution fields.
/// At most one conflict per record is open at a time; a second
/// conflicting operation on the same record queues behind the open one
/// instead of creating another row.
#[derive(Debug, Default)]
pub struct ConflictStore {
    conflicts: HashMap<ConflictId, Conflict>,
    open_by_key: HashMap<RecordKey, ConflictId>,
}

impl ConflictStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up one conflict.
    #[must_use]
    pub fn get(&self, id: ConflictId) -> Option<&Conflict> {
        self.conflicts.get(&id)
    }

    /// The open conflict on `key`, if any.
    #[must_use]
    pub fn open_for(&self, key: &RecordKey) -> Option<&Conflict> {
        self.open_by_key
            .get(key)
            .and_then(|id| self.conflicts.get(id))
    }

    /// Returns conflicts passing `filter`, newest detection first.
    #[must_use]
    pub fn list(&self, filter: ConflictFilter) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = self
            .conflicts
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        conflicts.sort_by_key(|c| std::cmp::Reverse((c.detected_at, c.id)));
        conflicts
    }

    /// Returns true if `collection` has any unresolved conflict.
    #[must_use]
    pub fn has_open(&self, collection: &str) -> bool {
        self.open_by_key.keys().any(|key| key.collection == collection)
    }

    /// Applies one journal record to this projection.
    pub fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::ConflictDetected { conflict } => {
                // Replay tolerance: never let a duplicate detection
                // shadow an existing open conflict.
                if self.open_by_key.contains_key(&conflict.key) {
                    debug!(key = %conflict.key, "duplicate conflict detection ignored");
                    return;
                }
                self.open_by_key.insert(conflict.key.clone(), conflict.id);
                self.conflicts.insert(conflict.id, conflict.clone());
            }
            JournalRecord::ConflictResolved {
                id,
                strategy,
                resolved_by,
                at,
            } => {
                let Some(conflict) = self.conflicts.get_mut(id) else {
                    debug!(%id, "resolution for unknown conflict ignored");
                    return;
                };
                if conflict.is_resolved() {
                    return;
                }
                conflict.resolution = Some(*strategy);
                conflict.resolved_at = Some(*at);
                conflict.resolved_by = Some(resolved_by.clone());
                self.open_by_key.remove(&conflict.key);
            }
            _ => {}
        }
    }
}
