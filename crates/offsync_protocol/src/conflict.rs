//! Conflict rows and resolution strategies.

use crate::error::ProtocolError;
use crate::mutation::RecordKey;
use crate::priority::PriorityClass;
use crate::types::{ConflictId, OperationId, Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Detected divergence between a queued mutation's base version and the
/// current remote version of the same record.
///
/// A record accumulates at most one open conflict at a time; later
/// operations on the record queue behind it. Resolution history is
/// append-only, conflicts are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Conflict id.
    pub id: ConflictId,
    /// Record the conflict is on.
    pub key: RecordKey,
    /// The queued operation that hit the mismatch.
    pub operation_id: OperationId,
    /// Base version the mutation was made against.
    pub base_version: Version,
    /// Remote version observed at detection; used to refresh the base
    /// when resolving with `local_wins` or `manual`.
    pub remote_version: Version,
    /// When the conflict was detected.
    pub detected_at: Timestamp,
    /// Priority inherited from the collection's rule.
    pub priority: PriorityClass,
    /// Strategy used to resolve, once resolved.
    pub resolution: Option<ResolutionStrategy>,
    /// When the conflict was resolved.
    pub resolved_at: Option<Timestamp>,
    /// Who resolved it.
    pub resolved_by: Option<String>,
}

impl Conflict {
    /// Creates a new open conflict.
    #[must_use]
    pub fn new(
        key: RecordKey,
        operation_id: OperationId,
        base_version: Version,
        remote_version: Version,
        priority: PriorityClass,
        detected_at: Timestamp,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            key,
            operation_id,
            base_version,
            remote_version,
            detected_at,
            priority,
            resolution: None,
            resolved_at: None,
            resolved_by: None,
        }
    }

    /// Returns true once a resolution has been recorded.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// How to resolve a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Re-attempt the local mutation against the refreshed remote version.
    LocalWins,
    /// Discard the local mutation and accept server state.
    RemoteWins,
    /// Apply a caller-supplied merged payload.
    Manual,
}

impl ResolutionStrategy {
    /// Returns the lowercase name used in the CLI and listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_wins" | "local-wins" => Ok(Self::LocalWins),
            "remote_wins" | "remote-wins" => Ok(Self::RemoteWins),
            "manual" => Ok(Self::Manual),
            _ => Err(ProtocolError::UnknownVariant {
                kind: "strategy",
                value: s.to_string(),
            }),
        }
    }
}

/// Filter for conflict listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictFilter {
    /// Only conflicts awaiting resolution.
    #[default]
    Unresolved,
    /// Only resolved conflicts.
    Resolved,
    /// Everything.
    All,
}

impl ConflictFilter {
    /// Returns true if a conflict passes this filter.
    #[must_use]
    pub fn matches(self, conflict: &Conflict) -> bool {
        match self {
            Self::Unresolved => !conflict.is_resolved(),
            Self::Resolved => conflict.is_resolved(),
            Self::All => true,
        }
    }
}
