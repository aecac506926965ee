//! Collection priority classes and rules.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Collection-level urgency class used to order queue draining.
///
/// Variants are declared lowest-first so the derived `Ord` matches urgency:
/// `Critical > High > Normal > Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// Drained last.
    Low,
    /// Default for unknown collections.
    Normal,
    /// Drained before normal traffic.
    High,
    /// Drained first (safety or financial postings).
    Critical,
}

impl PriorityClass {
    /// Returns the lowercase name used in config and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityClass {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(ProtocolError::UnknownVariant {
                kind: "priority",
                value: s.to_string(),
            }),
        }
    }
}

/// Static ordering rule for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRule {
    /// Collection the rule applies to.
    pub collection: String,
    /// Priority class.
    pub priority: PriorityClass,
    /// Explicit tie-break index among collections of the same class
    /// (lower drains first).
    pub order: u32,
    /// Human-readable description for operator displays.
    pub description: String,
}

impl PriorityRule {
    /// Creates a rule.
    pub fn new(
        collection: impl Into<String>,
        priority: PriorityClass,
        order: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            priority,
            order,
            description: description.into(),
        }
    }
}
