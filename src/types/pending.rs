//! Pending Entry List views

use serde::{Deserialize, Serialize};

use super::EntryId;

/// One delivered-but-unacknowledged entry in a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecord {
    pub entry_id: EntryId,
    /// Consumer currently owning the entry
    pub consumer: String,
    /// Milliseconds since the entry was last delivered or claimed
    pub idle_ms: u64,
    pub delivery_count: u64,
}

/// Pending count for a single consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerPending {
    pub consumer: String,
    pub count: u64,
}

/// Aggregate view of a group's PEL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    /// Total pending entries across all consumers
    pub count: u64,
    /// Lowest pending id, `None` when nothing is pending
    pub min_id: Option<EntryId>,
    /// Highest pending id, `None` when nothing is pending
    pub max_id: Option<EntryId>,
    pub consumers: Vec<ConsumerPending>,
}

impl PendingSummary {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Pending count owned by `consumer` (0 if it owns nothing)
    pub fn count_for(&self, consumer: &str) -> u64 {
        self.consumers
            .iter()
            .find(|c| c.consumer == consumer)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}
