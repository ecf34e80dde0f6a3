//! Log store backends
//!
//! The queue talks to an ordered log with consumer-group delivery tracking
//! through the `LogStore` trait. Two backends ship with the crate:
//!
//! - `MemoryLogStore`: in-process store with the same group/PEL semantics,
//!   shared between clients by cloning the handle
//! - `RedisLogStore`: Redis Streams (`XADD`, `XREADGROUP`, `XPENDING`, ...)
//!
//! ```text
//! append ──► [ log ] ──readGroup(">")──► PEL(group) ──ack──► gone from PEL
//!                │                          │
//!                └──────── delete ──────────┴── claim: owner changes, id stays
//! ```

mod memory;
mod redis_store;

use std::time::Duration;

use crate::error::QueueResult;
use crate::types::{EntryId, Fields, PendingRecord, PendingSummary, ReadCursor};

pub use self::memory::MemoryLogStore;
pub use self::redis_store::{RedisLeases, RedisLogStore};

/// Item returned by a group read. `None` fields mean the entry is still
/// pending but its payload is gone from the log.
pub type GroupReadItem = (EntryId, Option<Fields>);

/// Outcome of a combined acknowledge + delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Removal {
    /// Ids removed from the group's PEL
    pub acknowledged: u64,
    /// Ids removed from the log
    pub deleted: u64,
}

/// Primitives the queue needs from the underlying log
pub trait LogStore: Send + Sync {
    /// Append an entry; the returned id is greater than every existing one.
    /// With `max_len`, the oldest entries beyond that length are trimmed.
    fn append(&self, stream: &str, fields: &Fields, max_len: Option<u64>) -> QueueResult<EntryId>;

    /// Create a consumer group. No-op if the group already exists.
    fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: EntryId,
        create_stream: bool,
    ) -> QueueResult<()>;

    /// Read through a group as `consumer`. `ReadCursor::New` may wait up to
    /// `block`; history reads never wait.
    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        count: usize,
        block: Option<Duration>,
    ) -> QueueResult<Vec<GroupReadItem>>;

    /// Remove ids from the group's PEL, returning how many were pending
    fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> QueueResult<u64>;

    /// Remove ids from the log for every group
    fn delete(&self, stream: &str, ids: &[EntryId]) -> QueueResult<u64>;

    /// `ack` followed by `delete`. Backends override this to make the pair
    /// atomic.
    fn ack_and_delete(&self, stream: &str, group: &str, ids: &[EntryId]) -> QueueResult<Removal> {
        let acknowledged = self.ack(stream, group, ids)?;
        let deleted = self.delete(stream, ids)?;
        Ok(Removal {
            acknowledged,
            deleted,
        })
    }

    fn pending_summary(&self, stream: &str, group: &str) -> QueueResult<PendingSummary>;

    /// Pending records with ids in the closed interval `[start, end]`
    fn pending_range(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        start: EntryId,
        end: EntryId,
        consumer: Option<&str>,
    ) -> QueueResult<Vec<PendingRecord>>;

    /// Entries with ids in the closed interval `[start, end]`
    fn range(
        &self,
        stream: &str,
        start: EntryId,
        end: EntryId,
        count: Option<usize>,
    ) -> QueueResult<Vec<(EntryId, Fields)>>;

    /// Hand ownership of pending ids idle for at least `min_idle` to
    /// `new_consumer`. Payload and id are untouched; returns the ids that
    /// moved.
    fn claim(
        &self,
        stream: &str,
        group: &str,
        new_consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
        just_id: bool,
    ) -> QueueResult<Vec<EntryId>>;

    fn delete_stream(&self, stream: &str) -> QueueResult<()>;
}
