//! In-process log store
//!
//! Keeps streams, groups and PELs in memory behind a single mutex. Clones
//! share the same state, so several `QueueClient`s built on clones behave
//! like separate processes talking to one server.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{QueueError, QueueResult};
use crate::types::{ConsumerPending, EntryId, Fields, PendingRecord, PendingSummary, ReadCursor};
use crate::utils::{millis, now_millis};

use super::{GroupReadItem, LogStore, Removal};

/// Delivery state of one pending entry
#[derive(Debug, Clone)]
struct PendingState {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

impl PendingState {
    fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.delivered_at)
    }

    fn redeliver(&mut self, now: Instant) {
        self.delivered_at = now;
        self.delivery_count += 1;
    }
}

#[derive(Debug, Default)]
struct GroupState {
    /// Highest id ever delivered through `>`
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingState>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: BTreeMap<EntryId, Fields>,
    /// Last id handed out, kept even after the entry is deleted
    last_id: EntryId,
    groups: HashMap<String, GroupState>,
}

impl StreamState {
    fn deliver_new(
        &mut self,
        group: &str,
        consumer: &str,
        count: usize,
        now: Instant,
    ) -> Option<Vec<GroupReadItem>> {
        let group_state = self.groups.get_mut(group)?;

        let batch: Vec<(EntryId, Fields)> = self
            .entries
            .range(group_state.last_delivered..)
            .filter(|(id, _)| **id > group_state.last_delivered)
            .take(count)
            .map(|(id, fields)| (*id, fields.clone()))
            .collect();

        for (id, _) in &batch {
            group_state.pending.insert(
                *id,
                PendingState {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
            group_state.last_delivered = *id;
        }

        Some(batch.into_iter().map(|(id, f)| (id, Some(f))).collect())
    }

    fn read_history(
        &mut self,
        group: &str,
        consumer: &str,
        after: EntryId,
        count: usize,
        now: Instant,
    ) -> Option<Vec<GroupReadItem>> {
        let group_state = self.groups.get_mut(group)?;
        let entries = &self.entries;

        let items = group_state
            .pending
            .range_mut(after..)
            .filter(|(id, state)| **id > after && state.consumer == consumer)
            .take(count)
            .map(|(id, state)| {
                state.redeliver(now);
                (*id, entries.get(id).cloned())
            })
            .collect();

        Some(items)
    }
}

#[derive(Debug, Default)]
struct Shared {
    streams: Mutex<HashMap<String, StreamState>>,
    /// Signalled on every append and stream deletion
    appended: Condvar,
}

/// How long a `>` read may wait
#[derive(Clone, Copy)]
enum Wait {
    No,
    Until(Instant),
    Forever,
}

/// Cloneable handle to an in-process log
#[derive(Debug, Clone, Default)]
pub struct MemoryLogStore {
    shared: Arc<Shared>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently in the stream's log
    pub fn stream_len(&self, stream: &str) -> usize {
        self.shared
            .streams
            .lock()
            .get(stream)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    fn no_group(stream: &str, group: &str) -> QueueError {
        QueueError::NoGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        }
    }
}

impl LogStore for MemoryLogStore {
    fn append(&self, stream: &str, fields: &Fields, max_len: Option<u64>) -> QueueResult<EntryId> {
        let mut streams = self.shared.streams.lock();
        let state = streams.entry(stream.to_string()).or_default();

        let id = state.last_id.successor_at(now_millis());
        state.last_id = id;
        state.entries.insert(id, fields.clone());

        if let Some(max_len) = max_len {
            while state.entries.len() as u64 > max_len {
                state.entries.pop_first();
            }
        }

        drop(streams);
        self.shared.appended.notify_all();
        Ok(id)
    }

    fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: EntryId,
        create_stream: bool,
    ) -> QueueResult<()> {
        let mut streams = self.shared.streams.lock();
        if !streams.contains_key(stream) && !create_stream {
            return Err(QueueError::NoStream(stream.to_string()));
        }

        let state = streams.entry(stream.to_string()).or_default();
        state
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                last_delivered: start,
                pending: BTreeMap::new(),
            });
        Ok(())
    }

    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        count: usize,
        block: Option<Duration>,
    ) -> QueueResult<Vec<GroupReadItem>> {
        let count = count.max(1);
        let mut streams = self.shared.streams.lock();

        if let ReadCursor::After(after) = cursor {
            return streams
                .get_mut(stream)
                .and_then(|s| s.read_history(group, consumer, after, count, Instant::now()))
                .ok_or_else(|| Self::no_group(stream, group));
        }

        let wait = match block {
            None => Wait::No,
            Some(d) if d.is_zero() => Wait::Forever,
            Some(d) => Instant::now()
                .checked_add(d)
                .map_or(Wait::Forever, Wait::Until),
        };

        loop {
            let items = streams
                .get_mut(stream)
                .and_then(|s| s.deliver_new(group, consumer, count, Instant::now()))
                .ok_or_else(|| Self::no_group(stream, group))?;

            if !items.is_empty() {
                return Ok(items);
            }

            match wait {
                Wait::No => return Ok(items),
                Wait::Forever => self.shared.appended.wait(&mut streams),
                Wait::Until(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(items);
                    }
                    self.shared.appended.wait_until(&mut streams, deadline);
                }
            }
        }
    }

    fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> QueueResult<u64> {
        let mut streams = self.shared.streams.lock();
        let acked = streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .map(|g| ids.iter().filter(|id| g.pending.remove(*id).is_some()).count())
            .unwrap_or(0);
        Ok(acked as u64)
    }

    fn delete(&self, stream: &str, ids: &[EntryId]) -> QueueResult<u64> {
        let mut streams = self.shared.streams.lock();
        let deleted = streams
            .get_mut(stream)
            .map(|s| ids.iter().filter(|id| s.entries.remove(*id).is_some()).count())
            .unwrap_or(0);
        Ok(deleted as u64)
    }

    fn ack_and_delete(&self, stream: &str, group: &str, ids: &[EntryId]) -> QueueResult<Removal> {
        let mut streams = self.shared.streams.lock();
        let Some(state) = streams.get_mut(stream) else {
            return Ok(Removal::default());
        };

        let acknowledged = state
            .groups
            .get_mut(group)
            .map(|g| ids.iter().filter(|id| g.pending.remove(*id).is_some()).count())
            .unwrap_or(0);
        let deleted = ids
            .iter()
            .filter(|id| state.entries.remove(*id).is_some())
            .count();

        Ok(Removal {
            acknowledged: acknowledged as u64,
            deleted: deleted as u64,
        })
    }

    fn pending_summary(&self, stream: &str, group: &str) -> QueueResult<PendingSummary> {
        let streams = self.shared.streams.lock();
        let group_state = streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .ok_or_else(|| Self::no_group(stream, group))?;

        let mut per_consumer: BTreeMap<&str, u64> = BTreeMap::new();
        for state in group_state.pending.values() {
            *per_consumer.entry(state.consumer.as_str()).or_insert(0) += 1;
        }

        Ok(PendingSummary {
            count: group_state.pending.len() as u64,
            min_id: group_state.pending.keys().next().copied(),
            max_id: group_state.pending.keys().next_back().copied(),
            consumers: per_consumer
                .into_iter()
                .map(|(consumer, count)| ConsumerPending {
                    consumer: consumer.to_string(),
                    count,
                })
                .collect(),
        })
    }

    fn pending_range(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        start: EntryId,
        end: EntryId,
        consumer: Option<&str>,
    ) -> QueueResult<Vec<PendingRecord>> {
        let streams = self.shared.streams.lock();
        let group_state = streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .ok_or_else(|| Self::no_group(stream, group))?;

        if start > end {
            return Ok(Vec::new());
        }

        let now = Instant::now();
        Ok(group_state
            .pending
            .range(start..=end)
            .filter(|(_, state)| consumer.map_or(true, |c| state.consumer == c))
            .take(count)
            .map(|(id, state)| PendingRecord {
                entry_id: *id,
                consumer: state.consumer.clone(),
                idle_ms: millis(state.idle(now)),
                delivery_count: state.delivery_count,
            })
            .collect())
    }

    fn range(
        &self,
        stream: &str,
        start: EntryId,
        end: EntryId,
        count: Option<usize>,
    ) -> QueueResult<Vec<(EntryId, Fields)>> {
        let streams = self.shared.streams.lock();
        let Some(state) = streams.get(stream) else {
            return Ok(Vec::new());
        };
        if start > end {
            return Ok(Vec::new());
        }

        Ok(state
            .entries
            .range(start..=end)
            .take(count.unwrap_or(usize::MAX))
            .map(|(id, fields)| (*id, fields.clone()))
            .collect())
    }

    fn claim(
        &self,
        stream: &str,
        group: &str,
        new_consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
        _just_id: bool,
    ) -> QueueResult<Vec<EntryId>> {
        let mut streams = self.shared.streams.lock();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| Self::no_group(stream, group))?;
        let group_state = state
            .groups
            .get_mut(group)
            .ok_or_else(|| Self::no_group(stream, group))?;

        let now = Instant::now();
        let mut claimed = Vec::new();
        for id in ids {
            let Some(pending) = group_state.pending.get_mut(id) else {
                continue;
            };
            if pending.idle(now) < min_idle {
                continue;
            }
            // Pending ids whose payload is gone are dropped, not handed over
            if !state.entries.contains_key(id) {
                group_state.pending.remove(id);
                continue;
            }
            pending.consumer = new_consumer.to_string();
            pending.redeliver(now);
            claimed.push(*id);
        }

        Ok(claimed)
    }

    fn delete_stream(&self, stream: &str) -> QueueResult<()> {
        self.shared.streams.lock().remove(stream);
        self.shared.appended.notify_all();
        Ok(())
    }
}
