//! Queue client
//!
//! A `QueueClient` is one consumer identity on one consumer group of one
//! stream. It enqueues, dequeues through the group and finishes tasks with
//! acknowledge + delete. Recovery of stuck tasks lives in `crate::pending`.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{QueueConfig, QueueOptions};
use crate::error::QueueResult;
use crate::pending::{ClaimOutcome, ClaimStrategy, PendingScanner, RestoreReport, RestoreStrategy};
use crate::store::{LogStore, RedisLogStore, Removal};
use crate::types::{Entry, EntryId, Fields, ReadCursor};

/// Client for a single stream + group + consumer
pub struct QueueClient<S: LogStore = RedisLogStore> {
    config: QueueConfig,
    store: S,
}

impl QueueClient<RedisLogStore> {
    /// Connect to the configured server and ensure the group exists
    pub fn connect(config: QueueConfig) -> QueueResult<Self> {
        let store = RedisLogStore::connect(&config.server)?;
        Self::with_store(config, store)
    }

    /// Validate raw options, then connect
    pub fn from_options(options: QueueOptions) -> QueueResult<Self> {
        Self::connect(options.build()?)
    }
}

impl<S: LogStore> QueueClient<S> {
    /// Build a client on an existing store handle. The group is created
    /// from the start of the stream if it does not exist yet.
    pub fn with_store(config: QueueConfig, store: S) -> QueueResult<Self> {
        store.create_group(&config.stream, &config.group, EntryId::ZERO, true)?;
        debug!(
            stream = %config.stream,
            group = %config.group,
            consumer = %config.consumer,
            "queue client ready"
        );
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stream(&self) -> &str {
        &self.config.stream
    }

    pub fn group(&self) -> &str {
        &self.config.group
    }

    pub fn consumer(&self) -> &str {
        &self.config.consumer
    }

    /// Append a task. Visible to the group at once; no ack needed.
    pub fn enqueue(&self, fields: &Fields) -> QueueResult<EntryId> {
        self.store
            .append(&self.config.stream, fields, self.config.max_length)
    }

    /// Read up to `count` tasks through the group.
    ///
    /// With `ReadCursor::New` only never-delivered tasks are returned; if
    /// none are buffered the call waits up to `block` (`None` returns at
    /// once). With `ReadCursor::After(id)` this consumer's own unacknowledged
    /// history after `id` is re-read, which neither removes nor locks it.
    ///
    /// History items whose payload is gone from the log are acknowledged
    /// and skipped.
    pub fn dequeue(
        &self,
        cursor: ReadCursor,
        block: Option<Duration>,
        count: usize,
    ) -> QueueResult<Vec<Entry>> {
        let mut cursor = cursor;
        loop {
            let raw = self.store.read_group(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer,
                cursor,
                count,
                block,
            )?;
            let Some(last) = raw.last().map(|(id, _)| *id) else {
                return Ok(Vec::new());
            };

            let mut entries = Vec::with_capacity(raw.len());
            let mut orphans = Vec::new();
            for (id, fields) in raw {
                match fields {
                    Some(fields) => entries.push(Entry::new(id, fields)),
                    None => orphans.push(id),
                }
            }

            if !orphans.is_empty() {
                warn!(
                    stream = %self.config.stream,
                    group = %self.config.group,
                    consumer = %self.config.consumer,
                    count = orphans.len(),
                    "acknowledging pending ids whose entries were removed"
                );
                self.acknowledge(&orphans)?;
            }

            if !entries.is_empty() || !cursor.is_history() {
                return Ok(entries);
            }
            cursor = ReadCursor::After(last);
        }
    }

    /// Acknowledge and delete in one step. Deletion removes the entries
    /// for every group reading this stream, not just this one.
    pub fn acknowledge_and_delete(&self, ids: &[EntryId]) -> QueueResult<Removal> {
        self.store
            .ack_and_delete(&self.config.stream, &self.config.group, ids)
    }

    /// Acknowledge only; the entries stay in the log
    pub fn acknowledge(&self, ids: &[EntryId]) -> QueueResult<u64> {
        self.store.ack(&self.config.stream, &self.config.group, ids)
    }

    /// Entries in the closed interval `[start, end]`
    pub fn range(
        &self,
        start: EntryId,
        end: EntryId,
        count: Option<usize>,
    ) -> QueueResult<Vec<Entry>> {
        Ok(self
            .store
            .range(&self.config.stream, start, end, count)?
            .into_iter()
            .map(|(id, fields)| Entry::new(id, fields))
            .collect())
    }

    /// Single entry by id
    pub fn get(&self, id: EntryId) -> QueueResult<Option<Entry>> {
        Ok(self.range(id, id, Some(1))?.into_iter().next())
    }

    /// Scanner over this client's group PEL
    pub fn pending(&self) -> PendingScanner<'_, S> {
        PendingScanner::new(self)
    }

    /// Re-enqueue tasks pending longer than `idle` (see `RestoreStrategy`)
    pub fn pending_restore(&self, idle: Duration, per_page: usize) -> QueueResult<RestoreReport> {
        RestoreStrategy::new(self)
            .min_idle(idle)
            .per_page(per_page)
            .run()
    }

    /// Move tasks pending longer than `idle` to `new_consumer` (see
    /// `ClaimStrategy`)
    pub fn pending_claim(
        &self,
        idle: Duration,
        new_consumer: Option<&str>,
        per_page: usize,
    ) -> QueueResult<ClaimOutcome> {
        let mut strategy = ClaimStrategy::new(self).min_idle(idle).per_page(per_page);
        if let Some(consumer) = new_consumer {
            strategy = strategy.new_consumer(consumer);
        }
        strategy.run()
    }

    /// Delete the whole stream with all its groups
    pub fn destroy_stream(&self) -> QueueResult<()> {
        self.store.delete_stream(&self.config.stream)
    }
}
