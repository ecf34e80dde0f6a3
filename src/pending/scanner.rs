//! Paginated view of a group's PEL

use crate::error::QueueResult;
use crate::queue::QueueClient;
use crate::store::LogStore;
use crate::types::{EntryId, PendingRecord, PendingSummary};

/// Reads the pending entries of one group
pub struct PendingScanner<'a, S: LogStore> {
    store: &'a S,
    stream: &'a str,
    group: &'a str,
}

impl<'a, S: LogStore> PendingScanner<'a, S> {
    /// Scanner over the client's own group
    pub fn new(client: &'a QueueClient<S>) -> Self {
        Self::for_group(client, client.group())
    }

    /// Scanner over another group of the same stream
    pub fn for_group(client: &'a QueueClient<S>, group: &'a str) -> Self {
        Self {
            store: client.store(),
            stream: client.stream(),
            group,
        }
    }

    pub fn group(&self) -> &str {
        self.group
    }

    pub fn summary(&self) -> QueueResult<PendingSummary> {
        self.store.pending_summary(self.stream, self.group)
    }

    /// Up to `count` records with ids in `[start, end]`, both ends
    /// included, optionally only those owned by `consumer`. A short page
    /// means the interval is exhausted.
    pub fn page(
        &self,
        count: usize,
        start: EntryId,
        end: EntryId,
        consumer: Option<&str>,
    ) -> QueueResult<Vec<PendingRecord>> {
        self.store
            .pending_range(self.stream, self.group, count, start, end, consumer)
    }

    /// Iterate over every pending record, `per_page` at a time
    pub fn records(
        &self,
        per_page: usize,
        consumer: Option<&'a str>,
    ) -> PendingRecords<'_, 'a, S> {
        PendingRecords {
            scanner: self,
            per_page: per_page.max(1),
            consumer,
            next_start: Some(EntryId::ZERO),
            buffer: Vec::new().into_iter(),
        }
    }
}

/// Iterator returned by `PendingScanner::records`
///
/// Pages never overlap: each page starts right after the last id of the
/// previous one.
pub struct PendingRecords<'s, 'a, S: LogStore> {
    scanner: &'s PendingScanner<'a, S>,
    per_page: usize,
    consumer: Option<&'a str>,
    next_start: Option<EntryId>,
    buffer: std::vec::IntoIter<PendingRecord>,
}

impl<S: LogStore> Iterator for PendingRecords<'_, '_, S> {
    type Item = QueueResult<PendingRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.buffer.next() {
            return Some(Ok(record));
        }

        let start = self.next_start?;
        let page = match self
            .scanner
            .page(self.per_page, start, EntryId::MAX, self.consumer)
        {
            Ok(page) => page,
            Err(e) => {
                self.next_start = None;
                return Some(Err(e));
            }
        };

        self.next_start = match page.last() {
            Some(last) if page.len() == self.per_page => last.entry_id.successor(),
            _ => None,
        };
        self.buffer = page.into_iter();
        self.buffer.next().map(Ok)
    }
}
