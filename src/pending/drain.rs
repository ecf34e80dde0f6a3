//! Working off a consumer's claimed backlog

use std::error::Error;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};
use crate::lease::{Lease, LeaseStore};
use crate::queue::QueueClient;
use crate::store::LogStore;
use crate::types::{Entry, ReadCursor};

/// Totals of a drain run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub processed: usize,
}

/// Processes and removes the pending history of the client's consumer
///
/// History reads neither remove nor lock entries, so two processors on the
/// same consumer identity would handle the same tasks. Run one per
/// consumer, or use `run_leased`.
pub struct PendingDrainProcessor<'a, S: LogStore> {
    client: &'a QueueClient<S>,
    batch: usize,
}

impl<'a, S: LogStore> PendingDrainProcessor<'a, S> {
    pub fn new(client: &'a QueueClient<S>) -> Self {
        Self { client, batch: 1 }
    }

    /// Entries read per history page
    pub fn batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    pub fn lease_key(&self) -> String {
        format!(
            "{}:{}:{}:drain",
            self.client.stream(),
            self.client.group(),
            self.client.consumer()
        )
    }

    /// Hand every pending entry to `handler`, then acknowledge and delete
    /// it. Stops when the history is empty. A handler error stops the
    /// drain and leaves that entry pending.
    pub fn run<F, E>(&self, mut handler: F) -> QueueResult<DrainReport>
    where
        F: FnMut(&Entry) -> Result<(), E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let mut report = DrainReport::default();

        loop {
            // Handled entries are gone, so always restart from the beginning
            let entries = self.client.dequeue(ReadCursor::history(), None, self.batch)?;
            if entries.is_empty() {
                break;
            }

            for entry in entries {
                handler(&entry).map_err(|e| QueueError::Handler {
                    id: entry.id,
                    source: e.into(),
                })?;
                self.client.acknowledge_and_delete(&[entry.id])?;
                debug!(id = %entry.id, "drained pending entry");
                report.processed += 1;
            }
        }

        info!(
            stream = %self.client.stream(),
            consumer = %self.client.consumer(),
            processed = report.processed,
            "pending drain finished"
        );
        Ok(report)
    }

    /// Run while holding this consumer's drain lease
    pub fn run_leased<L, F, E>(
        &self,
        leases: &L,
        ttl: Duration,
        handler: F,
    ) -> QueueResult<DrainReport>
    where
        L: LeaseStore + ?Sized,
        F: FnMut(&Entry) -> Result<(), E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let lease = Lease::acquire(leases, self.lease_key(), ttl)?;
        let report = self.run(handler);
        // Released on drop; a failed release is logged, not returned
        drop(lease);
        report
    }
}
