//! Destructive recovery: delete and re-append stuck entries
//!
//! Relies on two properties of the PEL:
//! 1. every pass removes the expired entries it handled, so the next page
//!    again starts at the lowest outstanding id
//! 2. ids grow with delivery time, so once an id is not idle enough the
//!    ones after it are not either
//!
//! The delete and the append are two separate writes. A crash between them
//! loses the task. Two concurrent runs can both see the same record and
//! re-append it twice, so only one instance may run per group; use
//! `run_leased` when more than one host could start it.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::QueueResult;
use crate::lease::{Lease, LeaseStore};
use crate::queue::QueueClient;
use crate::store::LogStore;
use crate::types::EntryId;
use crate::utils::millis;

use super::{DEFAULT_MIN_IDLE, DEFAULT_PER_PAGE};

/// Result of a restore run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Entries re-appended under a new id
    pub restored: usize,
    /// Expired records whose entry was already gone; acknowledged only
    pub orphaned: usize,
    /// Pending pages fetched
    pub pages: usize,
}

/// Re-enqueues entries that have been pending longer than `min_idle`
pub struct RestoreStrategy<'a, S: LogStore> {
    client: &'a QueueClient<S>,
    min_idle: Duration,
    per_page: usize,
}

impl<'a, S: LogStore> RestoreStrategy<'a, S> {
    pub fn new(client: &'a QueueClient<S>) -> Self {
        Self {
            client,
            min_idle: DEFAULT_MIN_IDLE,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    /// Records idle strictly longer than this are restored
    pub fn min_idle(mut self, min_idle: Duration) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Lease key guarding this group's restore
    pub fn lease_key(&self) -> String {
        format!("{}:{}:restore", self.client.stream(), self.client.group())
    }

    /// Run once. The caller guarantees no other restore runs on this group.
    pub fn run(&self) -> QueueResult<RestoreReport> {
        let scanner = self.client.pending();
        let threshold_ms = millis(self.min_idle);
        let mut report = RestoreReport::default();

        loop {
            let page = scanner.page(self.per_page, EntryId::ZERO, EntryId::MAX, None)?;
            report.pages += 1;

            let mut handled = 0;
            for record in page.iter().filter(|r| r.idle_ms > threshold_ms) {
                let id = record.entry_id;
                match self.client.get(id)? {
                    Some(entry) => {
                        self.client.acknowledge_and_delete(&[id])?;
                        let new_id = self.client.enqueue(&entry.fields)?;
                        debug!(
                            old_id = %id,
                            new_id = %new_id,
                            consumer = %record.consumer,
                            idle_ms = record.idle_ms,
                            "restored pending entry"
                        );
                        report.restored += 1;
                    }
                    None => {
                        warn!(
                            id = %id,
                            consumer = %record.consumer,
                            "pending entry no longer in log"
                        );
                        self.client.acknowledge(&[id])?;
                        report.orphaned += 1;
                    }
                }
                handled += 1;
            }

            if handled < self.per_page {
                break;
            }
        }

        info!(
            stream = %self.client.stream(),
            group = %self.client.group(),
            restored = report.restored,
            orphaned = report.orphaned,
            pages = report.pages,
            "pending restore finished"
        );
        Ok(report)
    }

    /// Run while holding this group's restore lease
    pub fn run_leased<L: LeaseStore + ?Sized>(
        &self,
        leases: &L,
        ttl: Duration,
    ) -> QueueResult<RestoreReport> {
        let lease = Lease::acquire(leases, self.lease_key(), ttl)?;
        let report = self.run();
        // Released on drop; a failed release is logged, not returned
        drop(lease);
        report
    }
}
