//! Non-destructive recovery: move stuck entries to another consumer
//!
//! Ownership transfer touches only PEL metadata (owner, delivery count,
//! idle clock); ids and payloads stay put, so nothing can be lost or
//! duplicated. Claiming an id twice ends in the same state, which makes
//! overlapping runs harmless. The claimed entries are then worked off by
//! reading the target consumer's history, see `PendingDrainProcessor`.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::QueueResult;
use crate::queue::QueueClient;
use crate::store::LogStore;
use crate::types::EntryId;

use super::{DEFAULT_MIN_IDLE, DEFAULT_PER_PAGE};

/// Why a claim run did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSkip {
    /// No target consumer was configured
    MissingConsumer,
    /// The target is the consumer being recovered from
    SameConsumer,
}

/// Totals of a claim run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimReport {
    /// Distinct ids moved to `target`
    pub claimed: usize,
    pub pages: usize,
    pub target: String,
}

/// Claim result: misconfiguration is reported, not raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClaimOutcome {
    NotAttempted { reason: ClaimSkip },
    Claimed(ClaimReport),
}

impl ClaimOutcome {
    /// Number claimed, `None` if the run was not attempted
    pub fn claimed(&self) -> Option<usize> {
        match self {
            ClaimOutcome::Claimed(report) => Some(report.claimed),
            ClaimOutcome::NotAttempted { .. } => None,
        }
    }

    pub fn is_attempted(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

/// Hands entries pending on the client's consumer to `new_consumer`
pub struct ClaimStrategy<'a, S: LogStore> {
    client: &'a QueueClient<S>,
    min_idle: Duration,
    per_page: usize,
    new_consumer: Option<String>,
}

impl<'a, S: LogStore> ClaimStrategy<'a, S> {
    pub fn new(client: &'a QueueClient<S>) -> Self {
        Self {
            client,
            min_idle: DEFAULT_MIN_IDLE,
            per_page: DEFAULT_PER_PAGE,
            new_consumer: None,
        }
    }

    /// Only entries idle at least this long change owner
    pub fn min_idle(mut self, min_idle: Duration) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn new_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.new_consumer = Some(consumer.into());
        self
    }

    pub fn run(&self) -> QueueResult<ClaimOutcome> {
        let target = match self.new_consumer.as_deref() {
            Some(target) if !target.is_empty() => target,
            _ => return Ok(self.skip(ClaimSkip::MissingConsumer)),
        };
        if target == self.client.consumer() {
            return Ok(self.skip(ClaimSkip::SameConsumer));
        }

        let scanner = self.client.pending();
        let summary = scanner.summary()?;
        let mut report = ClaimReport {
            claimed: 0,
            pages: 0,
            target: target.to_string(),
        };

        let (Some(mut start), Some(end)) = (summary.min_id, summary.max_id) else {
            return Ok(ClaimOutcome::Claimed(report));
        };

        let owner = self.client.consumer();
        let mut seen: HashSet<EntryId> = HashSet::new();
        let mut claimed: HashSet<EntryId> = HashSet::new();

        loop {
            let page = scanner.page(self.per_page, start, end, Some(owner))?;
            report.pages += 1;

            let Some(last) = page.last().map(|r| r.entry_id) else {
                break;
            };

            // Boundary ids reappear when a page starts at the previous last id
            let fresh: Vec<EntryId> = page
                .iter()
                .map(|r| r.entry_id)
                .filter(|id| seen.insert(*id))
                .collect();

            if !fresh.is_empty() {
                let moved = self.client.store().claim(
                    self.client.stream(),
                    self.client.group(),
                    target,
                    self.min_idle,
                    &fresh,
                    true,
                )?;
                let newly = moved.into_iter().filter(|id| claimed.insert(*id)).count();
                debug!(
                    page = report.pages,
                    candidates = fresh.len(),
                    claimed = newly,
                    "claimed page"
                );
            }

            if page.len() < self.per_page || last == end {
                break;
            }
            // A page holding only the boundary id makes no progress from it
            start = match (fresh.is_empty(), last.successor()) {
                (false, _) => last,
                (true, Some(next)) => next,
                (true, None) => break,
            };
        }

        report.claimed = claimed.len();
        info!(
            stream = %self.client.stream(),
            group = %self.client.group(),
            from = %owner,
            to = %target,
            claimed = report.claimed,
            pages = report.pages,
            "pending claim finished"
        );
        Ok(ClaimOutcome::Claimed(report))
    }

    fn skip(&self, reason: ClaimSkip) -> ClaimOutcome {
        warn!(
            stream = %self.client.stream(),
            consumer = %self.client.consumer(),
            reason = ?reason,
            "pending claim not attempted"
        );
        ClaimOutcome::NotAttempted { reason }
    }
}
