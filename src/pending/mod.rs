//! Pending entry recovery
//!
//! Entries delivered to a consumer that never acknowledges them sit in the
//! group's PEL forever. Two recovery strategies with different trade-offs:
//!
//! | | `RestoreStrategy` | `ClaimStrategy` |
//! |---|---|---|
//! | how | delete + re-append under a new id | hand ownership to another consumer |
//! | consumers | unchanged | must drain the new consumer's history |
//! | crash mid-run | task lost between delete and append | nothing lost |
//! | concurrency | single instance only | idempotent, may overlap |
//!
//! Claimed tasks are worked off by `PendingDrainProcessor`, which must also
//! run as a single instance per consumer identity.

mod claim;
mod drain;
mod restore;
mod scanner;

use std::time::Duration;

pub use claim::{ClaimOutcome, ClaimReport, ClaimSkip, ClaimStrategy};
pub use drain::{DrainReport, PendingDrainProcessor};
pub use restore::{RestoreReport, RestoreStrategy};
pub use scanner::{PendingRecords, PendingScanner};

/// Idle time after which a pending entry counts as stuck
pub const DEFAULT_MIN_IDLE: Duration = Duration::from_millis(5000);

/// Pending records fetched per page
pub const DEFAULT_PER_PAGE: usize = 20;
