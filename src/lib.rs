//! Stream Queue
//!
//! A task queue on an append-only stream with consumer groups, plus the
//! tooling to recover tasks that were delivered but never acknowledged.
//!
//! # Features
//!
//! - **Group delivery**: each task goes to one consumer of a group; several
//!   groups read the same stream independently
//! - **Pending recovery**: re-enqueue stuck tasks (`RestoreStrategy`) or hand
//!   them to another consumer in place (`ClaimStrategy`)
//! - **Backlog drain**: work off a consumer's claimed history
//!   (`PendingDrainProcessor`)
//! - **Leases**: expiring locks for the routines that must run once
//! - **Backends**: Redis Streams, or an in-process store with the same semantics
//!
//! # Modules
//!
//! - `types`: entry ids, entries, PEL records
//! - `config`: client options and validation
//! - `store`: `LogStore` trait and backends
//! - `queue`: `QueueClient`
//! - `pending`: scanner and recovery routines
//! - `lease`: single-instance locking
//! - `logging`: subscriber setup for binaries
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use stream_queue::{fields, QueueClient, QueueConfig, ReadCursor};
//!
//! fn main() -> stream_queue::QueueResult<()> {
//!     let config = QueueConfig::new("balltube", "127.0.0.1:6379")?;
//!     let queue = QueueClient::connect(config)?;
//!
//!     queue.enqueue(&fields([("task", "1")]))?;
//!
//!     for task in queue.dequeue(ReadCursor::New, Some(Duration::from_secs(1)), 1)? {
//!         queue.acknowledge_and_delete(&[task.id])?;
//!     }
//!
//!     queue.pending_restore(Duration::from_secs(5), 20)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lease;
pub mod logging;
pub mod pending;
pub mod queue;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use config::{QueueConfig, QueueOptions, ServerAddress};
pub use error::{ConfigError, QueueError, QueueResult};
pub use lease::{Lease, LeaseStore, LocalLeases};
pub use pending::{
    ClaimOutcome, ClaimReport, ClaimSkip, ClaimStrategy, DrainReport, PendingDrainProcessor,
    PendingScanner, RestoreReport, RestoreStrategy,
};
pub use queue::QueueClient;
pub use store::{LogStore, MemoryLogStore, RedisLeases, RedisLogStore, Removal};
pub use types::{
    fields, ConsumerPending, Entry, EntryId, Fields, PendingRecord, PendingSummary, ReadCursor,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
