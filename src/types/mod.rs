//! Data types shared by the queue client, stores and recovery routines

mod entry;
mod entry_id;
mod pending;

pub use entry::{Entry, Fields, ReadCursor};
pub use entry_id::EntryId;
pub use pending::{ConsumerPending, PendingRecord, PendingSummary};

/// Build a `Fields` map from key/value pairs
pub fn fields<K, V, I>(pairs: I) -> Fields
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
