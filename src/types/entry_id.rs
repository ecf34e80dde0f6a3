//! Stream entry identifiers
//!
//! An id is the pair (creation millisecond, sequence). Ordering is
//! lexicographic over that pair, which is what every paging loop in
//! `crate::pending` relies on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::QueueError;

/// Identifier of a stream entry: `<ms>-<seq>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId {
    /// Milliseconds since the Unix epoch at creation
    pub ms: u64,
    /// Sequence within the same millisecond
    pub seq: u64,
}

impl EntryId {
    /// The smallest possible id (`0-0`), also the "all history" cursor
    pub const ZERO: EntryId = EntryId { ms: 0, seq: 0 };

    /// The largest possible id
    pub const MAX: EntryId = EntryId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// The smallest id greater than `self`
    pub fn successor(&self) -> Option<EntryId> {
        if self.seq < u64::MAX {
            Some(EntryId::new(self.ms, self.seq + 1))
        } else if self.ms < u64::MAX {
            Some(EntryId::new(self.ms + 1, 0))
        } else {
            None
        }
    }

    /// Next id to hand out after `self` given the current clock reading.
    ///
    /// Mirrors how a stream assigns `*` ids: a fresh millisecond starts at
    /// sequence 0, otherwise the sequence is bumped so ids stay strictly
    /// increasing even when the clock stalls or steps backwards.
    pub fn successor_at(&self, now_ms: u64) -> EntryId {
        if now_ms > self.ms {
            EntryId::new(now_ms, 0)
        } else if self.seq == u64::MAX {
            EntryId::new(self.ms + 1, 0)
        } else {
            EntryId::new(self.ms, self.seq + 1)
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QueueError::InvalidEntryId(s.to_string());
        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (ms, seq),
            None => (s, "0"),
        };
        let ms = ms.parse::<u64>().map_err(|_| invalid())?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;
        Ok(EntryId::new(ms, seq))
    }
}

impl Serialize for EntryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
