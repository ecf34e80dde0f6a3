//! Time helpers

use std::time::Duration;

use chrono::Utc;

/// Current Unix time in milliseconds, the clock entry ids are minted from
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Whole milliseconds of `d`, saturating at `u64::MAX`
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
