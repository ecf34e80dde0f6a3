//! Leased mutual exclusion for single-instance routines
//!
//! `RestoreStrategy` and `PendingDrainProcessor` must never run twice at
//! once for the same queue. A lease is an expiring key owned by one holder;
//! whoever gets it runs, everyone else backs off with
//! `QueueError::LeaseHeld`. The expiry bounds how long a crashed holder can
//! block the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::utils::{millis, now_millis};

/// Default lease lifetime
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60);

static HOLDER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Backend that stores lease keys
pub trait LeaseStore {
    /// Take `key` for `holder` unless someone else holds an unexpired lease
    fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> QueueResult<bool>;

    /// Give `key` back. Returns false if `holder` no longer owned it.
    fn release(&self, key: &str, holder: &str) -> QueueResult<bool>;
}

/// A held lease, released on drop
pub struct Lease<'a, L: LeaseStore + ?Sized> {
    store: &'a L,
    key: String,
    holder: String,
    released: bool,
}

impl<'a, L: LeaseStore + ?Sized> Lease<'a, L> {
    /// Acquire `key` or fail with `QueueError::LeaseHeld`
    pub fn acquire(store: &'a L, key: impl Into<String>, ttl: Duration) -> QueueResult<Self> {
        let key = key.into();
        let holder = format!(
            "{}-{}-{}",
            std::process::id(),
            now_millis(),
            HOLDER_COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        if !store.try_acquire(&key, &holder, ttl)? {
            warn!(key = %key, "lease already held, not running");
            return Err(QueueError::LeaseHeld { key });
        }

        debug!(key = %key, holder = %holder, ttl_ms = millis(ttl), "lease acquired");
        Ok(Self {
            store,
            key,
            holder,
            released: false,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Release now and report whether the lease was still ours
    pub fn release(mut self) -> QueueResult<bool> {
        self.released = true;
        self.store.release(&self.key, &self.holder)
    }
}

impl<L: LeaseStore + ?Sized> Drop for Lease<'_, L> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.store.release(&self.key, &self.holder) {
            Ok(true) => debug!(key = %self.key, "lease released"),
            Ok(false) => warn!(key = %self.key, "lease expired before release"),
            Err(e) => warn!(key = %self.key, error = %e, "failed to release lease"),
        }
    }
}

/// In-process leases, for routines that only compete within one process
#[derive(Debug, Clone, Default)]
pub struct LocalLeases {
    /// key -> (holder, expiry); `None` expiry never lapses
    held: Arc<Mutex<HashMap<String, (String, Option<Instant>)>>>,
}

impl LocalLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is held by anyone right now
    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .get(key)
            .is_some_and(|(_, expires)| unexpired(*expires, Instant::now()))
    }
}

fn unexpired(expires: Option<Instant>, now: Instant) -> bool {
    expires.map_or(true, |at| at > now)
}

impl LeaseStore for LocalLeases {
    fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> QueueResult<bool> {
        let mut held = self.held.lock();
        let now = Instant::now();

        if held
            .get(key)
            .is_some_and(|(_, expires)| unexpired(*expires, now))
        {
            return Ok(false);
        }
        held.insert(key.to_string(), (holder.to_string(), now.checked_add(ttl)));
        Ok(true)
    }

    fn release(&self, key: &str, holder: &str) -> QueueResult<bool> {
        let mut held = self.held.lock();
        let owned = held.get(key).is_some_and(|(owner, _)| owner == holder);
        if owned {
            held.remove(key);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let leases = LocalLeases::new();
        let first = Lease::acquire(&leases, "q:restore", DEFAULT_LEASE_TTL).unwrap();

        let err = Lease::acquire(&leases, "q:restore", DEFAULT_LEASE_TTL).err().unwrap();
        assert!(matches!(err, QueueError::LeaseHeld { ref key } if key == "q:restore"));

        drop(first);
        assert!(!leases.is_held("q:restore"));
        assert!(Lease::acquire(&leases, "q:restore", DEFAULT_LEASE_TTL).is_ok());
    }

    #[test]
    fn test_expired_lease_can_be_taken_over() {
        let leases = LocalLeases::new();
        let stale = Lease::acquire(&leases, "k", Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let fresh = Lease::acquire(&leases, "k", DEFAULT_LEASE_TTL).unwrap();

        // The stale holder must not free the new holder's lease
        assert!(!stale.release().unwrap());
        assert!(leases.is_held(fresh.key()));
    }

    #[test]
    fn test_independent_keys() {
        let leases = LocalLeases::new();
        let _a = Lease::acquire(&leases, "a", DEFAULT_LEASE_TTL).unwrap();
        assert!(Lease::acquire(&leases, "b", DEFAULT_LEASE_TTL).is_ok());
    }

    #[test]
    fn test_unbounded_ttl_never_lapses() {
        let leases = LocalLeases::new();
        let lease = Lease::acquire(&leases, "forever", Duration::MAX).unwrap();

        assert!(leases.is_held("forever"));
        assert!(Lease::acquire(&leases, "forever", DEFAULT_LEASE_TTL).is_err());
        assert!(lease.release().unwrap());
        assert!(!leases.is_held("forever"));
    }
}
