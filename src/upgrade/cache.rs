//! Release-listing cache.
//!
//! The resolver owns one [`ReleaseCache`]; there is no process-wide cache.
//! Entries expire after an explicit TTL and can be dropped on demand, which
//! a manual "check now" does before resolving.

use crate::upgrade::release::Release;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedListing {
    fetched_at: DateTime<Utc>,
    releases: Vec<Release>,
}

impl CachedListing {
    fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return true;
        };
        now.signed_duration_since(self.fetched_at) < ttl
    }
}

/// Time-bounded cache of the newest-first release page.
#[derive(Debug)]
pub struct ReleaseCache {
    ttl: Duration,
    entry: Mutex<Option<CachedListing>>,
}

impl ReleaseCache {
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// A cache that never returns anything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached listing, if present and younger than the TTL.
    #[must_use]
    pub fn get(&self) -> Option<Vec<Release>> {
        let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        match entry.as_ref() {
            Some(cached) if cached.is_fresh(self.ttl, Utc::now()) => Some(cached.releases.clone()),
            Some(_) => {
                debug!("Release cache expired");
                *entry = None;
                None
            }
            None => None,
        }
    }

    /// Replace the cached listing.
    pub fn store(&self, releases: Vec<Release>) {
        if self.ttl.is_zero() {
            return;
        }
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedListing {
            fetched_at: Utc::now(),
            releases,
        });
    }

    /// Drop the cached listing so the next lookup goes to the network.
    pub fn invalidate(&self) {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Default for ReleaseCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
