//! Process-wide set of URLs with an outstanding fetch
//!
//! A URL is claimed before it is dispatched and released when its worker
//! finishes. Claims are never persisted; a restart starts from an empty set.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Tracks which URLs are currently being fetched
#[derive(Debug, Default)]
pub struct InFlightTracker {
    urls: Mutex<HashSet<String>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn urls(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.urls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically marks `url` as in flight
    ///
    /// Returns false if it was already claimed.
    pub fn try_claim(&self, url: &str) -> bool {
        self.urls().insert(url.to_string())
    }

    /// Clears the marker for `url`; releasing an unclaimed URL is a no-op
    pub fn release(&self, url: &str) {
        self.urls().remove(url);
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.urls().contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls().len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls().is_empty()
    }

    /// Claims `url` and returns a guard that releases it when dropped
    pub fn claim(self: &Arc<Self>, url: &str) -> Option<ClaimGuard> {
        if !self.try_claim(url) {
            return None;
        }

        Some(ClaimGuard {
            tracker: Arc::clone(self),
            url: url.to_string(),
        })
    }
}

/// Holds an in-flight claim until dropped
///
/// Dropping covers every exit path of a worker, including panics and
/// cancelled tasks.
#[derive(Debug)]
pub struct ClaimGuard {
    tracker: Arc<InFlightTracker>,
    url: String,
}

impl ClaimGuard {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.tracker.release(&self.url);
        tracing::trace!("Released in-flight claim on {}", self.url);
    }
}
