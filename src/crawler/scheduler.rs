//! Frontier scheduling
//!
//! This module handles:
//! - Deciding whether a URL record is due for a HEAD or a GET
//! - Claiming due URLs in the in-flight tracker
//! - Global concurrency limiting via a semaphore

use crate::crawler::fetcher::FetchMethod;
use crate::crawler::inflight::{ClaimGuard, InFlightTracker};
use crate::storage::UrlRecord;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A claimed URL ready to be handed to a worker
///
/// The claim is released when the dispatch (or its guard) is dropped.
#[derive(Debug)]
pub struct Dispatch {
    pub record: UrlRecord,
    pub method: FetchMethod,
    pub claim: ClaimGuard,
}

/// Decides which frontier records need fetching and how
///
/// The scheduler coordinates:
/// - Staleness checks against the configured stale duration
/// - In-flight exclusion, so a URL is never fetched twice at once
/// - The global limit on concurrent fetches
pub struct Scheduler {
    tracker: Arc<InFlightTracker>,
    stale_duration: Duration,
    semaphore: Arc<Semaphore>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `tracker` - The shared in-flight tracker
    /// * `stale_duration` - How old a fetch may get before it is repeated
    /// * `max_concurrent_fetches` - Number of fetch permits
    pub fn new(
        tracker: Arc<InFlightTracker>,
        stale_duration: std::time::Duration,
        max_concurrent_fetches: usize,
    ) -> Self {
        let stale_duration = Duration::from_std(stale_duration).unwrap_or(Duration::MAX);

        Self {
            tracker,
            stale_duration,
            semaphore: Arc::new(Semaphore::new(max_concurrent_fetches)),
        }
    }

    /// True if the URL was never fetched with GET or its last GET is stale
    pub fn should_enqueue_get(&self, record: &UrlRecord, now: DateTime<Utc>) -> bool {
        if self.tracker.is_in_flight(&record.url) {
            return false;
        }

        match record.last_get {
            None => true,
            Some(last_get) => now - last_get > self.stale_duration,
        }
    }

    /// True if the URL was never checked, never fetched, or its metadata is stale
    pub fn should_enqueue_head(&self, record: &UrlRecord, now: DateTime<Utc>) -> bool {
        if self.tracker.is_in_flight(&record.url) {
            return false;
        }

        record.created == record.updated
            || record.last_get.is_none()
            || now - record.updated > self.stale_duration
    }

    /// Picks the request to issue for `record`, preferring GET
    pub fn due_method(&self, record: &UrlRecord, now: DateTime<Utc>) -> Option<FetchMethod> {
        if self.should_enqueue_get(record, now) {
            Some(FetchMethod::Get)
        } else if self.should_enqueue_head(record, now) {
            Some(FetchMethod::Head)
        } else {
            None
        }
    }

    /// Claims every due record, skipping the ones another worker holds
    pub fn select_due(&self, records: Vec<UrlRecord>, now: DateTime<Utc>) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();

        for record in records {
            let Some(method) = self.due_method(&record, now) else {
                continue;
            };

            // Another worker may have claimed it since the predicate ran
            match self.tracker.claim(&record.url) {
                Some(claim) => dispatches.push(Dispatch {
                    record,
                    method,
                    claim,
                }),
                None => tracing::debug!("Skipping {}: already in flight", record.url),
            }
        }

        dispatches
    }

    /// Waits for a fetch permit
    ///
    /// Returns `None` only if the semaphore was closed.
    pub async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).acquire_owned().await.ok()
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn tracker(&self) -> &Arc<InFlightTracker> {
        &self.tracker
    }
}
