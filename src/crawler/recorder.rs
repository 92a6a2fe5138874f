//! Snapshot recording
//!
//! Turns a `FetchOutcome` into persistence writes: the URL row is refreshed
//! only when a response arrived, while every attempt appends a snapshot.

use crate::archive::ContentDigest;
use crate::crawler::fetcher::{FetchMethod, FetchOutcome};
use crate::storage::{Snapshot, SnapshotStore, StorageResult, UrlRecord, UrlStore};
use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Returns the URL record as it should look after a successful fetch
///
/// `None` when the attempt failed; the stored record then stays as it was
/// so the scheduler retries it on the next cycle.
pub fn updated_record(
    record: &UrlRecord,
    outcome: &FetchOutcome,
    title: Option<&str>,
    now: DateTime<Utc>,
) -> Option<UrlRecord> {
    let response = outcome.response()?;
    // `updated == created` marks a never-checked URL, so a fetch in the
    // discovery second must still move `updated` past `created`
    let now = now
        .trunc_subsecs(0)
        .max(record.created + Duration::seconds(1));

    let mut updated = record.clone();
    updated.updated = now;
    updated.status = Some(response.status);
    updated.content_type = response.content_type.clone();
    updated.content_length = response.content_length;

    if outcome.method == FetchMethod::Get {
        updated.last_get = Some(now);
        updated.title = title.unwrap_or_default().to_string();
    }

    Some(updated)
}

/// Builds the immutable snapshot for one attempt
///
/// Failed attempts carry no status, no headers and no hash.
pub fn snapshot_for(outcome: &FetchOutcome, hash: Option<ContentDigest>) -> Snapshot {
    let (status, headers, hash) = match outcome.response() {
        Some(response) => (Some(response.status), response.headers.clone(), hash),
        None => (None, Vec::new(), None),
    };

    Snapshot {
        url: outcome.url.as_str().to_string(),
        created: outcome.started_at.trunc_subsecs(0),
        status,
        duration_ms: outcome.duration_ms,
        headers,
        hash,
    }
}

/// Persists the result of a fetch attempt
///
/// Returns the id of the appended snapshot.
pub fn record_fetch<S>(
    storage: &mut S,
    record: &UrlRecord,
    outcome: &FetchOutcome,
    title: Option<&str>,
    hash: Option<ContentDigest>,
    now: DateTime<Utc>,
) -> StorageResult<i64>
where
    S: UrlStore + SnapshotStore + ?Sized,
{
    if let Some(updated) = updated_record(record, outcome, title, now) {
        storage.update_url(&updated)?;
    }

    storage.insert_snapshot(&snapshot_for(outcome, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::{FetchFailure, FetchedResponse};
    use crate::crawler::scheduler::Scheduler;
    use crate::crawler::InFlightTracker;
    use crate::storage::{SqliteStorage, UrlStore};
    use std::sync::Arc;
    use url::Url;

    fn base_record(now: DateTime<Utc>) -> UrlRecord {
        UrlRecord::discovered(
            &Url::parse("https://example.com/page").unwrap(),
            now - Duration::days(1),
        )
    }

    fn outcome(method: FetchMethod, result: Result<FetchedResponse, FetchFailure>) -> FetchOutcome {
        FetchOutcome {
            url: Url::parse("https://example.com/page").unwrap(),
            method,
            started_at: Utc::now(),
            duration_ms: 42,
            result,
        }
    }

    fn response(body: Option<&[u8]>) -> FetchedResponse {
        FetchedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            content_type: "text/html".to_string(),
            content_length: body.map(|b| b.len() as u64),
            body: body.map(|b| b.to_vec()),
        }
    }

    #[test]
    fn test_get_sets_last_get_and_title() {
        let now = Utc::now();
        let record = base_record(now);
        let outcome = outcome(FetchMethod::Get, Ok(response(Some(b"<p>hi</p>"))));

        let updated = updated_record(&record, &outcome, Some("Title"), now).unwrap();

        assert_eq!(updated.created, record.created);
        assert_eq!(updated.updated, now.trunc_subsecs(0));
        assert_eq!(updated.last_get, Some(now.trunc_subsecs(0)));
        assert_eq!(updated.title, "Title");
        assert_eq!(updated.status, Some(200));
        assert_eq!(updated.content_length, Some(9));
    }

    #[test]
    fn test_head_leaves_last_get_and_title() {
        let now = Utc::now();
        let mut record = base_record(now);
        record.title = "Old".to_string();
        let outcome = outcome(FetchMethod::Head, Ok(response(None)));

        let updated = updated_record(&record, &outcome, None, now).unwrap();

        assert_eq!(updated.last_get, None);
        assert_eq!(updated.title, "Old");
        assert_eq!(updated.updated, now.trunc_subsecs(0));
        assert_ne!(updated.created, updated.updated);
    }

    #[test]
    fn test_fetch_in_discovery_second_is_not_due_again() {
        let now = Utc::now().trunc_subsecs(0);
        let record =
            UrlRecord::discovered(&Url::parse("https://example.com/page").unwrap(), now);

        let get = outcome(FetchMethod::Get, Ok(response(Some(b"<p>hi</p>"))));
        let fetched = updated_record(&record, &get, None, now).unwrap();
        assert!(fetched.updated > fetched.created);
        assert_eq!(fetched.last_get, Some(fetched.updated));

        let scheduler = Scheduler::new(
            Arc::new(InFlightTracker::new()),
            std::time::Duration::from_secs(3600),
            1,
        );
        assert_eq!(scheduler.due_method(&fetched, now), None);

        let head = outcome(FetchMethod::Head, Ok(response(None)));
        let checked = updated_record(&record, &head, None, now).unwrap();
        assert_ne!(checked.created, checked.updated);
    }

    #[test]
    fn test_failure_leaves_record_untouched() {
        let now = Utc::now();
        let record = base_record(now);
        let outcome = outcome(FetchMethod::Get, Err(FetchFailure::Timeout(std::time::Duration::from_secs(1))));

        assert!(updated_record(&record, &outcome, None, now).is_none());

        let snapshot = snapshot_for(&outcome, Some(ContentDigest::compute(b"ignored")));
        assert_eq!(snapshot.status, None);
        assert_eq!(snapshot.hash, None);
        assert!(snapshot.headers.is_empty());
        assert_eq!(snapshot.duration_ms, 42);
    }

    #[test]
    fn test_record_fetch_persists_both() {
        let now = Utc::now();
        let record = base_record(now);
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.insert_url(&record).unwrap();

        let digest = ContentDigest::compute(b"<p>hi</p>");
        let outcome = outcome(FetchMethod::Get, Ok(response(Some(b"<p>hi</p>"))));
        record_fetch(&mut storage, &record, &outcome, Some("Hi"), Some(digest.clone()), now).unwrap();

        let stored = storage.get_url(&record.url).unwrap();
        assert_eq!(stored.title, "Hi");
        assert!(stored.is_fetched());

        let history = storage.snapshots_for_url(&record.url).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].hash, Some(digest));
    }

    #[test]
    fn test_record_failed_fetch() {
        let now = Utc::now();
        let record = base_record(now);
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.insert_url(&record).unwrap();

        let outcome = outcome(
            FetchMethod::Get,
            Err(FetchFailure::Connect("refused".to_string())),
        );
        record_fetch(&mut storage, &record, &outcome, None, None, now).unwrap();

        assert_eq!(storage.get_url(&record.url).unwrap(), record);
        assert_eq!(storage.count_failed_snapshots().unwrap(), 1);
    }
}
