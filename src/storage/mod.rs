//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - URL records (the frontier and its fetch metadata)
//! - Link relationships between URLs
//! - Append-only fetch snapshots
//!
//! Sentinel values (`-1` for unknown status/length, epoch `0` for "never
//! fetched") exist only in the database; records use `Option` instead.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{LinkStore, SnapshotStore, Storage, StorageError, StorageResult, UrlStore};

use crate::archive::ContentDigest;
use crate::url::extract_host;
use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use url::Url;

/// Current time at the one-second resolution used by the database
pub fn now_seconds() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Encodes a timestamp as epoch seconds
pub(crate) fn to_epoch(time: &DateTime<Utc>) -> i64 {
    time.timestamp()
}

/// Decodes epoch seconds; `None` if out of chrono's range
pub(crate) fn from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Encodes an optional non-negative value with `-1` for "unknown"
pub(crate) fn encode_sentinel<T: Into<u64>>(value: Option<T>) -> i64 {
    value
        .and_then(|v| i64::try_from(v.into()).ok())
        .unwrap_or(-1)
}

/// Decodes a sentinel column; anything negative (including values that
/// slipped in below -1) reads back as unknown.
pub(crate) fn decode_sentinel<T: TryFrom<i64>>(value: i64) -> Option<T> {
    if value < 0 {
        return None;
    }
    T::try_from(value).ok()
}

/// A known URL and the metadata of its latest fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    /// Normalized absolute URL, the primary key
    pub url: String,
    /// First discovery time
    pub created: DateTime<Utc>,
    /// Last metadata change (any HEAD or GET)
    pub updated: DateTime<Utc>,
    /// Last successful GET; `None` if never fetched
    pub last_get: Option<DateTime<Utc>>,
    pub host: String,
    /// HTTP status of the latest fetch, if known
    pub status: Option<u16>,
    pub content_type: String,
    pub content_length: Option<u64>,
    pub title: String,
}

impl UrlRecord {
    /// Builds the record for a newly discovered URL
    ///
    /// `url` must already be normalized; `created` and `updated` are equal,
    /// which marks the record as never checked.
    pub fn discovered(url: &Url, now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(0);
        Self {
            url: url.as_str().to_string(),
            created: now,
            updated: now,
            last_get: None,
            host: extract_host(url).unwrap_or_default(),
            status: None,
            content_type: String::new(),
            content_length: None,
            title: String::new(),
        }
    }

    /// Returns true if a GET has ever completed for this URL
    pub fn is_fetched(&self) -> bool {
        self.last_get.is_some()
    }
}

/// A hyperlink from `src` to `dst`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub src: String,
    pub dst: String,
    pub created: DateTime<Utc>,
    /// Last time the link was seen
    pub updated: DateTime<Utc>,
}

/// Immutable record of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub url: String,
    /// When the request was issued
    pub created: DateTime<Utc>,
    /// HTTP status; `None` when the request failed
    pub status: Option<u16>,
    /// Time to complete the response in milliseconds
    pub duration_ms: i64,
    /// Response headers in the order received
    pub headers: Vec<(String, String)>,
    /// Digest of the response body, if one was archived
    pub hash: Option<ContentDigest>,
}

impl Snapshot {
    /// Returns true if this attempt got an HTTP response
    pub fn is_success(&self) -> bool {
        self.status.is_some()
    }
}
