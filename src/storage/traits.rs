//! Storage traits and error types
//!
//! One repository trait per entity. The crawler only talks to these traits;
//! query text stays inside the SQLite implementation.

use crate::archive::ContentDigest;
use crate::storage::{LinkRecord, Snapshot, UrlRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("URL not found: {0}")]
    UrlNotFound(String),

    #[error("Link not found: {src} -> {dst}")]
    LinkNotFound { src: String, dst: String },

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] crate::UrlError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true for the typed "no such key" variants
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UrlNotFound(_) | Self::LinkNotFound { .. })
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// URL records, keyed by normalized URL string
pub trait UrlStore {
    /// Gets a URL record; `UrlNotFound` when absent
    fn get_url(&self, url: &str) -> StorageResult<UrlRecord>;

    /// Inserts a new URL record; `AlreadyExists` if the URL is known
    ///
    /// The URL is normalized and the host derived from it before writing.
    fn insert_url(&mut self, record: &UrlRecord) -> StorageResult<()>;

    /// Inserts a URL record unless one exists; returns true if inserted
    fn insert_url_if_absent(&mut self, record: &UrlRecord) -> StorageResult<bool>;

    /// Overwrites every column of an existing record; `UrlNotFound` if absent
    fn update_url(&mut self, record: &UrlRecord) -> StorageResult<()>;

    /// Deletes a URL record along with its links and snapshots
    fn delete_url(&mut self, url: &str) -> StorageResult<()>;

    /// Lists URL records, newest first
    ///
    /// `filter` matches as a substring of the URL.
    fn list_urls(
        &self,
        limit: u32,
        offset: u32,
        filter: Option<&str>,
    ) -> StorageResult<Vec<UrlRecord>>;

    /// Counts all URL records
    fn count_urls(&self) -> StorageResult<u64>;

    /// Counts URL records with at least one successful GET
    fn count_fetched_urls(&self) -> StorageResult<u64>;

    /// Counts distinct hosts
    fn count_hosts(&self) -> StorageResult<u64>;

    /// URLs linking to `dst`
    fn inbound_link_urls(&self, dst: &str) -> StorageResult<Vec<String>>;

    /// URLs linked from `src`
    fn outbound_link_urls(&self, src: &str) -> StorageResult<Vec<String>>;
}

/// Link records, keyed by (src, dst)
pub trait LinkStore {
    fn get_link(&self, src: &str, dst: &str) -> StorageResult<LinkRecord>;

    /// Inserts a link; `AlreadyExists` if the pair is known, and a
    /// `ConstraintViolation` if either endpoint is not a URL record
    fn insert_link(&mut self, link: &LinkRecord) -> StorageResult<()>;

    /// Overwrites the timestamps of an existing link
    fn update_link(&mut self, link: &LinkRecord) -> StorageResult<()>;

    /// Inserts the link, or refreshes `updated` if it already exists
    fn upsert_link(&mut self, src: &str, dst: &str, seen_at: DateTime<Utc>)
        -> StorageResult<()>;

    fn delete_link(&mut self, src: &str, dst: &str) -> StorageResult<()>;

    /// Lists links, newest first; `filter` matches as a substring of `src`
    fn list_links(
        &self,
        limit: u32,
        offset: u32,
        filter: Option<&str>,
    ) -> StorageResult<Vec<LinkRecord>>;

    fn count_links(&self) -> StorageResult<u64>;
}

/// Append-only snapshot history
pub trait SnapshotStore {
    /// Appends a snapshot and returns its row id
    fn insert_snapshot(&mut self, snapshot: &Snapshot) -> StorageResult<i64>;

    /// All snapshots of one URL, oldest first
    fn snapshots_for_url(&self, url: &str) -> StorageResult<Vec<Snapshot>>;

    /// Lists snapshots, newest first; `filter` matches as a substring of the URL
    fn list_snapshots(
        &self,
        limit: u32,
        offset: u32,
        filter: Option<&str>,
    ) -> StorageResult<Vec<Snapshot>>;

    /// Distinct URLs whose fetched content hashed to `hash`
    fn urls_for_hash(&self, hash: &ContentDigest) -> StorageResult<Vec<String>>;

    fn count_snapshots(&self) -> StorageResult<u64>;

    /// Counts snapshots of attempts that got no HTTP response
    fn count_failed_snapshots(&self) -> StorageResult<u64>;
}

/// Everything the crawler needs from persistence
pub trait Storage: UrlStore + LinkStore + SnapshotStore {}

impl<T: UrlStore + LinkStore + SnapshotStore> Storage for T {}
