//! Blob store trait and implementations
//!
//! Blobs are keyed by the plain sha256 hex of their content. `put` and
//! `delete` are idempotent so that failed archive steps can simply be retried.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur during blob store operations
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Invalid content digest: {0}")]
    InvalidDigest(String),

    #[error("Blob {key} does not match its digest")]
    Corrupt { key: String },

    #[error("Refusing to archive empty content")]
    EmptyContent,

    #[error("Blob store lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for blob store operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Content-addressed object storage
///
/// Implementations must be safe to share between fetch workers.
pub trait BlobStore: Send + Sync {
    /// Returns true if a blob is stored under `key`
    fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Reads a blob; `BlobError::NotFound` when absent
    fn get(&self, key: &str) -> BlobResult<Vec<u8>>;

    /// Stores a blob; storing the same key twice is not an error
    fn put(&self, key: &str, data: &[u8]) -> BlobResult<()>;

    /// Deletes a blob; deleting a missing key is not an error
    fn delete(&self, key: &str) -> BlobResult<()>;
}

/// Keys are used as file names, so only plain hex-like names are allowed.
fn validate_key(key: &str) -> BlobResult<()> {
    if key.len() < 3 || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Filesystem blob store
///
/// Layout: `<root>/<first two key chars>/<key>`. Writes go to a temporary
/// file in the same directory and are renamed into place, so readers never
/// see a partially written blob.
pub struct FsBlobStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FsBlobStore {
    /// Opens (creating if needed) a blob store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> BlobResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(&key[..2]).join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self.blob_path(key)?.is_file())
    }

    fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        let path = self.blob_path(key)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BlobError::NotFound(key.to_string()),
            _ => BlobError::Io(e),
        })
    }

    fn put(&self, key: &str, data: &[u8]) -> BlobResult<()> {
        let path = self.blob_path(key)?;
        if path.is_file() {
            return Ok(());
        }

        let dir = path
            .parent()
            .ok_or_else(|| BlobError::InvalidKey(key.to_string()))?;
        std::fs::create_dir_all(dir)?;

        let tmp_name = format!(
            ".{}.{}.{}.tmp",
            key,
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        );
        let tmp_path = dir.join(tmp_name);

        let written = std::fs::File::create(&tmp_path).and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        });

        if let Err(e) = written.and_then(|_| std::fs::rename(&tmp_path, &path)) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        Ok(())
    }

    fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.blob_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blob store, mainly for tests and dry runs
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of stored keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .blobs
            .lock()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl BlobStore for MemoryBlobStore {
    fn exists(&self, key: &str) -> BlobResult<bool> {
        let blobs = self.blobs.lock().map_err(|_| BlobError::Poisoned)?;
        Ok(blobs.contains_key(key))
    }

    fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        let blobs = self.blobs.lock().map_err(|_| BlobError::Poisoned)?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, data: &[u8]) -> BlobResult<()> {
        validate_key(key)?;
        let mut blobs = self.blobs.lock().map_err(|_| BlobError::Poisoned)?;
        blobs
            .entry(key.to_string())
            .or_insert_with(|| data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> BlobResult<()> {
        let mut blobs = self.blobs.lock().map_err(|_| BlobError::Poisoned)?;
        blobs.remove(key);
        Ok(())
    }
}
