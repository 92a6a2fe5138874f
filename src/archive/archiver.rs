//! Deduplicating archiver
//!
//! Many URLs resolve to byte-identical content, so the archive is keyed by
//! content rather than by source URL: the digest is computed first and the
//! bytes are only written when no blob exists under its key yet.

use crate::archive::digest::ContentDigest;
use crate::archive::store::{BlobError, BlobResult, BlobStore};
use std::sync::Arc;

/// Result of archiving one response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedContent {
    /// Digest of the archived bytes
    pub digest: ContentDigest,

    /// True if the bytes were written by this call, false if already present
    pub stored: bool,

    /// Size of the content in bytes
    pub size: usize,
}

/// Content hasher and deduplicating writer in front of a [`BlobStore`]
#[derive(Clone)]
pub struct Archiver {
    store: Arc<dyn BlobStore>,
}

impl Archiver {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Hashes `data` and stores it unless a blob with the same key exists
    ///
    /// Empty content is rejected with [`BlobError::EmptyContent`]; such
    /// fetches are recorded without a hash.
    pub fn archive(&self, data: &[u8]) -> BlobResult<ArchivedContent> {
        if data.is_empty() {
            return Err(BlobError::EmptyContent);
        }

        let digest = ContentDigest::compute(data);
        let key = digest.blob_key();

        if self.store.exists(key)? {
            tracing::debug!("Content {} already archived", digest);
            return Ok(ArchivedContent {
                digest,
                stored: false,
                size: data.len(),
            });
        }

        self.store.put(key, data)?;
        tracing::debug!("Archived {} bytes as {}", data.len(), digest);

        Ok(ArchivedContent {
            digest,
            stored: true,
            size: data.len(),
        })
    }

    /// Returns true if content with this digest is archived
    pub fn contains(&self, digest: &ContentDigest) -> BlobResult<bool> {
        self.store.exists(digest.blob_key())
    }

    /// Reads archived content back and checks it against its digest
    pub fn retrieve(&self, digest: &ContentDigest) -> BlobResult<Vec<u8>> {
        let data = self.store.get(digest.blob_key())?;
        if !digest.verify(&data) {
            return Err(BlobError::Corrupt {
                key: digest.blob_key().to_string(),
            });
        }
        Ok(data)
    }

    /// Deletes archived content; store failures are returned to the caller
    pub fn remove(&self, digest: &ContentDigest) -> BlobResult<()> {
        self.store.delete(digest.blob_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::store::MemoryBlobStore;

    fn archiver() -> (Arc<MemoryBlobStore>, Archiver) {
        let store = Arc::new(MemoryBlobStore::new());
        let archiver = Archiver::new(store.clone());
        (store, archiver)
    }

    /// Store whose writes and deletes always fail
    struct BrokenStore;

    impl BlobStore for BrokenStore {
        fn exists(&self, _key: &str) -> BlobResult<bool> {
            Ok(true)
        }

        fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
            Ok(key.as_bytes().to_vec())
        }

        fn put(&self, _key: &str, _data: &[u8]) -> BlobResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "read-only").into())
        }

        fn delete(&self, _key: &str) -> BlobResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }
    }

    #[test]
    fn test_archive_new_content() {
        let (store, archiver) = archiver();

        let archived = archiver.archive(b"<html>one</html>").unwrap();
        assert!(archived.stored);
        assert_eq!(archived.size, 16);
        assert_eq!(store.len(), 1);
        assert_eq!(store.keys()[0], archived.digest.blob_key());
    }

    #[test]
    fn test_identical_content_stored_once() {
        let (store, archiver) = archiver();

        let first = archiver.archive(b"same bytes").unwrap();
        let second = archiver.archive(b"same bytes").unwrap();

        assert!(first.stored);
        assert!(!second.stored);
        assert_eq!(first.digest, second.digest);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_content_rejected() {
        let (store, archiver) = archiver();
        assert!(matches!(archiver.archive(b""), Err(BlobError::EmptyContent)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_retrieve_verifies_content() {
        let (_store, archiver) = archiver();
        let archived = archiver.archive(b"payload").unwrap();

        assert!(archiver.contains(&archived.digest).unwrap());
        assert_eq!(archiver.retrieve(&archived.digest).unwrap(), b"payload");

        let corrupt = Archiver::new(Arc::new(BrokenStore));
        assert!(matches!(
            corrupt.retrieve(&archived.digest),
            Err(BlobError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_retrieve_missing() {
        let (_store, archiver) = archiver();
        let digest = ContentDigest::compute(b"never stored");
        assert!(matches!(
            archiver.retrieve(&digest),
            Err(BlobError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove() {
        let (store, archiver) = archiver();
        let archived = archiver.archive(b"to delete").unwrap();

        archiver.remove(&archived.digest).unwrap();
        assert!(store.is_empty());
        archiver.remove(&archived.digest).unwrap();
    }

    #[test]
    fn test_remove_propagates_store_errors() {
        let archiver = Archiver::new(Arc::new(BrokenStore));
        let digest = ContentDigest::compute(b"anything");
        assert!(matches!(archiver.remove(&digest), Err(BlobError::Io(_))));
    }

    #[test]
    fn test_existing_blob_skips_put() {
        // BrokenStore reports every key as present, so put is never reached
        let archiver = Archiver::new(Arc::new(BrokenStore));
        let archived = archiver.archive(b"already there").unwrap();
        assert!(!archived.stored);
    }
}
