//! Content archive for fetched response bodies
//!
//! This module handles:
//! - Computing self-describing content digests (SHA-256 multihash)
//! - Content-addressed blob storage behind the [`BlobStore`] trait
//! - Deduplicated archiving: bytes are written only when their key is absent

mod archiver;
mod digest;
mod store;

pub use archiver::{ArchivedContent, Archiver};
pub use digest::{ContentDigest, MULTIHASH_PREFIX};
pub use store::{BlobError, BlobResult, BlobStore, FsBlobStore, MemoryBlobStore};
