//! Self-describing content digests
//!
//! A digest is the hex encoding of a multihash: one byte naming the hash
//! function (`0x12`, sha2-256), one byte with the digest length (`0x20`), then
//! the digest itself. Every digest therefore starts with `"1220"`; the blob
//! key is what remains once that prefix is stripped.

use crate::archive::store::BlobError;
use sha2::{Digest, Sha256};
use std::fmt;

/// Multihash function code for sha2-256
const SHA2_256_CODE: u8 = 0x12;

/// Length in bytes of a sha2-256 digest
const SHA2_256_LEN: u8 = 0x20;

/// Hex prefix shared by every sha2-256 multihash
pub const MULTIHASH_PREFIX: &str = "1220";

/// Hex length of a full digest (prefix + 32 bytes)
const DIGEST_HEX_LEN: usize = MULTIHASH_PREFIX.len() + 2 * SHA2_256_LEN as usize;

/// Content hash in self-describing (multihash) form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Hashes the exact bytes given
    ///
    /// # Examples
    ///
    /// ```
    /// use tidemark::archive::ContentDigest;
    ///
    /// let digest = ContentDigest::compute(b"hello world");
    /// assert!(digest.as_str().starts_with("1220"));
    /// assert_eq!(digest.blob_key().len(), 64);
    /// ```
    pub fn compute(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);

        let mut multihash = Vec::with_capacity(2 + hash.len());
        multihash.push(SHA2_256_CODE);
        multihash.push(SHA2_256_LEN);
        multihash.extend_from_slice(&hash);

        Self(hex::encode(multihash))
    }

    /// Parses a hex multihash string, as stored on snapshots
    pub fn parse(value: &str) -> Result<Self, BlobError> {
        let value = value.trim().to_ascii_lowercase();

        if value.len() != DIGEST_HEX_LEN || !value.starts_with(MULTIHASH_PREFIX) {
            return Err(BlobError::InvalidDigest(value));
        }

        if hex::decode(&value).is_err() {
            return Err(BlobError::InvalidDigest(value));
        }

        Ok(Self(value))
    }

    /// Rebuilds a digest from a blob key (a plain sha256 hex string)
    pub fn from_blob_key(key: &str) -> Result<Self, BlobError> {
        Self::parse(&format!("{}{}", MULTIHASH_PREFIX, key))
    }

    /// Full multihash in hex
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key: the digest with the algorithm prefix stripped
    pub fn blob_key(&self) -> &str {
        &self.0[MULTIHASH_PREFIX.len()..]
    }

    /// Returns true if `data` hashes to this digest
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
