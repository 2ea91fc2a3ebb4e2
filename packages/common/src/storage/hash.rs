use std::fmt;

use sha2::{Digest, Sha256};

use super::error::StorageError;

/// SHA-256 digest addressing a stored image.
///
/// Uploads are stored under their content hash, so identical images dedup to
/// a single blob and the hash doubles as a strong ETag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash the given bytes.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Parse a 64-character lowercase hex digest.
    pub fn from_hex(s: &str) -> Result<Self, StorageError> {
        let bytes = hex::decode(s)
            .map_err(|e| StorageError::InvalidHash(format!("invalid hex: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StorageError::InvalidHash(format!("expected 64 hex characters, got {}", s.len())))?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Split into a two-character directory shard and the rest of the digest,
    /// for the on-disk layout.
    pub(crate) fn shard(&self) -> (String, String) {
        (hex::encode(&self.0[..1]), hex::encode(&self.0[1..]))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
