//! Content identifiers for immutable DAG blocks.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The byte length of a content identifier.
pub const CID_LEN: usize = 32;

/// A content identifier: the SHA-256 digest of an immutable block.
///
/// Two blocks with the same bytes always have the same CID, which is what
/// makes the block store content-addressed.
///
/// # Example
///
/// ```
/// use vellum_core::Cid;
///
/// let a = Cid::hash(b"delta");
/// let b = Cid::hash(b"delta");
/// assert_eq!(a, b);
/// assert_ne!(a, Cid::hash(b"other"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cid([u8; CID_LEN]);

impl Cid {
    /// Computes the CID of a block's bytes.
    #[must_use]
    pub fn hash(block: &[u8]) -> Self {
        let digest = Sha256::digest(block);
        let mut bytes = [0u8; CID_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Wraps raw digest bytes as a CID.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; CID_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a CID from a byte slice, returning `None` on length mismatch.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; CID_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Returns the digest bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CID_LEN] {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
