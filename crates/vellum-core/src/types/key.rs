//! Document key type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A stable, content-independent identifier for a document.
///
/// Document keys sort lexicographically, which determines the order rows
/// come back from a primary-index scan.
///
/// # Example
///
/// ```
/// use vellum_core::DocKey;
///
/// let key = DocKey::new("bae-123");
/// assert_eq!(key.as_str(), "bae-123");
/// assert_eq!(key.to_string(), "bae-123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocKey(String);

impl DocKey {
    /// Creates a document key from a string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key bytes, as they appear inside storage keys.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for DocKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}
