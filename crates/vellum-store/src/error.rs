//! Error types for store operations.

use thiserror::Error;

/// Errors that can occur in a datastore collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A requested block is not present in the content-addressed store.
    #[error("block not found: {0}")]
    BlockNotFound(String),

    /// A stored payload could not be decoded.
    #[error("corrupt store payload: {0}")]
    Corrupt(String),

    /// A fetcher was used before being initialized or started.
    #[error("fetcher used before {0}")]
    NotStarted(&'static str),

    /// A backend failure (I/O, transaction conflict, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}
