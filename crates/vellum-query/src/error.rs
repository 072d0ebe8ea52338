//! Error types for query compilation and execution.

use thiserror::Error;
use vellum_core::CoreError;
use vellum_store::StoreError;

/// Errors that can occur while compiling or executing a query.
///
/// Configuration errors surface at plan-construction time and are never
/// retried. Fetch and decode errors propagate unchanged through `next()`;
/// the engine treats them as fatal to the current query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A requested field does not exist on the collection and cannot be
    /// synthesized.
    #[error("unknown field {name} on collection {collection}")]
    UnknownField {
        /// The requested field name.
        name: String,
        /// The collection it was requested on.
        collection: String,
    },

    /// No description exists for the named collection.
    #[error("missing collection description: {0}")]
    MissingCollection(String),

    /// An aggregate request carried no target.
    #[error("aggregate {0} has no target")]
    AggregateWithoutTarget(String),

    /// A filter argument had an invalid shape or type.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// An unknown aggregate or operator name.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// A request had an invalid shape: a bad order path, grouping by a
    /// relation, a commit query without its cid, and the like.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A filter comparison met an unexpected value type.
    #[error("cannot compare {left} with {right}")]
    TypeMismatch {
        /// Type name of the document-side value.
        left: &'static str,
        /// Type name of the filter-side value.
        right: &'static str,
    },

    /// An error from the core type layer (block decoding, key encoding).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An error from the datastore collaborator.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
