//! Core datastore traits.
//!
//! This module defines the collaborator interfaces the query engine
//! consumes:
//!
//! - [`Transaction`] - the scoped accessor a whole plan executes under
//! - [`DocumentFetcher`] - ordered row fetching within key spans
//! - [`HeadFetcher`] - head CID resolution for a document/field
//!
//! All traits are object-safe; the engine holds them behind `Arc`/`Box`
//! and never assumes a concrete backend.

use std::collections::HashMap;

use vellum_core::{
    Cid, CollectionDescription, DocKey, FieldDescription, IndexDescription, Span, Spans, Value,
};

use crate::error::StoreError;

/// A key-value pair returned by range reads.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// A transaction scoping one plan execution.
///
/// A transaction exposes the primary systemstore (ordered key-value data),
/// the content-addressed block store, and factories for the fetchers that
/// read them. The plan tree never manages transaction boundaries; commit
/// and rollback belong to the host.
pub trait Transaction {
    /// Point lookup in the primary keyspace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the read fails.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Ordered range read over the primary keyspace.
    ///
    /// Yields every pair whose key falls inside `span`, in key order, or
    /// reversed when `reverse` is set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the read fails.
    fn iterate(&self, span: &Span, reverse: bool) -> Result<Vec<KeyValue>, StoreError>;

    /// Fetches an immutable block from the content-addressed store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BlockNotFound`] if no block has this CID.
    fn get_block(&self, cid: &Cid) -> Result<Vec<u8>, StoreError>;

    /// Creates a document fetcher bound to this transaction's backend.
    fn document_fetcher(&self) -> Box<dyn DocumentFetcher>;

    /// Creates a head fetcher bound to this transaction's backend.
    fn head_fetcher(&self) -> Box<dyn HeadFetcher>;
}

/// Fetches indexed documents in key order within a set of spans.
///
/// # Lifecycle
///
/// 1. `init` with the collection, index and field selection
/// 2. `start` with the transaction and target spans
/// 3. `fetch_next_map` until it returns `None`
///
/// `init`/`start` may be called again to re-target the fetcher, e.g. for
/// a point re-lookup.
pub trait DocumentFetcher {
    /// Configures the fetcher for a collection and index.
    ///
    /// `fields` is the set of fields the caller wants decoded; `reverse`
    /// flips iteration to descending key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection/index pair is invalid for this
    /// backend.
    fn init(
        &mut self,
        collection: &CollectionDescription,
        index: &IndexDescription,
        fields: &[FieldDescription],
        reverse: bool,
    ) -> Result<(), StoreError>;

    /// Opens the fetcher over the given spans.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotStarted`] if `init` has not been called.
    fn start(&mut self, txn: &dyn Transaction, spans: &Spans) -> Result<(), StoreError>;

    /// Fetches the next raw row: the document key plus a name-keyed map of
    /// its decoded field values. Returns `None` when the spans are
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if a stored payload cannot be
    /// decoded.
    fn fetch_next_map(&mut self)
        -> Result<Option<(DocKey, HashMap<String, Value>)>, StoreError>;
}

/// Fetches the current head CIDs for a document/field composite key.
pub trait HeadFetcher {
    /// Opens the fetcher over one head-keyspace span.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the read fails.
    fn start(&mut self, txn: &dyn Transaction, span: &Span) -> Result<(), StoreError>;

    /// Fetches the next head CID, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if a head key is malformed.
    fn fetch_next(&mut self) -> Result<Option<Cid>, StoreError>;
}
