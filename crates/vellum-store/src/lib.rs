//! Vellum Store
//!
//! This crate defines the datastore interfaces the query engine executes
//! against:
//!
//! - [`Transaction`] - scoped accessor over the primary keyspace and the
//!   content-addressed block store, held for the lifetime of one plan
//!   execution
//! - [`DocumentFetcher`] - yields raw document rows in key order within a
//!   set of spans
//! - [`HeadFetcher`] - yields the current head CIDs for a document/field
//!
//! The engine treats all of these as synchronous calls; blocking I/O,
//! timeouts and retries are the implementation's responsibility.
//!
//! An in-memory reference implementation ([`MemoryStore`]) backs the test
//! suites and embedded hosts.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use memory::{MemoryStore, MemoryTransaction};
pub use traits::{DocumentFetcher, HeadFetcher, Transaction};
