//! Vellum Core
//!
//! This crate provides the fundamental types shared across the Vellum
//! query engine:
//!
//! - **Values**: the [`Value`] enum storable in document fields
//! - **Identifiers**: [`DocKey`] for documents, [`Cid`] for immutable blocks
//! - **Schema metadata**: [`CollectionDescription`] and [`FieldDescription`],
//!   consulted by the planner to choose join strategies and result types
//! - **Spans**: [`Span`] half-open key ranges scoping what a scan reads
//! - **Key encoding**: order-preserving keys for the primary and head
//!   keyspaces
//! - **Commit blocks**: [`Commit`] and [`CommitLink`], the decoded form of
//!   a MerkleCRDT DAG node
//!
//! # Example
//!
//! ```
//! use vellum_core::{DocKey, Value};
//!
//! let key = DocKey::new("bae-author-1");
//! let name: Value = "Grisham".into();
//! let age: Value = 327i64.into();
//!
//! assert_eq!(key.as_str(), "bae-author-1");
//! assert_eq!(name.as_str(), Some("Grisham"));
//! assert_eq!(age.as_int(), Some(327));
//! ```

pub mod cid;
pub mod commit;
pub mod error;
pub mod keys;
pub mod schema;
pub mod span;
pub mod types;

pub use cid::Cid;
pub use commit::{Commit, CommitLink};
pub use error::CoreError;
pub use schema::{
    CollectionDescription, FieldDescription, FieldKind, IndexDescription, RelationDescription,
    RelationKind,
};
pub use span::{HeadSpan, Span, Spans};
pub use types::{DocKey, Value};
