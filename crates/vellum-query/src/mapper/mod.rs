//! The document-mapping compiler.
//!
//! This module turns name-keyed consumer requests into the index-keyed
//! compiled form the planner executes:
//!
//! - [`MappingArena`] / [`DocumentMapping`] - the name↔index resolution
//!   tables, arena-allocated so nested mappings link by id instead of
//!   deep-copying
//! - [`Doc`] - the fixed-width value container indexed by a mapping
//! - [`compile_select`] / [`compile_commits`] - the compiler entry points
//! - the aggregate target resolver, which reuses or synthesizes host
//!   fields and injects dependency aggregates (average needs sum and
//!   count)

mod aggregate;
mod arena;
mod compile;
mod compiled;
mod doc;
mod mapping;

pub use arena::{MappingArena, MappingId};
pub use compile::{
    compile_commits, compile_select, Schema, COMMIT_CID_FIELD, COMMIT_DELTA_FIELD,
    COMMIT_HEIGHT_FIELD, COMMIT_LINKS_FIELD, COMMIT_LINK_NAME_FIELD,
};
pub use compiled::{
    Aggregate, AggregateDependency, AggregateTarget, CommitSelect, CompiledCommitQuery,
    CompiledQuery, Field, GroupBy, GroupByField, Limit, OrderBy, OrderCondition, Requestable,
    Select,
};
pub use doc::{Doc, DocValue};
pub use mapping::{DocumentMapping, RenderKey, DOC_KEY_FIELD};
