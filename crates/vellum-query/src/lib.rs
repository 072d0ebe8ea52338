//! Vellum Query
//!
//! The query engine: compiles name-keyed select requests into
//! index-keyed plans and executes them as pull-based node pipelines over
//! a [`vellum_store::Transaction`].
//!
//! # Pipeline
//!
//! 1. [`mapper::compile_select`] resolves every requested name against
//!    the [`Schema`], producing a [`mapper::CompiledQuery`]: one
//!    [`mapper::DocumentMapping`] per select scope plus compiled
//!    filters, ordering, grouping and aggregates
//! 2. [`Planner::select`] builds the plan node tree
//! 3. [`Executor::next`] pulls documents and renders them name-keyed
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vellum_query::{Planner, Schema, SelectRequest};
//! # fn txn() -> Arc<dyn vellum_store::Transaction> { unimplemented!() }
//!
//! # fn main() -> Result<(), vellum_query::QueryError> {
//! let schema = Schema::new();
//! let planner = Planner::new(txn(), schema);
//! let mut executor = planner.select(&SelectRequest::new("Author").field("name"))?;
//! while let Some(doc) = executor.next()? {
//!     println!("{doc:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod filter;
pub mod mapper;
pub mod plan;
pub mod render;
pub mod request;

pub use error::{QueryError, QueryResult};
pub use mapper::Schema;
pub use plan::{Executor, Planner};
pub use render::{render, RenderValue, RenderedDoc};
pub use request::{
    AggregateKind, AggregateRequest, CommitQueryKind, CommitSelectRequest, ConditionValue,
    FilterRequest, OrderDirection, OrderInput, RequestField, SelectRequest, VersionRequest,
};
