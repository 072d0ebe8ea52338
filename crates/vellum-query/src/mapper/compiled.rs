//! The index-keyed compiled query model the planner consumes.

use vellum_core::{Cid, DocKey};

use crate::filter::Filter;
use crate::request::{AggregateKind, CommitQueryKind, OrderDirection};

use super::arena::{MappingArena, MappingId};

/// A compiled select query: the root select plus the mapping arena every
/// nested scope lives in.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Storage for every mapping of the query.
    pub arena: MappingArena,
    /// The root select.
    pub root: Select,
}

/// A compiled top-level commit query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCommitQuery {
    /// Storage for the commit mapping.
    pub arena: MappingArena,
    /// The commit select.
    pub root: CommitSelect,
}

/// A field's position in its parent mapping, with the schema name it was
/// resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// The document index in the parent mapping.
    pub index: usize,
    /// The schema (or synthetic) field name.
    pub name: String,
}

/// One compiled child of a select.
#[derive(Debug, Clone, PartialEq)]
pub enum Requestable {
    /// A scalar field.
    Field(Field),
    /// A nested select (relation or group child).
    Select(Box<Select>),
    /// An aggregate with resolved targets and dependencies.
    Aggregate(Box<Aggregate>),
    /// A commit history child or query.
    CommitSelect(Box<CommitSelect>),
}

impl Requestable {
    /// The document index this child writes to in the parent mapping.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Field(f) => f.index,
            Self::Select(s) => s.field.index,
            Self::Aggregate(a) => a.field.index,
            Self::CommitSelect(c) => c.field.index,
        }
    }
}

/// A compiled select scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Position in the parent mapping. For the root select the index is
    /// unused and the name is the collection name.
    pub field: Field,
    /// The collection this select reads.
    pub collection: String,
    /// The mapping for documents of this scope.
    pub mapping: MappingId,
    /// Filter over documents of this scope.
    pub filter: Option<Filter>,
    /// Ordering applied after filtering.
    pub order: Option<OrderBy>,
    /// Limit/offset applied last.
    pub limit: Option<Limit>,
    /// Grouping applied to this scope's documents.
    pub group_by: Option<GroupBy>,
    /// The compiled children, in resolution order. Aggregate
    /// dependencies are appended after the fields that need them.
    pub fields: Vec<Requestable>,
}

/// Row limit and offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    /// Maximum rows to yield; `None` means unbounded (offset only).
    pub limit: Option<u64>,
    /// Rows to skip first.
    pub offset: u64,
}

/// Compiled ordering: conditions are applied in declared sequence, the
/// first non-equal comparison decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The ordering conditions, outermost first.
    pub conditions: Vec<OrderCondition>,
}

/// One ordering condition: an index path descending through child
/// documents, and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCondition {
    /// Document indices, one per path segment.
    pub fields: Vec<usize>,
    /// Ascending or descending.
    pub direction: OrderDirection,
}

/// Compiled grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBy {
    /// The key fields, ancestors first.
    pub fields: Vec<GroupByField>,
}

/// One group-by key field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupByField {
    /// The document index of the key field.
    pub index: usize,
    /// The field name, used in the composite group key.
    pub name: String,
}

/// A compiled aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Position and synthetic name (`_count`, `_sum`, ...) in the host
    /// mapping.
    pub field: Field,
    /// What to compute.
    pub kind: AggregateKind,
    /// The aggregated targets.
    pub targets: Vec<AggregateTarget>,
    /// Sibling aggregates this one reads instead of recomputing
    /// (average reads a sum and a count).
    pub dependencies: Vec<AggregateDependency>,
    /// Whether the result is float-typed, decided at compile time by
    /// walking the contributing field kinds.
    pub float_result: bool,
}

/// One resolved aggregate target.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateTarget {
    /// The index of the hosting slot (a relation child list, a group
    /// child list, or a scalar array).
    pub host_index: usize,
    /// The index of the aggregated field within the host's child
    /// mapping; `None` counts elements or sums a scalar array directly.
    pub child_index: Option<usize>,
    /// Filter applied to elements before aggregation, compiled against
    /// the host's child mapping.
    pub filter: Option<Filter>,
}

/// A dependency edge from one aggregate to a sibling it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateDependency {
    /// The dependency's aggregate kind.
    pub kind: AggregateKind,
    /// The document index the dependency writes to.
    pub index: usize,
}

/// A compiled commit query, either standalone or as a `_version` child.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitSelect {
    /// Position in the parent mapping; for standalone queries the index
    /// is unused.
    pub field: Field,
    /// The document whose history is read. `None` when the key is taken
    /// from the enclosing document at execution time.
    pub doc_key: Option<DocKey>,
    /// The field whose register history is read; `None` targets the
    /// composite document register.
    pub field_name: Option<String>,
    /// An explicit commit to fetch.
    pub cid: Option<Cid>,
    /// Which commits to return.
    pub kind: CommitQueryKind,
    /// The commit document mapping (`cid`, `height`, `delta`, `links`).
    pub mapping: MappingId,
}
