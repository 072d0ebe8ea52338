//! The consumer-issued request model.
//!
//! Requests are name-keyed: fields, relations, aggregates and filters all
//! refer to schema names and requested aliases. The mapping compiler
//! (`mapper`) turns them into the index-keyed compiled form the planner
//! consumes. Parsing query text into these types is the host's concern;
//! every type here is serde-serializable so requests can cross a wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vellum_core::{Cid, Value};

/// Name of the synthetic group child field.
pub const GROUP_FIELD: &str = "_group";
/// Name of the synthetic version (commit history) child field.
pub const VERSION_FIELD: &str = "_version";

/// A select over a collection or relation.
///
/// At the top level `name` is the collection name; as a child it is the
/// relation field name (or [`GROUP_FIELD`]).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectRequest {
    /// Collection name (top level) or relation/group field name (child).
    pub name: String,
    /// Output alias; defaults to `name`.
    pub alias: Option<String>,
    /// Requested children.
    pub fields: Vec<RequestField>,
    /// Name-keyed filter conditions.
    pub filter: Option<FilterRequest>,
    /// Ordering conditions, outermost first.
    pub order: Vec<OrderInput>,
    /// Maximum rows to return.
    pub limit: Option<u64>,
    /// Rows to skip before returning any.
    pub offset: Option<u64>,
    /// Field names to group by.
    pub group_by: Vec<String>,
}

impl SelectRequest {
    /// Creates a select for a collection or relation field.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Adds a scalar field to the selection.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(RequestField::Field { name: name.into(), alias: None });
        self
    }

    /// Adds an aliased scalar field to the selection.
    #[must_use]
    pub fn field_as(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.fields.push(RequestField::Field { name: name.into(), alias: Some(alias.into()) });
        self
    }

    /// Adds a child select (relation or `_group`).
    #[must_use]
    pub fn child(mut self, select: SelectRequest) -> Self {
        self.fields.push(RequestField::Select(Box::new(select)));
        self
    }

    /// Adds an aggregate.
    #[must_use]
    pub fn aggregate(mut self, aggregate: AggregateRequest) -> Self {
        self.fields.push(RequestField::Aggregate(aggregate));
        self
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterRequest) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Adds an ordering condition.
    #[must_use]
    pub fn order_by(mut self, path: &[&str], direction: OrderDirection) -> Self {
        self.order.push(OrderInput {
            path: path.iter().map(|s| (*s).to_owned()).collect(),
            direction,
        });
        self
    }

    /// Sets the group-by fields.
    #[must_use]
    pub fn grouped_by(mut self, fields: &[&str]) -> Self {
        self.group_by = fields.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    /// Sets limit and offset.
    #[must_use]
    pub fn with_limit(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

/// One requested child of a select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestField {
    /// A scalar field by name.
    Field {
        /// The schema field name.
        name: String,
        /// Output alias; defaults to the name.
        alias: Option<String>,
    },
    /// A nested select over a relation or `_group`.
    Select(Box<SelectRequest>),
    /// An aggregate over a sibling field or relation.
    Aggregate(AggregateRequest),
    /// The commit history of the enclosing document (`_version`).
    Version(VersionRequest),
}

/// The closed set of aggregate kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    /// `_count`
    Count,
    /// `_sum`
    Sum,
    /// `_avg`
    Average,
    /// `_min`
    Min,
    /// `_max`
    Max,
}

impl AggregateKind {
    /// Parses a consumer aggregate name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "_count" => Some(Self::Count),
            "_sum" => Some(Self::Sum),
            "_avg" => Some(Self::Average),
            "_min" => Some(Self::Min),
            "_max" => Some(Self::Max),
            _ => None,
        }
    }

    /// The consumer-facing name of the aggregate.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "_count",
            Self::Sum => "_sum",
            Self::Average => "_avg",
            Self::Min => "_min",
            Self::Max => "_max",
        }
    }

    /// Returns true if the aggregate reads values off a child field (as
    /// opposed to counting elements).
    #[must_use]
    pub const fn is_value_bearing(self) -> bool {
        matches!(self, Self::Sum | Self::Average | Self::Min | Self::Max)
    }
}

/// A consumer aggregate request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    /// The aggregate kind.
    pub kind: AggregateKind,
    /// Output alias; defaults to the aggregate name.
    pub alias: Option<String>,
    /// The aggregated targets; at least one is required.
    pub targets: Vec<AggregateTargetRequest>,
}

impl AggregateRequest {
    /// Creates an aggregate over a single host field.
    #[must_use]
    pub fn new(kind: AggregateKind, host: impl Into<String>) -> Self {
        Self {
            kind,
            alias: None,
            targets: vec![AggregateTargetRequest {
                host: host.into(),
                child: None,
                filter: None,
            }],
        }
    }

    /// Sets the child field aggregated within the host.
    #[must_use]
    pub fn on_child(mut self, child: impl Into<String>) -> Self {
        if let Some(target) = self.targets.last_mut() {
            target.child = Some(child.into());
        }
        self
    }

    /// Sets the target filter.
    #[must_use]
    pub fn filtered(mut self, filter: FilterRequest) -> Self {
        if let Some(target) = self.targets.last_mut() {
            target.filter = Some(filter);
        }
        self
    }

    /// Sets the output alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// One target of an aggregate: a host field/relation, an optional child
/// field within it, and an optional filter on the aggregated elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateTargetRequest {
    /// The hosting field: a relation, `_group`, or a scalar array.
    pub host: String,
    /// The child field aggregated within the host.
    pub child: Option<String>,
    /// Filter applied to elements before aggregation.
    pub filter: Option<FilterRequest>,
}

/// A request for a document's commit history as a child field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRequest {
    /// Output alias; defaults to `_version`.
    pub alias: Option<String>,
    /// Which commits to return.
    pub kind: CommitQueryKind,
}

/// Which commits a version/commit query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitQueryKind {
    /// Only the highest commit (limit 1, height descending).
    Latest,
    /// The full history reachable from the heads.
    All,
    /// Exactly the named commit.
    One,
}

/// A top-level commit query over a document's DAG history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSelectRequest {
    /// The document whose history is queried.
    pub doc_key: String,
    /// The field whose history is queried; `None` targets the composite
    /// document register.
    pub field: Option<String>,
    /// An explicit commit to fetch (`kind` must be [`CommitQueryKind::One`]).
    pub cid: Option<Cid>,
    /// Which commits to return.
    pub kind: CommitQueryKind,
}

/// Name-keyed filter conditions, as issued by the consumer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterRequest {
    /// Conditions keyed by field name or `$operator` string.
    pub conditions: BTreeMap<String, ConditionValue>,
}

impl FilterRequest {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: ConditionValue) -> Self {
        self.conditions.insert(key.into(), value);
        self
    }

    /// Shorthand for an implicit-equality condition on a field.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, ConditionValue::Value(value.into()))
    }

    /// Shorthand for a single-operator condition on a field, e.g.
    /// `{rating: {_gt: 4.6}}`.
    #[must_use]
    pub fn op(
        self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Value>,
    ) -> Self {
        let mut inner = BTreeMap::new();
        inner.insert(operator.to_owned(), ConditionValue::Value(value.into()));
        self.with(field, ConditionValue::Sub(inner))
    }
}

/// One condition value in a consumer filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionValue {
    /// A scalar comparand (implicit equality when keyed by a field name).
    Value(Value),
    /// A nested condition map: operator conditions on a scalar, or a
    /// sub-filter on a relation.
    Sub(BTreeMap<String, ConditionValue>),
    /// A list: `_in`/`_nin` comparands or `_and`/`_or` clauses.
    List(Vec<ConditionValue>),
}

/// One ordering condition: a field path and a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInput {
    /// The field path, descending through relations.
    pub path: Vec<String>,
    /// Ascending or descending.
    pub direction: OrderDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_names() {
        assert_eq!(AggregateKind::parse("_avg"), Some(AggregateKind::Average));
        assert_eq!(AggregateKind::parse("_total"), None);
        assert_eq!(AggregateKind::Sum.as_str(), "_sum");
        assert!(AggregateKind::Min.is_value_bearing());
        assert!(!AggregateKind::Count.is_value_bearing());
    }

    #[test]
    fn builder_shapes() {
        let req = SelectRequest::new("Author")
            .field("name")
            .child(SelectRequest::new("published").field("rating"))
            .aggregate(AggregateRequest::new(AggregateKind::Count, "published"));
        assert_eq!(req.fields.len(), 3);
    }

    #[test]
    fn requests_round_trip_through_json() {
        let req = SelectRequest::new("Author")
            .field("name")
            .child(SelectRequest::new("published").field("rating"))
            .with_filter(FilterRequest::new().op("age", "_gt", 60i64))
            .order_by(&["name"], OrderDirection::Asc)
            .with_limit(10, 0);
        let json = serde_json::to_string(&req).unwrap();
        let back: SelectRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn filter_shorthand() {
        let filter = FilterRequest::new().op("rating", "_gt", 4.6f64);
        match filter.conditions.get("rating") {
            Some(ConditionValue::Sub(inner)) => {
                assert!(matches!(inner.get("_gt"), Some(ConditionValue::Value(_))));
            }
            other => panic!("unexpected condition: {other:?}"),
        }
    }
}
