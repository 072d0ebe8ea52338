//! Compiled, index-keyed filters and the document matcher.
//!
//! Filters arrive name-keyed from the consumer; the mapping compiler
//! rewrites every field key to its document index so matching never
//! touches the mapping again. Structural equality on [`Filter`] is what
//! the aggregate resolver uses to decide whether two targets can share a
//! host field.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use vellum_core::Value;

use crate::error::{QueryError, QueryResult};
use crate::mapper::{Doc, DocValue};

/// The closed set of filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    /// `_eq`
    Eq,
    /// `_ne`
    Ne,
    /// `_gt`
    Gt,
    /// `_ge`
    Ge,
    /// `_lt`
    Lt,
    /// `_le`
    Le,
    /// `_in`
    In,
    /// `_nin`
    Nin,
    /// `_and`
    And,
    /// `_or`
    Or,
    /// `_not`
    Not,
}

impl Operator {
    /// Parses a consumer operator name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "_eq" => Some(Self::Eq),
            "_ne" => Some(Self::Ne),
            "_gt" => Some(Self::Gt),
            "_ge" => Some(Self::Ge),
            "_lt" => Some(Self::Lt),
            "_le" => Some(Self::Le),
            "_in" => Some(Self::In),
            "_nin" => Some(Self::Nin),
            "_and" => Some(Self::And),
            "_or" => Some(Self::Or),
            "_not" => Some(Self::Not),
            _ => None,
        }
    }

    /// The consumer-facing name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "_eq",
            Self::Ne => "_ne",
            Self::Gt => "_gt",
            Self::Ge => "_ge",
            Self::Lt => "_lt",
            Self::Le => "_le",
            Self::In => "_in",
            Self::Nin => "_nin",
            Self::And => "_and",
            Self::Or => "_or",
            Self::Not => "_not",
        }
    }
}

/// A key in a compiled condition map: either a document index or an
/// operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKey {
    /// A field, by document index.
    Index(usize),
    /// A logical or comparison operator.
    Operator(Operator),
}

/// A compiled condition value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// A scalar comparand.
    Value(Value),
    /// Nested conditions: operator conditions on a scalar field, or a
    /// sub-filter descending into a relation.
    Conditions(Conditions),
    /// A list: `_in`/`_nin` comparands or `_and`/`_or` clauses.
    List(Vec<FilterValue>),
}

/// A compiled condition map. Entries are conjoined.
pub type Conditions = BTreeMap<FilterKey, FilterValue>;

/// A compiled filter over one mapping scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    /// The root condition map.
    pub conditions: Conditions,
}

impl Filter {
    /// Creates a filter from compiled conditions.
    #[must_use]
    pub fn new(conditions: Conditions) -> Self {
        Self { conditions }
    }

    /// Returns true if the filter has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Inserts (or replaces) an equality condition on `index`. Used to
    /// push a foreign-key constraint into a child scan at join time.
    pub fn set_condition(&mut self, index: usize, value: Value) {
        self.conditions.insert(FilterKey::Index(index), FilterValue::Value(value));
    }

    /// Splits a filter around the relation at `index`: the entry keyed by
    /// the index becomes the child-side filter, everything else stays on
    /// the parent side. Either side may come back `None`.
    #[must_use]
    pub fn split_by_index(
        filter: Option<Filter>,
        index: usize,
    ) -> (Option<Filter>, Option<Filter>) {
        let Some(mut filter) = filter else {
            return (None, None);
        };
        let sub = match filter.conditions.remove(&FilterKey::Index(index)) {
            Some(FilterValue::Conditions(conditions)) => Some(Filter::new(conditions)),
            Some(other) => {
                // Non-map entries on a relation index cannot be pushed
                // down; keep them on the parent side.
                filter.conditions.insert(FilterKey::Index(index), other);
                None
            }
            None => None,
        };
        let root = if filter.conditions.is_empty() { None } else { Some(filter) };
        (root, sub)
    }

    /// Evaluates the filter against `doc`. Comparisons between
    /// incompatible types are an error, not a non-match.
    pub fn matches(&self, doc: &Doc) -> QueryResult<bool> {
        match_conditions(&self.conditions, doc)
    }
}

fn match_conditions(conditions: &Conditions, doc: &Doc) -> QueryResult<bool> {
    for (key, value) in conditions {
        let matched = match key {
            FilterKey::Operator(Operator::And) => match value {
                FilterValue::List(clauses) => {
                    let mut all = true;
                    for clause in clauses {
                        if !match_clause(clause, doc)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                _ => return Err(invalid("_and expects a list of conditions")),
            },
            FilterKey::Operator(Operator::Or) => match value {
                FilterValue::List(clauses) => {
                    let mut any = false;
                    for clause in clauses {
                        if match_clause(clause, doc)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                _ => return Err(invalid("_or expects a list of conditions")),
            },
            FilterKey::Operator(Operator::Not) => match value {
                FilterValue::Conditions(inner) => !match_conditions(inner, doc)?,
                _ => return Err(invalid("_not expects a condition map")),
            },
            FilterKey::Operator(op) => {
                return Err(invalid(format!(
                    "operator {} is not valid at document level",
                    op.as_str()
                )));
            }
            FilterKey::Index(index) => {
                let null = DocValue::Value(Value::Null);
                let field = doc.get(*index).unwrap_or(&null);
                match_field(field, value)?
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn match_clause(clause: &FilterValue, doc: &Doc) -> QueryResult<bool> {
    match clause {
        FilterValue::Conditions(conditions) => match_conditions(conditions, doc),
        _ => Err(invalid("logical clause must be a condition map")),
    }
}

fn match_field(field: &DocValue, value: &FilterValue) -> QueryResult<bool> {
    match (field, value) {
        // Implicit equality on a scalar slot.
        (DocValue::Value(actual), FilterValue::Value(expected)) => {
            compare_eq(actual, expected)
        }
        (DocValue::Value(actual), FilterValue::Conditions(conditions)) => {
            // An unloaded relation slot reads as null; a sub-filter that
            // descends by index cannot match it.
            if actual.is_null()
                && conditions.keys().any(|k| matches!(k, FilterKey::Index(_)))
            {
                return Ok(false);
            }
            apply_operators(conditions, actual)
        }
        (DocValue::Doc(doc), FilterValue::Conditions(conditions)) => {
            match_conditions(conditions, doc)
        }
        (DocValue::Docs(docs), FilterValue::Conditions(conditions)) => {
            for doc in docs {
                if match_conditions(conditions, doc)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        (DocValue::Docs(_) | DocValue::Doc(_), FilterValue::Value(_)) => {
            Err(invalid("cannot compare a relation against a scalar"))
        }
        (_, FilterValue::List(_)) => Err(invalid("a list is not valid as a field condition")),
    }
}

fn apply_operators(conditions: &Conditions, actual: &Value) -> QueryResult<bool> {
    for (key, operand) in conditions {
        let op = match key {
            FilterKey::Operator(op) => *op,
            FilterKey::Index(_) => {
                return Err(invalid("field condition nested under a scalar field"));
            }
        };
        let matched = match (op, operand) {
            (Operator::Eq, FilterValue::Value(expected)) => compare_eq(actual, expected)?,
            (Operator::Ne, FilterValue::Value(expected)) => !compare_eq(actual, expected)?,
            (Operator::Gt, FilterValue::Value(expected)) => {
                compare_ord(actual, expected)? == Ordering::Greater
            }
            (Operator::Ge, FilterValue::Value(expected)) => {
                compare_ord(actual, expected)? != Ordering::Less
            }
            (Operator::Lt, FilterValue::Value(expected)) => {
                compare_ord(actual, expected)? == Ordering::Less
            }
            (Operator::Le, FilterValue::Value(expected)) => {
                compare_ord(actual, expected)? != Ordering::Greater
            }
            (Operator::In, FilterValue::List(candidates)) => {
                contains(actual, candidates)?
            }
            (Operator::Nin, FilterValue::List(candidates)) => {
                !contains(actual, candidates)?
            }
            (Operator::Not, FilterValue::Conditions(inner)) => {
                !apply_operators(inner, actual)?
            }
            (op, _) => {
                return Err(invalid(format!("malformed operand for {}", op.as_str())));
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn contains(actual: &Value, candidates: &[FilterValue]) -> QueryResult<bool> {
    for candidate in candidates {
        let FilterValue::Value(expected) = candidate else {
            return Err(invalid("_in/_nin expect a list of scalars"));
        };
        if compare_eq(actual, expected)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn compare_eq(actual: &Value, expected: &Value) -> QueryResult<bool> {
    Ok(compare_ord(actual, expected)? == Ordering::Equal)
}

fn compare_ord(actual: &Value, expected: &Value) -> QueryResult<Ordering> {
    actual.compare(expected).ok_or(QueryError::TypeMismatch {
        left: actual.type_name(),
        right: expected.type_name(),
    })
}

fn invalid(message: impl Into<String>) -> QueryError {
    QueryError::InvalidFilter(message.into())
}
