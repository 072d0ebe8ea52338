//! Aggregate target resolution and dependency injection.
//!
//! An aggregate names a host (a relation, `_group`, or a scalar array),
//! optionally a child field within it, and optionally a filter over the
//! aggregated elements. Resolution reuses an existing child scope when
//! one fits, synthesizes a hidden one otherwise, and appends the sibling
//! aggregates a kind depends on (average reads a sum and a count) so
//! they execute before their dependent.

use vellum_core::{CollectionDescription, Value};

use crate::error::{QueryError, QueryResult};
use crate::filter::{Conditions, Filter, FilterKey, FilterValue, Operator};
use crate::request::{AggregateKind, AggregateRequest, AggregateTargetRequest, GROUP_FIELD};

use super::arena::{MappingArena, MappingId};
use super::compile::{self, Schema};
use super::compiled::{Aggregate, AggregateDependency, AggregateTarget, Field, Requestable};

/// The sibling aggregates each kind reads instead of recomputing.
const fn dependencies_of(kind: AggregateKind) -> &'static [AggregateKind] {
    match kind {
        AggregateKind::Average => &[AggregateKind::Sum, AggregateKind::Count],
        AggregateKind::Count
        | AggregateKind::Sum
        | AggregateKind::Min
        | AggregateKind::Max => &[],
    }
}

pub(super) fn resolve(
    schema: &Schema,
    arena: &mut MappingArena,
    mapping: MappingId,
    desc: &CollectionDescription,
    fields: &mut Vec<Requestable>,
    request: &AggregateRequest,
) -> QueryResult<Aggregate> {
    if request.targets.is_empty() {
        return Err(QueryError::AggregateWithoutTarget(request.kind.as_str().to_owned()));
    }

    let mut targets = Vec::with_capacity(request.targets.len());
    let mut any_float = false;
    for target in &request.targets {
        targets.push(resolve_target(
            schema,
            arena,
            mapping,
            desc,
            fields,
            request.kind,
            target,
            &mut any_float,
        )?);
    }

    // Dependencies share the resolved targets, so a sum and a count feeding
    // an average always see the same elements.
    let mut dependencies = Vec::new();
    for dep_kind in dependencies_of(request.kind) {
        let index = resolve_dependency(arena, mapping, fields, *dep_kind, &targets, any_float);
        dependencies.push(AggregateDependency { kind: *dep_kind, index });
    }

    let index = arena.get_mut(mapping).add(request.kind.as_str());
    Ok(Aggregate {
        field: Field { index, name: request.kind.as_str().to_owned() },
        kind: request.kind,
        targets,
        dependencies,
        float_result: any_float || request.kind == AggregateKind::Average,
    })
}

#[allow(clippy::too_many_arguments)]
fn resolve_target(
    schema: &Schema,
    arena: &mut MappingArena,
    mapping: MappingId,
    desc: &CollectionDescription,
    fields: &mut Vec<Requestable>,
    kind: AggregateKind,
    request: &AggregateTargetRequest,
    any_float: &mut bool,
) -> QueryResult<AggregateTarget> {
    let host_name = request.host.as_str();

    // Scalar-array hosts aggregate their elements directly.
    if let Some(field) = desc.field(host_name) {
        if field.kind.is_scalar_array() {
            if request.child.is_some() {
                return Err(QueryError::InvalidRequest(format!(
                    "{} over scalar array {host_name} cannot name a child field",
                    kind.as_str()
                )));
            }
            if request.filter.is_some() {
                return Err(QueryError::InvalidRequest(format!(
                    "filters on scalar-array target {host_name} are not supported"
                )));
            }
            if field.kind.is_float() {
                *any_float = true;
            }
            let host_index = arena
                .get(mapping)
                .first_index_of(host_name)
                .ok_or_else(|| compile::unknown_field(host_name, &desc.name))?;
            return Ok(AggregateTarget { host_index, child_index: None, filter: None });
        }
    }

    let is_group = host_name == GROUP_FIELD;
    if !is_group {
        // Validates the host is a relation before any mapping changes.
        compile::relation_target(desc, host_name)?;
    }

    // Every index already mapped under the host name that carries a child
    // scope is a reuse candidate.
    let mut candidates: Vec<(usize, MappingId)> = {
        let m = arena.get(mapping);
        m.indexes_of(host_name)
            .iter()
            .filter_map(|&i| m.child(i).map(|c| (i, c)))
            .collect()
    };
    if candidates.is_empty() {
        let synthesized = if is_group {
            compile::synthesize_group_child(arena, mapping, desc)
        } else {
            compile::synthesize_child_select(schema, arena, mapping, desc, fields, host_name)?
        };
        candidates.push(synthesized);
    }

    let child_desc = if is_group {
        desc
    } else {
        let target = compile::relation_target(desc, host_name)?;
        schema.collection(&target)?
    };

    // Same-collection scopes share their scalar layout, so a filter
    // compiled against one candidate applies to any of them.
    let scope_mapping = candidates[0].1;
    let mut filter = match &request.filter {
        Some(f) => {
            let compiled =
                compile::compile_filter_scoped(schema, arena, scope_mapping, child_desc, f)?;
            if compiled.is_empty() { None } else { Some(compiled) }
        }
        None => None,
    };

    let child_index = match &request.child {
        Some(name) => {
            let index = arena
                .get(scope_mapping)
                .first_index_of(name)
                .ok_or_else(|| compile::unknown_field(name, &child_desc.name))?;
            if let Some(field) = child_desc.field(name) {
                if field.kind.is_float() {
                    *any_float = true;
                }
            }
            Some(index)
        }
        None => {
            if kind.is_value_bearing() {
                return Err(QueryError::InvalidRequest(format!(
                    "{} over {host_name} requires a child field",
                    kind.as_str()
                )));
            }
            None
        }
    };

    // Null child values never contribute to a value-bearing aggregate.
    if kind.is_value_bearing() {
        if let Some(index) = child_index {
            inject_not_null(filter.get_or_insert_with(Filter::default), index);
        }
    }

    let chosen = candidates
        .iter()
        .find(|(i, _)| select_filter(fields, *i) == filter.as_ref())
        .or_else(|| candidates.iter().find(|(i, _)| select_filter(fields, *i).is_none()))
        .copied();
    let (host_index, _) = match chosen {
        Some(candidate) => candidate,
        // Every candidate scope carries its own filter; aggregate over a
        // fresh hidden one instead.
        None if is_group => compile::synthesize_group_child(arena, mapping, desc),
        None => {
            compile::synthesize_child_select(schema, arena, mapping, desc, fields, host_name)?
        }
    };

    Ok(AggregateTarget { host_index, child_index, filter })
}

/// The compiled filter of the select hosted at `index`, if one exists.
fn select_filter(fields: &[Requestable], index: usize) -> Option<&Filter> {
    fields.iter().find_map(|f| match f {
        Requestable::Select(s) if s.field.index == index => s.filter.as_ref(),
        _ => None,
    })
}

/// Adds a `_ne: null` condition on `index`, preserving any conditions
/// already constraining it.
fn inject_not_null(filter: &mut Filter, index: usize) {
    let entry = filter
        .conditions
        .entry(FilterKey::Index(index))
        .or_insert_with(|| FilterValue::Conditions(Conditions::new()));
    if let FilterValue::Conditions(conditions) = entry {
        conditions
            .entry(FilterKey::Operator(Operator::Ne))
            .or_insert(FilterValue::Value(Value::Null));
    }
    // An implicit equality entry already excludes null; leave it alone.
}

/// Reuses a sibling aggregate with identical targets, or appends a
/// hidden one.
fn resolve_dependency(
    arena: &mut MappingArena,
    mapping: MappingId,
    fields: &mut Vec<Requestable>,
    kind: AggregateKind,
    targets: &[AggregateTarget],
    any_float: bool,
) -> usize {
    for existing in fields.iter() {
        if let Requestable::Aggregate(aggregate) = existing {
            if aggregate.kind == kind && aggregate.targets == *targets {
                return aggregate.field.index;
            }
        }
    }
    let index = arena.get_mut(mapping).add(kind.as_str());
    fields.push(Requestable::Aggregate(Box::new(Aggregate {
        field: Field { index, name: kind.as_str().to_owned() },
        kind,
        targets: targets.to_vec(),
        dependencies: Vec::new(),
        float_result: kind != AggregateKind::Count && any_float,
    })));
    index
}

#[cfg(test)]
mod tests {
    use vellum_core::{FieldDescription, FieldKind, RelationDescription, RelationKind};

    use super::*;
    use crate::mapper::compile_select;
    use crate::request::{FilterRequest, SelectRequest};

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema.add(CollectionDescription::new(
            "Author",
            1,
            vec![
                FieldDescription::scalar("name", 1, FieldKind::String),
                FieldDescription::scalar("age", 2, FieldKind::Int),
                FieldDescription::scalar("scores", 3, FieldKind::FloatArray),
                FieldDescription::object(
                    "published",
                    4,
                    FieldKind::ObjectArray,
                    RelationDescription {
                        name: "author_book".to_owned(),
                        target_collection: "Book".to_owned(),
                        kind: RelationKind::OneToMany,
                        primary: false,
                    },
                ),
            ],
        ));
        schema.add(CollectionDescription::new(
            "Book",
            2,
            vec![
                FieldDescription::scalar("name", 1, FieldKind::String),
                FieldDescription::scalar("rating", 2, FieldKind::Float),
                FieldDescription::scalar("author_id", 3, FieldKind::String),
            ],
        ));
        schema
    }

    fn find_aggregate(
        fields: &[Requestable],
        kind: AggregateKind,
    ) -> Option<&Aggregate> {
        fields.iter().find_map(|f| match f {
            Requestable::Aggregate(a) if a.kind == kind => Some(a.as_ref()),
            _ => None,
        })
    }

    #[test]
    fn average_injects_sum_and_count_dependencies() {
        let request = SelectRequest::new("Author").aggregate(
            AggregateRequest::new(AggregateKind::Average, "published").on_child("rating"),
        );
        let compiled = compile_select(&schema(), &request).unwrap();
        let fields = &compiled.root.fields;

        let average = find_aggregate(fields, AggregateKind::Average).expect("average");
        let sum = find_aggregate(fields, AggregateKind::Sum).expect("hidden sum");
        let count = find_aggregate(fields, AggregateKind::Count).expect("hidden count");

        assert_eq!(average.dependencies.len(), 2);
        assert_eq!(average.dependencies[0].index, sum.field.index);
        assert_eq!(average.dependencies[1].index, count.field.index);
        assert!(average.float_result);
        // Dependencies see exactly the elements the average does.
        assert_eq!(sum.targets, average.targets);
        assert_eq!(count.targets, average.targets);
        // Dependencies come before their dependent so they execute first.
        let avg_pos = fields
            .iter()
            .position(|f| matches!(f, Requestable::Aggregate(a) if a.kind == AggregateKind::Average))
            .unwrap();
        let sum_pos = fields
            .iter()
            .position(|f| matches!(f, Requestable::Aggregate(a) if a.kind == AggregateKind::Sum))
            .unwrap();
        assert!(sum_pos < avg_pos);
    }

    #[test]
    fn value_aggregates_exclude_null_children() {
        let request = SelectRequest::new("Author").aggregate(
            AggregateRequest::new(AggregateKind::Sum, "published").on_child("rating"),
        );
        let compiled = compile_select(&schema(), &request).unwrap();
        let sum = find_aggregate(&compiled.root.fields, AggregateKind::Sum).unwrap();
        let filter = sum.targets[0].filter.as_ref().expect("injected filter");

        let child_index = sum.targets[0].child_index.unwrap();
        match filter.conditions.get(&FilterKey::Index(child_index)) {
            Some(FilterValue::Conditions(conditions)) => {
                assert_eq!(
                    conditions.get(&FilterKey::Operator(Operator::Ne)),
                    Some(&FilterValue::Value(Value::Null))
                );
            }
            other => panic!("expected injected conditions, got {other:?}"),
        }
    }

    #[test]
    fn user_sum_is_reused_as_average_dependency() {
        let request = SelectRequest::new("Author")
            .aggregate(AggregateRequest::new(AggregateKind::Sum, "published").on_child("rating"))
            .aggregate(
                AggregateRequest::new(AggregateKind::Average, "published").on_child("rating"),
            );
        let compiled = compile_select(&schema(), &request).unwrap();
        let fields = &compiled.root.fields;

        let sums: Vec<_> = fields
            .iter()
            .filter(|f| matches!(f, Requestable::Aggregate(a) if a.kind == AggregateKind::Sum))
            .collect();
        assert_eq!(sums.len(), 1, "the requested sum doubles as the dependency");

        let average = find_aggregate(fields, AggregateKind::Average).unwrap();
        let sum = find_aggregate(fields, AggregateKind::Sum).unwrap();
        assert_eq!(average.dependencies[0].index, sum.field.index);
    }

    #[test]
    fn count_over_rendered_join_reuses_the_host() {
        let request = SelectRequest::new("Author")
            .child(SelectRequest::new("published").field("rating"))
            .aggregate(
                AggregateRequest::new(AggregateKind::Count, "published")
                    .filtered(FilterRequest::new().op("rating", "_gt", 4.6f64)),
            );
        let compiled = compile_select(&schema(), &request).unwrap();
        let fields = &compiled.root.fields;

        let selects: Vec<_> = fields
            .iter()
            .filter(|f| matches!(f, Requestable::Select(s) if s.field.name == "published"))
            .collect();
        assert_eq!(selects.len(), 1, "the rendered join hosts the count");

        let count = find_aggregate(fields, AggregateKind::Count).unwrap();
        let Requestable::Select(select) = selects[0] else { unreachable!() };
        assert_eq!(count.targets[0].host_index, select.field.index);
        // The count keeps its filter; the rendered children stay unfiltered.
        assert!(count.targets[0].filter.is_some());
        assert!(select.filter.is_none());
    }

    #[test]
    fn scalar_array_targets_aggregate_directly() {
        let request = SelectRequest::new("Author")
            .aggregate(AggregateRequest::new(AggregateKind::Sum, "scores"));
        let compiled = compile_select(&schema(), &request).unwrap();
        let sum = find_aggregate(&compiled.root.fields, AggregateKind::Sum).unwrap();
        assert!(sum.float_result);
        assert_eq!(sum.targets[0].child_index, None);
        assert!(sum.targets[0].filter.is_none());
    }

    #[test]
    fn aggregate_without_target_is_rejected() {
        let request = SelectRequest::new("Author").aggregate(AggregateRequest {
            kind: AggregateKind::Count,
            alias: None,
            targets: Vec::new(),
        });
        assert!(matches!(
            compile_select(&schema(), &request),
            Err(QueryError::AggregateWithoutTarget(_))
        ));
    }

    #[test]
    fn group_aggregates_synthesize_a_hidden_group_scope() {
        let request = SelectRequest::new("Author")
            .grouped_by(&["age"])
            .field("age")
            .aggregate(AggregateRequest::new(AggregateKind::Count, GROUP_FIELD));
        let compiled = compile_select(&schema(), &request).unwrap();
        let count = find_aggregate(&compiled.root.fields, AggregateKind::Count).unwrap();

        let mapping = compiled.arena.get(compiled.root.mapping);
        assert_eq!(mapping.first_index_of(GROUP_FIELD), Some(count.targets[0].host_index));
        assert!(mapping.child(count.targets[0].host_index).is_some());
        // The hidden scope renders nothing.
        assert!(mapping.render_keys().iter().all(|rk| rk.key != GROUP_FIELD));
    }
}
