//! The select compiler: name-keyed requests to index-keyed plans.
//!
//! Compilation resolves every requested field, filter key, order path
//! and group key against the collection schema, building one
//! [`DocumentMapping`](super::DocumentMapping) per select scope. Names
//! referenced by a filter, order or aggregate but never selected are
//! synthesized on demand: the compiler widens the mapping and, for
//! relations, appends a hidden child select so the join still loads the
//! documents the reference needs.

use std::collections::BTreeMap;

use vellum_core::{CollectionDescription, DocKey};

use crate::error::{QueryError, QueryResult};
use crate::filter::{Conditions, Filter, FilterKey, FilterValue, Operator};
use crate::request::{
    AggregateRequest, CommitQueryKind, CommitSelectRequest, ConditionValue, FilterRequest,
    OrderInput, RequestField, SelectRequest, GROUP_FIELD, VERSION_FIELD,
};

use super::aggregate;
use super::arena::{MappingArena, MappingId};
use super::compiled::{
    CommitSelect, CompiledCommitQuery, CompiledQuery, Field, GroupBy, GroupByField, Limit,
    OrderBy, OrderCondition, Requestable, Select,
};
use super::mapping::DOC_KEY_FIELD;

/// Field names of the commit document mapping.
pub const COMMIT_CID_FIELD: &str = "cid";
/// Commit height field name.
pub const COMMIT_HEIGHT_FIELD: &str = "height";
/// Commit delta payload field name.
pub const COMMIT_DELTA_FIELD: &str = "delta";
/// Commit links list field name.
pub const COMMIT_LINKS_FIELD: &str = "links";
/// Link name field within a commit's links.
pub const COMMIT_LINK_NAME_FIELD: &str = "name";

/// The collection catalog consulted during compilation.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    collections: BTreeMap<String, CollectionDescription>,
}

impl Schema {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collection description.
    pub fn add(&mut self, description: CollectionDescription) {
        self.collections.insert(description.name.clone(), description);
    }

    /// Looks up a collection by name.
    pub fn collection(&self, name: &str) -> QueryResult<&CollectionDescription> {
        self.collections
            .get(name)
            .ok_or_else(|| QueryError::MissingCollection(name.to_owned()))
    }
}

/// Compiles a select request against the schema.
pub fn compile_select(schema: &Schema, request: &SelectRequest) -> QueryResult<CompiledQuery> {
    let mut arena = MappingArena::new();
    let field = Field { index: 0, name: request.name.clone() };
    let root = compile_into(schema, &mut arena, request, &request.name, &[], field)?;
    Ok(CompiledQuery { arena, root })
}

/// Compiles a standalone commit query.
pub fn compile_commits(request: &CommitSelectRequest) -> QueryResult<CompiledCommitQuery> {
    if request.kind == CommitQueryKind::One && request.cid.is_none() {
        return Err(QueryError::InvalidRequest(
            "a single-commit query requires a cid".to_owned(),
        ));
    }
    let mut arena = MappingArena::new();
    let mapping = commit_mapping(&mut arena, true);
    Ok(CompiledCommitQuery {
        arena,
        root: CommitSelect {
            field: Field { index: 0, name: "commits".to_owned() },
            doc_key: Some(DocKey::new(request.doc_key.clone())),
            field_name: request.field.clone(),
            cid: request.cid,
            kind: request.kind,
            mapping,
        },
    })
}

fn compile_into(
    schema: &Schema,
    arena: &mut MappingArena,
    request: &SelectRequest,
    collection: &str,
    inherited_group_by: &[String],
    field: Field,
) -> QueryResult<Select> {
    let desc = schema.collection(collection)?;
    let mapping = arena.alloc();
    map_collection_scalars(arena, mapping, desc);

    // Effective group keys: ancestors first, then this scope's own, so
    // nested groupings always carry every ancestor key.
    let mut group_names: Vec<String> = Vec::new();
    if !request.group_by.is_empty() {
        for name in inherited_group_by.iter().chain(request.group_by.iter()) {
            if !group_names.iter().any(|n| n == name) {
                group_names.push(name.clone());
            }
        }
    }

    let mut fields: Vec<Requestable> = Vec::new();
    let mut aggregates: Vec<&AggregateRequest> = Vec::new();

    for requested in &request.fields {
        match requested {
            RequestField::Field { name, alias } => {
                let index = arena
                    .get(mapping)
                    .first_index_of(name)
                    .ok_or_else(|| unknown_field(name, collection))?;
                arena
                    .get_mut(mapping)
                    .add_render_key(index, alias.as_deref().unwrap_or(name));
                fields.push(Requestable::Field(Field { index, name: name.clone() }));
            }
            RequestField::Select(sub) => {
                let index = arena.get_mut(mapping).add(&sub.name);
                let child = if sub.name == GROUP_FIELD {
                    compile_into(
                        schema,
                        arena,
                        sub,
                        collection,
                        &group_names,
                        Field { index, name: GROUP_FIELD.to_owned() },
                    )?
                } else {
                    let target = relation_target(desc, &sub.name)?;
                    compile_into(
                        schema,
                        arena,
                        sub,
                        &target,
                        &[],
                        Field { index, name: sub.name.clone() },
                    )?
                };
                arena.get_mut(mapping).set_child(index, child.mapping);
                arena
                    .get_mut(mapping)
                    .add_render_key(index, sub.alias.as_deref().unwrap_or(&sub.name));
                fields.push(Requestable::Select(Box::new(child)));
            }
            RequestField::Aggregate(aggregate) => aggregates.push(aggregate),
            RequestField::Version(version) => {
                let index = arena.get_mut(mapping).add(VERSION_FIELD);
                let commits = commit_mapping(arena, true);
                arena.get_mut(mapping).set_child(index, commits);
                arena
                    .get_mut(mapping)
                    .add_render_key(index, version.alias.as_deref().unwrap_or(VERSION_FIELD));
                fields.push(Requestable::CommitSelect(Box::new(CommitSelect {
                    field: Field { index, name: VERSION_FIELD.to_owned() },
                    doc_key: None,
                    field_name: None,
                    cid: None,
                    kind: version.kind,
                    mapping: commits,
                })));
            }
        }
    }

    let filter = match &request.filter {
        Some(f) => Some(Filter::new(compile_conditions(
            schema,
            arena,
            mapping,
            desc,
            Some(&mut fields),
            &f.conditions,
        )?)),
        None => None,
    };
    let order = compile_order(schema, arena, mapping, desc, &mut fields, &request.order)?;
    let group_by = compile_group_by(arena, mapping, desc, &group_names)?;
    let limit = match (request.limit, request.offset) {
        (None, None) => None,
        (limit, offset) => Some(Limit { limit, offset: offset.unwrap_or(0) }),
    };

    for aggregate_request in aggregates {
        let compiled =
            aggregate::resolve(schema, arena, mapping, desc, &mut fields, aggregate_request)?;
        let key = aggregate_request
            .alias
            .clone()
            .unwrap_or_else(|| aggregate_request.kind.as_str().to_owned());
        arena.get_mut(mapping).add_render_key(compiled.field.index, key);
        fields.push(Requestable::Aggregate(Box::new(compiled)));
    }

    Ok(Select {
        field,
        collection: collection.to_owned(),
        mapping,
        filter,
        order,
        limit,
        group_by,
        fields,
    })
}

/// Maps `_key` and every scalar schema field onto a fresh scope.
fn map_collection_scalars(
    arena: &mut MappingArena,
    mapping: MappingId,
    desc: &CollectionDescription,
) {
    let m = arena.get_mut(mapping);
    m.add(DOC_KEY_FIELD);
    for field in &desc.fields {
        if !field.is_object() {
            m.add(&field.name);
        }
    }
}

/// Appends a hidden child select for an unselected relation, widening
/// the parent mapping. The new scope carries no render keys.
pub(super) fn synthesize_child_select(
    schema: &Schema,
    arena: &mut MappingArena,
    mapping: MappingId,
    desc: &CollectionDescription,
    fields: &mut Vec<Requestable>,
    name: &str,
) -> QueryResult<(usize, MappingId)> {
    let target = relation_target(desc, name)?;
    let index = arena.get_mut(mapping).add(name);
    let child = compile_into(
        schema,
        arena,
        &SelectRequest::new(name),
        &target,
        &[],
        Field { index, name: name.to_owned() },
    )?;
    let child_mapping = child.mapping;
    arena.get_mut(mapping).set_child(index, child_mapping);
    fields.push(Requestable::Select(Box::new(child)));
    Ok((index, child_mapping))
}

/// Maps a hidden `_group` child scope for an aggregate host. No select
/// is appended: the group stage materializes the constituents itself.
pub(super) fn synthesize_group_child(
    arena: &mut MappingArena,
    mapping: MappingId,
    desc: &CollectionDescription,
) -> (usize, MappingId) {
    let index = arena.get_mut(mapping).add(GROUP_FIELD);
    let child = arena.alloc();
    map_collection_scalars(arena, child, desc);
    arena.get_mut(mapping).set_child(index, child);
    (index, child)
}

/// Compiles a filter against an existing scope without on-demand
/// relation synthesis. Used for aggregate target filters.
pub(super) fn compile_filter_scoped(
    schema: &Schema,
    arena: &mut MappingArena,
    mapping: MappingId,
    desc: &CollectionDescription,
    request: &FilterRequest,
) -> QueryResult<Filter> {
    Ok(Filter::new(compile_conditions(
        schema,
        arena,
        mapping,
        desc,
        None,
        &request.conditions,
    )?))
}

fn compile_conditions(
    schema: &Schema,
    arena: &mut MappingArena,
    mapping: MappingId,
    desc: &CollectionDescription,
    mut synth: Option<&mut Vec<Requestable>>,
    conditions: &BTreeMap<String, ConditionValue>,
) -> QueryResult<Conditions> {
    let mut compiled = Conditions::new();
    for (key, value) in conditions {
        if let Some(op) = Operator::parse(key) {
            let entry = match (op, value) {
                (Operator::And | Operator::Or, ConditionValue::List(clauses)) => {
                    let mut list = Vec::with_capacity(clauses.len());
                    for clause in clauses {
                        let ConditionValue::Sub(sub) = clause else {
                            return Err(invalid_filter(format!(
                                "{} clauses must be condition maps",
                                op.as_str()
                            )));
                        };
                        list.push(FilterValue::Conditions(compile_conditions(
                            schema,
                            arena,
                            mapping,
                            desc,
                            synth.as_deref_mut(),
                            sub,
                        )?));
                    }
                    FilterValue::List(list)
                }
                (Operator::Not, ConditionValue::Sub(sub)) => {
                    FilterValue::Conditions(compile_conditions(
                        schema,
                        arena,
                        mapping,
                        desc,
                        synth.as_deref_mut(),
                        sub,
                    )?)
                }
                (op, _) => {
                    return Err(invalid_filter(format!(
                        "operator {} is not valid at document level",
                        op.as_str()
                    )));
                }
            };
            compiled.insert(FilterKey::Operator(op), entry);
            continue;
        }
        if key.starts_with('_') && key != DOC_KEY_FIELD && key != GROUP_FIELD {
            return Err(QueryError::UnknownOperator(key.clone()));
        }

        let index = match arena.get(mapping).first_index_of(key) {
            Some(index) => index,
            None => match synth.as_deref_mut() {
                Some(fields) if desc.field(key).is_some_and(|f| f.is_object()) => {
                    synthesize_child_select(schema, arena, mapping, desc, fields, key)?.0
                }
                _ => return Err(unknown_field(key, &desc.name)),
            },
        };
        let child = arena.get(mapping).child(index);
        let entry = match value {
            ConditionValue::Value(v) => FilterValue::Value(v.clone()),
            ConditionValue::Sub(sub) => match child {
                Some(child_mapping) => {
                    let child_desc = if key == GROUP_FIELD {
                        desc
                    } else {
                        let target = relation_target(desc, key)?;
                        schema.collection(&target)?
                    };
                    FilterValue::Conditions(compile_conditions(
                        schema,
                        arena,
                        child_mapping,
                        child_desc,
                        None,
                        sub,
                    )?)
                }
                None => FilterValue::Conditions(compile_operator_conditions(sub)?),
            },
            ConditionValue::List(_) => {
                return Err(invalid_filter(format!(
                    "field {key} cannot be conditioned on a bare list"
                )));
            }
        };
        compiled.insert(FilterKey::Index(index), entry);
    }
    Ok(compiled)
}

fn compile_operator_conditions(
    conditions: &BTreeMap<String, ConditionValue>,
) -> QueryResult<Conditions> {
    let mut compiled = Conditions::new();
    for (key, value) in conditions {
        let op = Operator::parse(key).ok_or_else(|| QueryError::UnknownOperator(key.clone()))?;
        let entry = match (op, value) {
            (Operator::In | Operator::Nin, ConditionValue::List(items)) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    let ConditionValue::Value(v) = item else {
                        return Err(invalid_filter("_in/_nin expect scalar comparands"));
                    };
                    list.push(FilterValue::Value(v.clone()));
                }
                FilterValue::List(list)
            }
            (Operator::Not, ConditionValue::Sub(sub)) => {
                FilterValue::Conditions(compile_operator_conditions(sub)?)
            }
            (
                Operator::Eq
                | Operator::Ne
                | Operator::Gt
                | Operator::Ge
                | Operator::Lt
                | Operator::Le,
                ConditionValue::Value(v),
            ) => FilterValue::Value(v.clone()),
            (op, _) => {
                return Err(invalid_filter(format!("malformed operand for {}", op.as_str())));
            }
        };
        compiled.insert(FilterKey::Operator(op), entry);
    }
    Ok(compiled)
}

fn compile_order(
    schema: &Schema,
    arena: &mut MappingArena,
    mapping: MappingId,
    desc: &CollectionDescription,
    fields: &mut Vec<Requestable>,
    inputs: &[OrderInput],
) -> QueryResult<Option<OrderBy>> {
    if inputs.is_empty() {
        return Ok(None);
    }
    let mut conditions = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.path.is_empty() {
            return Err(QueryError::InvalidRequest(
                "an order condition requires a field path".to_owned(),
            ));
        }
        let mut indices = Vec::with_capacity(input.path.len());
        let mut current_mapping = mapping;
        let mut current_desc = desc;
        for (pos, name) in input.path.iter().enumerate() {
            let last = pos + 1 == input.path.len();
            let index = match arena.get(current_mapping).first_index_of(name) {
                Some(index) => index,
                None if pos == 0 && !last => {
                    synthesize_child_select(schema, arena, mapping, desc, fields, name)?.0
                }
                None => return Err(unknown_field(name, &current_desc.name)),
            };
            indices.push(index);
            if !last {
                current_mapping = arena.get(current_mapping).child(index).ok_or_else(|| {
                    QueryError::InvalidRequest(format!(
                        "cannot order through scalar field {name}"
                    ))
                })?;
                if name != GROUP_FIELD {
                    let target = relation_target(current_desc, name)?;
                    current_desc = schema.collection(&target)?;
                }
            }
        }
        conditions.push(OrderCondition { fields: indices, direction: input.direction });
    }
    Ok(Some(OrderBy { conditions }))
}

fn compile_group_by(
    arena: &MappingArena,
    mapping: MappingId,
    desc: &CollectionDescription,
    names: &[String],
) -> QueryResult<Option<GroupBy>> {
    if names.is_empty() {
        return Ok(None);
    }
    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        let field = desc.field(name).ok_or_else(|| unknown_field(name, &desc.name))?;
        if field.is_object() {
            return Err(QueryError::InvalidRequest(format!(
                "cannot group by relation field {name}"
            )));
        }
        let index = arena
            .get(mapping)
            .first_index_of(name)
            .ok_or_else(|| unknown_field(name, &desc.name))?;
        fields.push(GroupByField { index, name: name.clone() });
    }
    Ok(Some(GroupBy { fields }))
}

/// Builds the commit document mapping: `cid`, `height`, `delta` and a
/// `links` child of `{name, cid}` entries.
pub(super) fn commit_mapping(arena: &mut MappingArena, rendered: bool) -> MappingId {
    let links = arena.alloc();
    {
        let m = arena.get_mut(links);
        let name = m.add(COMMIT_LINK_NAME_FIELD);
        let cid = m.add(COMMIT_CID_FIELD);
        if rendered {
            m.add_render_key(name, COMMIT_LINK_NAME_FIELD);
            m.add_render_key(cid, COMMIT_CID_FIELD);
        }
    }
    let id = arena.alloc();
    let m = arena.get_mut(id);
    let cid = m.add(COMMIT_CID_FIELD);
    let height = m.add(COMMIT_HEIGHT_FIELD);
    let delta = m.add(COMMIT_DELTA_FIELD);
    let links_index = m.add(COMMIT_LINKS_FIELD);
    m.set_child(links_index, links);
    if rendered {
        m.add_render_key(cid, COMMIT_CID_FIELD);
        m.add_render_key(height, COMMIT_HEIGHT_FIELD);
        m.add_render_key(delta, COMMIT_DELTA_FIELD);
        m.add_render_key(links_index, COMMIT_LINKS_FIELD);
    }
    id
}

pub(super) fn relation_target(
    desc: &CollectionDescription,
    name: &str,
) -> QueryResult<String> {
    desc.field(name)
        .filter(|f| f.is_object())
        .and_then(|f| f.relation.as_ref())
        .map(|r| r.target_collection.clone())
        .ok_or_else(|| unknown_field(name, &desc.name))
}

pub(super) fn unknown_field(name: &str, collection: &str) -> QueryError {
    QueryError::UnknownField { name: name.to_owned(), collection: collection.to_owned() }
}

fn invalid_filter(message: impl Into<String>) -> QueryError {
    QueryError::InvalidFilter(message.into())
}
