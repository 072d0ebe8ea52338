//! Grouping into `_group` children.

use std::collections::HashMap;

use vellum_core::{Spans, Value};

use crate::error::QueryResult;
use crate::filter::Filter;
use crate::mapper::{
    Doc, DocValue, GroupBy, Limit, MappingArena, MappingId, OrderBy,
};

use super::node::{Node, PlanNode};
use super::order::sort_docs;

use std::sync::Arc;

/// One `_group` child scope of a grouped select: where the constituents
/// land, and what shaping (filter, nested grouping, order, limit) they
/// get on the way in.
#[derive(Debug, Clone)]
pub struct GroupChild {
    /// The slot in the parent mapping the constituents land in.
    pub index: usize,
    /// The constituents' mapping.
    pub mapping: MappingId,
    /// Filter over constituents.
    pub filter: Option<Filter>,
    /// Ordering of constituents.
    pub order: Option<OrderBy>,
    /// Limit/offset on constituents.
    pub limit: Option<Limit>,
    /// Nested grouping of constituents.
    pub group_by: Option<GroupBy>,
    /// Nested `_group` scopes, present when `group_by` is.
    pub children: Vec<GroupChild>,
}

/// Consumes the source and yields one row per distinct group key.
///
/// The key is a composite string of field name and stringified value per
/// key field. Each output row is the group's first constituent with the
/// `_group` slots replaced by the shaped constituent lists; groups
/// appear in first-seen source order.
pub struct GroupNode {
    source: Box<Node>,
    arena: Arc<MappingArena>,
    group_by: GroupBy,
    children: Vec<GroupChild>,
    buffered: Option<std::vec::IntoIter<Doc>>,
}

impl GroupNode {
    pub(crate) fn new(
        source: Node,
        arena: Arc<MappingArena>,
        group_by: GroupBy,
        children: Vec<GroupChild>,
    ) -> Self {
        Self {
            source: Box::new(source),
            arena,
            group_by,
            children,
            buffered: None,
        }
    }

    pub(crate) fn source_mut(&mut self) -> &mut Node {
        &mut self.source
    }
}

impl PlanNode for GroupNode {
    fn init(&mut self) -> QueryResult<()> {
        self.buffered = None;
        self.source.init()
    }

    fn start(&mut self) -> QueryResult<()> {
        self.source.start()
    }

    fn spans(&mut self, spans: Spans) {
        self.source.spans(spans);
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        if self.buffered.is_none() {
            let mut docs = Vec::new();
            while let Some(doc) = self.source.next()? {
                docs.push(doc);
            }
            let rows = group_docs(&self.arena, docs, &self.group_by, &self.children)?;
            self.buffered = Some(rows.into_iter());
        }
        Ok(self.buffered.as_mut().and_then(Iterator::next))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.buffered = None;
        self.source.close()
    }
}

/// Groups documents by key, shaping constituents into each child scope.
/// Recurses for nested grouping.
fn group_docs(
    arena: &MappingArena,
    docs: Vec<Doc>,
    group_by: &GroupBy,
    children: &[GroupChild],
) -> QueryResult<Vec<Doc>> {
    let mut seen_order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<Doc>> = HashMap::new();
    for doc in docs {
        let key = composite_key(&doc, group_by);
        if !buckets.contains_key(&key) {
            seen_order.push(key.clone());
        }
        buckets.entry(key).or_default().push(doc);
    }

    let mut rows = Vec::with_capacity(seen_order.len());
    for key in seen_order {
        let members = buckets.remove(&key).unwrap_or_default();
        let mut row = members.first().cloned().unwrap_or_default();
        for child in children {
            let mut shaped: Vec<Doc> = Vec::with_capacity(members.len());
            for member in &members {
                let converted = convert_doc(arena, child.mapping, member);
                match &child.filter {
                    Some(filter) if !filter.matches(&converted)? => {}
                    _ => shaped.push(converted),
                }
            }
            if let Some(nested) = &child.group_by {
                shaped = group_docs(arena, shaped, nested, &child.children)?;
            }
            if let Some(order) = &child.order {
                sort_docs(order, &mut shaped);
            }
            if let Some(limit) = &child.limit {
                let offset = usize::try_from(limit.offset).unwrap_or(usize::MAX);
                shaped = shaped
                    .into_iter()
                    .skip(offset)
                    .take(
                        limit
                            .limit
                            .map_or(usize::MAX, |m| usize::try_from(m).unwrap_or(usize::MAX)),
                    )
                    .collect();
            }
            row.set(child.index, DocValue::Docs(shaped));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Re-addresses a document from its source mapping into a group child
/// mapping by field name. Only scalar slots are carried over.
fn convert_doc(arena: &MappingArena, child_mapping: MappingId, member: &Doc) -> Doc {
    let mapping = arena.get(child_mapping);
    let mut doc = Doc::with_width(mapping.width());
    for (_, indices) in mapping.iter_names() {
        for &index in indices {
            if mapping.child(index).is_some() {
                continue;
            }
            // Same-collection scopes share their scalar layout, so the
            // source slot sits at the same index.
            if let Some(DocValue::Value(value)) = member.get(index) {
                doc.set_value(index, value.clone());
            }
        }
    }
    doc
}

/// Builds the composite group key: field name plus stringified value per
/// key field.
fn composite_key(doc: &Doc, group_by: &GroupBy) -> String {
    let mut key = String::new();
    for field in &group_by.fields {
        key.push_str(&field.name);
        key.push(':');
        match doc.value(field.index) {
            Some(value) => key.push_str(&value_key(value)),
            None => key.push_str("null"),
        }
        key.push(';');
    }
    key
}

fn value_key(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => format!("{b:02x?}"),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(value_key).collect();
            format!("[{}]", parts.join(","))
        }
    }
}
