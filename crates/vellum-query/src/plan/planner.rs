//! Plan construction and execution.
//!
//! The planner turns a compiled select into a tree of plan nodes. Nodes
//! wrap bottom-up in a fixed discipline:
//!
//! ```text
//! limit ( order ( aggregates ( group ( joins ( scan ) ) ) ) )
//! ```
//!
//! Aggregates wrap in field order; since a dependency is compiled before
//! its dependent, the dependency sits deeper and its slot is populated
//! first. Multiple join branches share one scan through a
//! [`SharedScanCursor`](super::SharedScanCursor) and merge under a
//! parallel node.

use std::sync::Arc;

use vellum_core::{CollectionDescription, FieldKind, Spans};
use vellum_store::Transaction;

use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::mapper::{
    compile_commits, compile_select, CommitSelect, MappingArena, MappingId, Requestable,
    Schema, Select, DOC_KEY_FIELD,
};
use crate::render::{render, RenderedDoc};
use crate::request::{
    AggregateKind, CommitSelectRequest, OrderDirection, SelectRequest, GROUP_FIELD,
};

use super::aggregate::{AverageNode, CountNode, ExtremaNode, SumNode};
use super::commit::CommitSelectNode;
use super::group::{GroupChild, GroupNode};
use super::limit::LimitNode;
use super::multi_scan::{MultiScanNode, SharedScanCursor};
use super::node::{Node, PlanNode};
use super::order::OrderNode;
use super::parallel::ParallelNode;
use super::scan::ScanNode;
use super::type_join::{JoinDetail, TypeIndexJoinNode};

/// Builds executable plans for compiled queries.
pub struct Planner {
    txn: Arc<dyn Transaction>,
    schema: Schema,
}

impl Planner {
    /// Creates a planner over one transaction and schema catalog.
    #[must_use]
    pub fn new(txn: Arc<dyn Transaction>, schema: Schema) -> Self {
        Self { txn, schema }
    }

    /// Compiles and plans a select request.
    ///
    /// # Errors
    ///
    /// Returns a compilation error for unresolvable names or invalid
    /// filters.
    pub fn select(&self, request: &SelectRequest) -> QueryResult<Executor> {
        tracing::debug!(collection = %request.name, "planning select");
        let compiled = compile_select(&self.schema, request)?;
        let arena = Arc::new(compiled.arena);
        let mapping = compiled.root.mapping;
        let root = self.build_select(compiled.root, &arena)?;
        Ok(Executor::new(root, arena, mapping))
    }

    /// Compiles and plans a standalone commit query.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRequest`] for a single-commit query
    /// without a cid.
    pub fn commits(&self, request: &CommitSelectRequest) -> QueryResult<Executor> {
        tracing::debug!(doc_key = %request.doc_key, "planning commit query");
        let compiled = compile_commits(request)?;
        let arena = Arc::new(compiled.arena);
        let mapping = compiled.root.mapping;
        let node = Node::CommitSelect(CommitSelectNode::new(
            Arc::clone(&self.txn),
            Arc::clone(&arena),
            compiled.root,
        ));
        Ok(Executor::new(node, arena, mapping))
    }

    /// Builds the plan tree for one select scope.
    fn build_select(&self, select: Select, arena: &Arc<MappingArena>) -> QueryResult<Node> {
        let desc = self.schema.collection(&select.collection)?.clone();
        let root_key_index = arena
            .get(select.mapping)
            .first_index_of(DOC_KEY_FIELD)
            .unwrap_or(0);

        let mut joins: Vec<Select> = Vec::new();
        let mut versions: Vec<CommitSelect> = Vec::new();
        let mut aggregates = Vec::new();
        for requestable in &select.fields {
            match requestable {
                Requestable::Select(sub) if sub.field.name != GROUP_FIELD => {
                    joins.push((**sub).clone());
                }
                Requestable::CommitSelect(commit) => versions.push((**commit).clone()),
                Requestable::Aggregate(aggregate) => aggregates.push((**aggregate).clone()),
                _ => {}
            }
        }

        // Split the scope filter: conditions keyed by a relation slot
        // travel to that join's sub side.
        let mut scan_filter = select.filter.clone();
        let mut sub_filters: Vec<Option<Filter>> = Vec::with_capacity(joins.len());
        for join in &joins {
            let (remaining, sub) = Filter::split_by_index(scan_filter.take(), join.field.index);
            scan_filter = remaining;
            sub_filters.push(sub);
        }

        // A sort on the document key alone collapses into the scan
        // itself: ascending is the scan's natural order, descending a
        // reverse scan.
        let mut order = select.order.clone();
        let mut reverse = false;
        if select.group_by.is_none() {
            if let Some(o) = &order {
                if o.conditions.len() == 1 && o.conditions[0].fields == vec![root_key_index] {
                    reverse = o.conditions[0].direction == OrderDirection::Desc;
                    order = None;
                }
            }
        }

        let scan = ScanNode::new(
            Arc::clone(&self.txn),
            desc.clone(),
            Arc::clone(arena),
            select.mapping,
            scan_filter,
            reverse,
        );

        // Filtered joins drop rows, which would desynchronize lockstep
        // readers over a shared cursor; they are chained instead of
        // merged in parallel.
        let any_filtered = sub_filters.iter().any(Option::is_some);
        let (mut node, merges) = if joins.len() >= 2 && !any_filtered {
            let cursor = SharedScanCursor::share(Node::Scan(scan));
            let source = Node::MultiScan(MultiScanNode::reader(&cursor));
            let mut merges = Vec::with_capacity(joins.len());
            for (join, sub_filter) in joins.into_iter().zip(sub_filters) {
                let slot = join.field.index;
                let branch = self.build_join(
                    Node::MultiScan(MultiScanNode::reader(&cursor)),
                    join,
                    arena,
                    &desc,
                    select.mapping,
                    root_key_index,
                    sub_filter,
                )?;
                merges.push((branch, slot));
            }
            (source, merges)
        } else {
            let mut source = Node::Scan(scan);
            for (join, sub_filter) in joins.into_iter().zip(sub_filters) {
                source = self.build_join(
                    source,
                    join,
                    arena,
                    &desc,
                    select.mapping,
                    root_key_index,
                    sub_filter,
                )?;
            }
            (source, Vec::new())
        };

        if !merges.is_empty() || !versions.is_empty() {
            let appends = versions
                .into_iter()
                .map(|commit| {
                    let slot = commit.field.index;
                    let append =
                        CommitSelectNode::new(Arc::clone(&self.txn), Arc::clone(arena), commit);
                    (append, slot)
                })
                .collect();
            node = Node::Parallel(Box::new(ParallelNode::new(
                node,
                merges,
                appends,
                root_key_index,
            )));
        }

        if let Some(group_by) = select.group_by.clone() {
            let children = group_children(&select, arena);
            node = Node::Group(GroupNode::new(node, Arc::clone(arena), group_by, children));
        }

        for aggregate in aggregates {
            node = match aggregate.kind {
                AggregateKind::Count => Node::Count(CountNode::new(node, aggregate)),
                AggregateKind::Sum => Node::Sum(SumNode::new(node, aggregate)),
                AggregateKind::Average => Node::Average(AverageNode::new(node, aggregate)),
                AggregateKind::Min | AggregateKind::Max => {
                    Node::Extrema(ExtremaNode::new(node, aggregate))
                }
            };
        }

        if let Some(order) = order {
            node = Node::Order(OrderNode::new(node, order));
        }
        if let Some(limit) = select.limit {
            node = Node::Limit(LimitNode::new(node, limit));
        }
        Ok(node)
    }

    /// Builds a relation join: the sub plan, the join detail chosen from
    /// the schema, and the join node tying them together.
    #[allow(clippy::too_many_arguments)]
    fn build_join(
        &self,
        root: Node,
        mut child: Select,
        arena: &Arc<MappingArena>,
        parent_desc: &CollectionDescription,
        parent_mapping: MappingId,
        root_key_index: usize,
        extra_sub_filter: Option<Filter>,
    ) -> QueryResult<Node> {
        // A parent filter condition on the relation makes the join
        // filtering: parents without a matching sub document are dropped.
        let filtered = extra_sub_filter.is_some();
        if let Some(extra) = extra_sub_filter {
            child
                .filter
                .get_or_insert_with(Filter::default)
                .conditions
                .extend(extra.conditions);
        }

        let field_desc = parent_desc.field(&child.field.name).ok_or_else(|| {
            QueryError::UnknownField {
                name: child.field.name.clone(),
                collection: parent_desc.name.clone(),
            }
        })?;
        let relation = field_desc.relation.as_ref().ok_or_else(|| {
            QueryError::UnknownField {
                name: child.field.name.clone(),
                collection: parent_desc.name.clone(),
            }
        })?;
        let many = field_desc.kind == FieldKind::ObjectArray;
        let sub_desc = self.schema.collection(&child.collection)?;

        let detail = if !many && relation.primary {
            let fk_name = field_desc.foreign_key_name();
            let fk_root_index = arena
                .get(parent_mapping)
                .first_index_of(&fk_name)
                .ok_or_else(|| QueryError::UnknownField {
                    name: fk_name,
                    collection: parent_desc.name.clone(),
                })?;
            JoinDetail::OnePrimary {
                fk_root_index,
                sub_collection_id: sub_desc.id,
                sub_index_id: sub_desc.primary_index().id,
            }
        } else {
            // The sub collection stores the foreign key: find its
            // primary endpoint of this relation and resolve the fk
            // scalar in the child mapping.
            let fk_name = sub_desc
                .fields
                .iter()
                .find(|f| {
                    f.relation.as_ref().is_some_and(|r| r.name == relation.name && r.primary)
                })
                .map(vellum_core::FieldDescription::foreign_key_name)
                .ok_or_else(|| QueryError::UnknownField {
                    name: relation.name.clone(),
                    collection: sub_desc.name.clone(),
                })?;
            let fk_sub_index = arena
                .get(child.mapping)
                .first_index_of(&fk_name)
                .ok_or_else(|| QueryError::UnknownField {
                    name: fk_name,
                    collection: sub_desc.name.clone(),
                })?;
            if many {
                JoinDetail::Many { fk_sub_index }
            } else {
                JoinDetail::OneSecondary { fk_sub_index }
            }
        };

        let root_index = child.field.index;
        let sub = self.build_select(child, arena)?;
        Ok(Node::TypeJoin(Box::new(TypeIndexJoinNode::new(
            root,
            sub,
            root_index,
            root_key_index,
            detail,
            filtered,
        ))))
    }
}

/// Builds the group-child specs for a grouped select: the requested
/// `_group` scopes with their shaping, plus any aggregate-synthesized
/// scopes (mapping only, no shaping).
fn group_children(select: &Select, arena: &Arc<MappingArena>) -> Vec<GroupChild> {
    let mut children = Vec::new();
    let mut covered = Vec::new();
    for requestable in &select.fields {
        if let Requestable::Select(sub) = requestable {
            if sub.field.name == GROUP_FIELD {
                covered.push(sub.field.index);
                children.push(GroupChild {
                    index: sub.field.index,
                    mapping: sub.mapping,
                    filter: sub.filter.clone(),
                    order: sub.order.clone(),
                    limit: sub.limit,
                    group_by: sub.group_by.clone(),
                    children: group_children(sub, arena),
                });
            }
        }
    }
    let mapping = arena.get(select.mapping);
    for &index in mapping.indexes_of(GROUP_FIELD) {
        if covered.contains(&index) {
            continue;
        }
        if let Some(child_mapping) = mapping.child(index) {
            children.push(GroupChild {
                index,
                mapping: child_mapping,
                filter: None,
                order: None,
                limit: None,
                group_by: None,
                children: Vec::new(),
            });
        }
    }
    children
}

/// Drives a plan to completion, rendering each document.
///
/// The plan is initialized and started lazily on the first `next`, and
/// closed when the source is exhausted.
pub struct Executor {
    root: Node,
    arena: Arc<MappingArena>,
    mapping: MappingId,
    started: bool,
    closed: bool,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("mapping", &self.mapping)
            .field("started", &self.started)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Executor {
    fn new(root: Node, arena: Arc<MappingArena>, mapping: MappingId) -> Self {
        Self { root, arena, mapping, started: false, closed: false }
    }

    /// Pulls the next rendered document, or `None` when the plan is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Propagates fetch, decode, and filter evaluation errors.
    pub fn next(&mut self) -> QueryResult<Option<RenderedDoc>> {
        if self.closed {
            return Ok(None);
        }
        if !self.started {
            self.root.init()?;
            self.root.start()?;
            self.started = true;
        }
        match self.root.next()? {
            Some(doc) => Ok(Some(render(&self.arena, self.mapping, &doc))),
            None => {
                self.root.close()?;
                self.closed = true;
                Ok(None)
            }
        }
    }

    /// Drains the plan into a vector.
    ///
    /// # Errors
    ///
    /// Propagates the first execution error.
    pub fn collect_all(&mut self) -> QueryResult<Vec<RenderedDoc>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next()? {
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Re-targets the plan's leaf scans. Must be called before the first
    /// `next`.
    pub fn spans(&mut self, spans: Spans) {
        self.root.spans(spans);
    }
}
