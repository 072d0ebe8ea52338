//! Relation joins.
//!
//! A join pulls one document from its root side, then resolves the
//! related document(s) on the sub side:
//!
//! - one-to-one, primary root: the root document stores the foreign
//!   key, so the sub side is re-targeted at a single-key span and
//!   restarted per row
//! - one-to-one, secondary root / one-to-many: the sub collection
//!   stores the foreign key, so the root document's key is pushed into
//!   the sub scan's filter and the sub side restarted per row
//!
//! A missing related document is not an error: the relation slot stays
//! null (or an empty list on the many side). The exception is a filtered
//! join, where a parent filter condition was pushed into the sub side;
//! there the parent is only kept when a sub document matched.

use vellum_core::{keys, DocKey, Span, Spans, Value};

use crate::error::QueryResult;
use crate::mapper::{Doc, DocValue};

use super::node::{Node, PlanNode};

/// How the sub side is driven per root document.
pub(crate) enum JoinDetail {
    /// Root stores the foreign key; point-lookup on the sub collection.
    OnePrimary {
        /// Index of the `<relation>_id` scalar in the root mapping.
        fk_root_index: usize,
        /// Sub collection id for span construction.
        sub_collection_id: u32,
        /// Sub index id for span construction.
        sub_index_id: u32,
    },
    /// Sub collection stores the foreign key; one related document.
    OneSecondary {
        /// Index of the foreign-key scalar in the sub mapping.
        fk_sub_index: usize,
    },
    /// Sub collection stores the foreign key; all related documents.
    Many {
        /// Index of the foreign-key scalar in the sub mapping.
        fk_sub_index: usize,
    },
}

/// A relation join between a root plan and a sub plan.
pub struct TypeIndexJoinNode {
    root: Box<Node>,
    sub: Box<Node>,
    /// The relation slot in the root mapping.
    root_index: usize,
    /// The `_key` slot in the root mapping.
    root_key_index: usize,
    detail: JoinDetail,
    /// When set, root documents without a matching sub document are
    /// dropped (a parent filter condition was pushed into the sub side).
    filtered: bool,
}

impl TypeIndexJoinNode {
    pub(crate) fn new(
        root: Node,
        sub: Node,
        root_index: usize,
        root_key_index: usize,
        detail: JoinDetail,
        filtered: bool,
    ) -> Self {
        Self {
            root: Box::new(root),
            sub: Box::new(sub),
            root_index,
            root_key_index,
            detail,
            filtered,
        }
    }

    pub(crate) fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    /// Restarts the sub side for the current root document and drains
    /// up to `max` results.
    fn fetch_sub(&mut self, max: Option<usize>) -> QueryResult<Vec<Doc>> {
        self.sub.init()?;
        self.sub.start()?;
        let mut docs = Vec::new();
        while let Some(doc) = self.sub.next()? {
            docs.push(doc);
            if max.is_some_and(|m| docs.len() >= m) {
                break;
            }
        }
        Ok(docs)
    }
}

impl PlanNode for TypeIndexJoinNode {
    fn init(&mut self) -> QueryResult<()> {
        self.root.init()
    }

    fn start(&mut self) -> QueryResult<()> {
        self.root.start()
    }

    fn spans(&mut self, spans: Spans) {
        self.root.spans(spans);
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        loop {
            let Some(mut doc) = self.root.next()? else {
                return Ok(None);
            };
            let mut matched = false;
            match &self.detail {
                JoinDetail::OnePrimary { fk_root_index, sub_collection_id, sub_index_id } => {
                    let fk = doc.value(*fk_root_index).cloned().unwrap_or(Value::Null);
                    if let Value::String(key) = fk {
                        let span = Span::prefix(keys::data_key(
                            *sub_collection_id,
                            *sub_index_id,
                            &DocKey::new(key),
                        ));
                        self.sub.spans(Spans::single(span));
                        if let Some(child) = self.fetch_sub(Some(1))?.pop() {
                            doc.set(self.root_index, DocValue::Doc(child));
                            matched = true;
                        }
                    }
                    // A null or missing foreign key leaves the slot null.
                }
                JoinDetail::OneSecondary { fk_sub_index } => {
                    if let Some(key) = doc.value(self.root_key_index).and_then(Value::as_str)
                    {
                        let key = key.to_owned();
                        self.sub
                            .set_scan_filter_condition(*fk_sub_index, Value::String(key));
                        if let Some(child) = self.fetch_sub(Some(1))?.pop() {
                            doc.set(self.root_index, DocValue::Doc(child));
                            matched = true;
                        }
                    }
                }
                JoinDetail::Many { fk_sub_index } => {
                    let mut children = Vec::new();
                    if let Some(key) = doc.value(self.root_key_index).and_then(Value::as_str)
                    {
                        let key = key.to_owned();
                        self.sub
                            .set_scan_filter_condition(*fk_sub_index, Value::String(key));
                        children = self.fetch_sub(None)?;
                    }
                    matched = !children.is_empty();
                    // The many side always materializes a list, even
                    // empty, so aggregates downstream count zero instead
                    // of null.
                    doc.set(self.root_index, DocValue::Docs(children));
                }
            }
            if self.filtered && !matched {
                continue;
            }
            return Ok(Some(doc));
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.root.close()?;
        self.sub.close()
    }
}
