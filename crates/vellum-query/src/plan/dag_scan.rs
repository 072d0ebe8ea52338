//! Breadth-first DAG traversal over commit blocks.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use vellum_core::{Cid, Commit, DocKey, Spans, Value};

use crate::error::{QueryError, QueryResult};
use crate::mapper::{
    Doc, DocValue, DocumentMapping, MappingArena, MappingId, COMMIT_CID_FIELD,
    COMMIT_DELTA_FIELD, COMMIT_HEIGHT_FIELD, COMMIT_LINKS_FIELD, COMMIT_LINK_NAME_FIELD,
};
use vellum_store::Transaction;

use super::head_set::HeadSetScanNode;
use super::node::PlanNode;

/// Walks a document register's commit history.
///
/// Start resolves the current heads for the target register, then each
/// `next` pops one commit: its block is fetched, decoded, and its links
/// enqueued. A visited set keeps merged histories from yielding a block
/// twice. Output order is breadth-first from the heads; consumers that
/// need height order sort above this node.
pub struct DagScanNode {
    txn: Arc<dyn Transaction>,
    arena: Arc<MappingArena>,
    mapping: MappingId,
    head_scan: HeadSetScanNode,
    doc_key: Option<DocKey>,
    field_name: Option<String>,
    queue: VecDeque<Cid>,
    visited: HashSet<Cid>,
}

impl DagScanNode {
    pub(crate) fn new(
        txn: Arc<dyn Transaction>,
        arena: Arc<MappingArena>,
        mapping: MappingId,
        doc_key: Option<DocKey>,
        field_name: Option<String>,
    ) -> Self {
        let head_scan = HeadSetScanNode::new(Arc::clone(&txn));
        Self {
            txn,
            arena,
            mapping,
            head_scan,
            doc_key,
            field_name,
            queue: VecDeque::new(),
            visited: HashSet::new(),
        }
    }

    /// Retargets the traversal at another document, for per-row history
    /// children.
    pub(crate) fn set_doc_key(&mut self, doc_key: DocKey) {
        self.doc_key = Some(doc_key);
    }
}

impl PlanNode for DagScanNode {
    fn init(&mut self) -> QueryResult<()> {
        self.queue.clear();
        self.visited.clear();
        Ok(())
    }

    fn start(&mut self) -> QueryResult<()> {
        let doc_key = self.doc_key.clone().ok_or_else(|| {
            QueryError::InvalidRequest("commit scan requires a document key".to_owned())
        })?;
        // The composite document register is stored under the empty
        // field name.
        let field = self.field_name.as_deref().unwrap_or("");
        self.head_scan.set_target(&doc_key, field);
        self.head_scan.start()?;
        self.queue.clear();
        self.visited.clear();
        while let Some(cid) = self.head_scan.next()? {
            self.queue.push_back(cid);
        }
        tracing::trace!(doc_key = doc_key.as_str(), field, heads = self.queue.len(), "dag scan");
        Ok(())
    }

    fn spans(&mut self, _spans: Spans) {}

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        loop {
            let Some(cid) = self.queue.pop_front() else {
                return Ok(None);
            };
            if !self.visited.insert(cid) {
                continue;
            }
            let bytes = self.txn.get_block(&cid)?;
            let commit = Commit::decode_block(cid, &bytes)?;
            for link in &commit.links {
                if !self.visited.contains(&link.cid) {
                    self.queue.push_back(link.cid);
                }
            }
            return Ok(Some(commit_doc(&self.arena, self.mapping, &commit)));
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.queue.clear();
        self.visited.clear();
        Ok(())
    }
}

/// Shapes a decoded commit into a document under the commit mapping.
pub(crate) fn commit_doc(arena: &MappingArena, mapping: MappingId, commit: &Commit) -> Doc {
    let m = arena.get(mapping);
    let mut doc = Doc::with_width(m.width());
    set_by_name(m, &mut doc, COMMIT_CID_FIELD, Value::String(commit.cid.to_string()));
    set_by_name(
        m,
        &mut doc,
        COMMIT_HEIGHT_FIELD,
        Value::Int(i64::try_from(commit.height).unwrap_or(i64::MAX)),
    );
    set_by_name(m, &mut doc, COMMIT_DELTA_FIELD, Value::Bytes(commit.delta.clone()));

    if let Some(links_index) = m.first_index_of(COMMIT_LINKS_FIELD) {
        if let Some(link_mapping) = m.child(links_index) {
            let lm = arena.get(link_mapping);
            let links = commit
                .links
                .iter()
                .map(|link| {
                    let mut link_doc = Doc::with_width(lm.width());
                    set_by_name(
                        lm,
                        &mut link_doc,
                        COMMIT_LINK_NAME_FIELD,
                        Value::String(link.name.clone()),
                    );
                    set_by_name(
                        lm,
                        &mut link_doc,
                        COMMIT_CID_FIELD,
                        Value::String(link.cid.to_string()),
                    );
                    link_doc
                })
                .collect();
            doc.set(links_index, DocValue::Docs(links));
        }
    }
    doc
}

fn set_by_name(mapping: &DocumentMapping, doc: &mut Doc, name: &str, value: Value) {
    if let Some(index) = mapping.first_index_of(name) {
        doc.set_value(index, value);
    }
}
