//! Commit select execution.

use std::sync::Arc;

use vellum_core::{Commit, DocKey, Spans};
use vellum_store::Transaction;

use crate::error::{QueryError, QueryResult};
use crate::mapper::{
    CommitSelect, Doc, Limit, MappingArena, OrderBy, OrderCondition, COMMIT_HEIGHT_FIELD,
};
use crate::request::{CommitQueryKind, OrderDirection};

use super::dag_scan::{commit_doc, DagScanNode};
use super::limit::LimitNode;
use super::node::{Node, PlanNode};
use super::order::OrderNode;

/// Executes one commit select, standalone or as a per-row history child
/// of a document select.
///
/// The inner plan is built at start time, once the target document key
/// is known:
///
/// - `One` fetches the named block directly, no traversal
/// - `All` is a bare DAG scan
/// - `Latest` wraps the DAG scan in an order on height descending and a
///   limit of one
pub struct CommitSelectNode {
    txn: Arc<dyn Transaction>,
    arena: Arc<MappingArena>,
    select: CommitSelect,
    doc_key: Option<DocKey>,
    inner: Option<Box<Node>>,
    pending: Option<Doc>,
}

impl CommitSelectNode {
    pub(crate) fn new(
        txn: Arc<dyn Transaction>,
        arena: Arc<MappingArena>,
        select: CommitSelect,
    ) -> Self {
        let doc_key = select.doc_key.clone();
        Self { txn, arena, select, doc_key, inner: None, pending: None }
    }

    /// Retargets the select at another document, for per-row children.
    pub(crate) fn set_doc_key(&mut self, doc_key: DocKey) {
        self.doc_key = Some(doc_key);
    }

    fn dag_scan(&self) -> DagScanNode {
        DagScanNode::new(
            Arc::clone(&self.txn),
            Arc::clone(&self.arena),
            self.select.mapping,
            self.doc_key.clone(),
            self.select.field_name.clone(),
        )
    }

    fn latest_plan(&self) -> Node {
        let height_index = self
            .arena
            .get(self.select.mapping)
            .first_index_of(COMMIT_HEIGHT_FIELD)
            .unwrap_or(0);
        let order = OrderBy {
            conditions: vec![OrderCondition {
                fields: vec![height_index],
                direction: OrderDirection::Desc,
            }],
        };
        let ordered = Node::Order(OrderNode::new(Node::DagScan(self.dag_scan()), order));
        Node::Limit(LimitNode::new(ordered, Limit { limit: Some(1), offset: 0 }))
    }
}

impl PlanNode for CommitSelectNode {
    fn init(&mut self) -> QueryResult<()> {
        self.inner = None;
        self.pending = None;
        Ok(())
    }

    fn start(&mut self) -> QueryResult<()> {
        match self.select.kind {
            CommitQueryKind::One => {
                let cid = self.select.cid.ok_or_else(|| {
                    QueryError::InvalidRequest(
                        "a single-commit query names the commit cid".to_owned(),
                    )
                })?;
                let bytes = self.txn.get_block(&cid)?;
                let commit = Commit::decode_block(cid, &bytes)?;
                self.pending = Some(commit_doc(&self.arena, self.select.mapping, &commit));
                Ok(())
            }
            CommitQueryKind::All => {
                let mut inner = Box::new(Node::DagScan(self.dag_scan()));
                inner.init()?;
                inner.start()?;
                self.inner = Some(inner);
                Ok(())
            }
            CommitQueryKind::Latest => {
                let mut inner = Box::new(self.latest_plan());
                inner.init()?;
                inner.start()?;
                self.inner = Some(inner);
                Ok(())
            }
        }
    }

    fn spans(&mut self, _spans: Spans) {}

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        if let Some(doc) = self.pending.take() {
            return Ok(Some(doc));
        }
        match &mut self.inner {
            Some(inner) => inner.next(),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.pending = None;
        if let Some(mut inner) = self.inner.take() {
            inner.close()?;
        }
        Ok(())
    }
}
