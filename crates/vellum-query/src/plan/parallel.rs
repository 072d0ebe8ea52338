//! Fan-out over a shared source.
//!
//! When a select carries several joins, or commit-history children, the
//! branches share one underlying scan (see
//! [`SharedScanCursor`](super::SharedScanCursor)). The parallel node
//! drives the branches in lockstep and merges their results:
//!
//! - merge branches each yield the full root document with their own
//!   relation slot populated; the populated slot is copied into the
//!   output row
//! - append branches (commit selects) are restarted per row with the
//!   row's document key and drained into a list slot

use vellum_core::{DocKey, Spans, Value};

use crate::error::QueryResult;
use crate::mapper::{Doc, DocValue};

use super::commit::CommitSelectNode;
use super::node::{Node, PlanNode};

/// Merges the outputs of branches that share one scan.
pub struct ParallelNode {
    source: Box<Node>,
    merges: Vec<(Node, usize)>,
    appends: Vec<(CommitSelectNode, usize)>,
    root_key_index: usize,
}

impl ParallelNode {
    pub(crate) fn new(
        source: Node,
        merges: Vec<(Node, usize)>,
        appends: Vec<(CommitSelectNode, usize)>,
        root_key_index: usize,
    ) -> Self {
        Self { source: Box::new(source), merges, appends, root_key_index }
    }

    pub(crate) fn source_mut(&mut self) -> &mut Node {
        &mut self.source
    }
}

impl PlanNode for ParallelNode {
    fn init(&mut self) -> QueryResult<()> {
        self.source.init()?;
        for (node, _) in &mut self.merges {
            node.init()?;
        }
        Ok(())
    }

    fn start(&mut self) -> QueryResult<()> {
        self.source.start()?;
        for (node, _) in &mut self.merges {
            node.start()?;
        }
        Ok(())
    }

    fn spans(&mut self, spans: Spans) {
        // The branches share a cursor; assignment is idempotent.
        self.source.spans(spans.clone());
        for (node, _) in &mut self.merges {
            node.spans(spans.clone());
        }
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        let Some(mut doc) = self.source.next()? else {
            return Ok(None);
        };
        for (node, index) in &mut self.merges {
            if let Some(branch) = node.next()? {
                if let Some(slot) = branch.get(*index) {
                    doc.set(*index, slot.clone());
                }
            }
        }
        for (node, index) in &mut self.appends {
            let Some(key) = doc.value(self.root_key_index).and_then(Value::as_str) else {
                continue;
            };
            node.set_doc_key(DocKey::new(key));
            node.init()?;
            node.start()?;
            let mut commits = Vec::new();
            while let Some(commit) = node.next()? {
                commits.push(commit);
            }
            doc.set(*index, DocValue::Docs(commits));
        }
        Ok(Some(doc))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.source.close()?;
        for (node, _) in &mut self.merges {
            node.close()?;
        }
        for (node, _) in &mut self.appends {
            node.close()?;
        }
        Ok(())
    }
}
