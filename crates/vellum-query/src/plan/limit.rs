//! Row limit and offset.

use vellum_core::Spans;

use crate::error::QueryResult;
use crate::mapper::{Doc, Limit};

use super::node::{Node, PlanNode};

/// Skips `offset` rows, then yields at most `limit` rows. The source is
/// not drained once the limit is reached.
pub struct LimitNode {
    source: Box<Node>,
    limit: Limit,
    returned: u64,
    skipped: u64,
}

impl LimitNode {
    pub(crate) fn new(source: Node, limit: Limit) -> Self {
        Self { source: Box::new(source), limit, returned: 0, skipped: 0 }
    }

    pub(crate) fn source_mut(&mut self) -> &mut Node {
        &mut self.source
    }
}

impl PlanNode for LimitNode {
    fn init(&mut self) -> QueryResult<()> {
        self.returned = 0;
        self.skipped = 0;
        self.source.init()
    }

    fn start(&mut self) -> QueryResult<()> {
        self.source.start()
    }

    fn spans(&mut self, spans: Spans) {
        self.source.spans(spans);
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        if self.limit.limit.is_some_and(|max| self.returned >= max) {
            return Ok(None);
        }
        loop {
            let Some(doc) = self.source.next()? else {
                return Ok(None);
            };
            if self.skipped < self.limit.offset {
                self.skipped += 1;
                continue;
            }
            self.returned += 1;
            return Ok(Some(doc));
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.source.close()
    }
}
