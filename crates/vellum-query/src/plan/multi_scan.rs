//! Shared scan fan-out.
//!
//! When several plan branches consume the same underlying scan (two
//! joins over one collection, for instance), the scan must advance once
//! per logical row, not once per branch. [`SharedScanCursor`] owns the
//! scan and hands each branch a [`MultiScanNode`] reader: the cursor
//! advances the source on the first reader call of each round and
//! replays the buffered document to the remaining readers.

use std::cell::RefCell;
use std::rc::Rc;

use vellum_core::{Spans, Value};

use crate::error::QueryResult;
use crate::mapper::Doc;

use super::node::{Node, PlanNode};

/// The owning side of a shared scan. Plans are single-threaded, so the
/// cursor is reference-counted, not synchronized.
pub struct SharedScanCursor {
    source: Box<Node>,
    readers: usize,
    calls: usize,
    current: Option<Doc>,
    done: bool,
    initialized: bool,
    started: bool,
    closed: bool,
}

impl SharedScanCursor {
    /// Wraps a source scan for sharing. Readers are created with
    /// [`MultiScanNode::reader`].
    #[must_use]
    pub fn share(source: Node) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            source: Box::new(source),
            readers: 0,
            calls: 0,
            current: None,
            done: false,
            initialized: false,
            started: false,
            closed: false,
        }))
    }

    fn init_once(&mut self) -> QueryResult<()> {
        if !self.initialized {
            self.source.init()?;
            self.initialized = true;
        }
        Ok(())
    }

    fn start_once(&mut self) -> QueryResult<()> {
        if !self.started {
            self.source.start()?;
            self.started = true;
        }
        Ok(())
    }

    fn next_for_reader(&mut self) -> QueryResult<Option<Doc>> {
        if self.calls % self.readers == 0 {
            self.current = if self.done { None } else { self.source.next()? };
            if self.current.is_none() {
                self.done = true;
            }
        }
        self.calls += 1;
        Ok(self.current.clone())
    }

    fn close_once(&mut self) -> QueryResult<()> {
        if !self.closed {
            self.source.close()?;
            self.closed = true;
        }
        Ok(())
    }
}

/// One branch's handle on a [`SharedScanCursor`].
pub struct MultiScanNode {
    cursor: Rc<RefCell<SharedScanCursor>>,
}

impl MultiScanNode {
    /// Registers a new reader on the cursor.
    #[must_use]
    pub fn reader(cursor: &Rc<RefCell<SharedScanCursor>>) -> Self {
        cursor.borrow_mut().readers += 1;
        Self { cursor: Rc::clone(cursor) }
    }

    pub(crate) fn set_scan_filter_condition(&mut self, index: usize, value: Value) -> bool {
        self.cursor.borrow_mut().source.set_scan_filter_condition(index, value)
    }
}

impl PlanNode for MultiScanNode {
    fn init(&mut self) -> QueryResult<()> {
        self.cursor.borrow_mut().init_once()
    }

    fn start(&mut self) -> QueryResult<()> {
        self.cursor.borrow_mut().start_once()
    }

    fn spans(&mut self, spans: Spans) {
        // Span assignment is idempotent across readers.
        self.cursor.borrow_mut().source.spans(spans);
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        self.cursor.borrow_mut().next_for_reader()
    }

    fn close(&mut self) -> QueryResult<()> {
        self.cursor.borrow_mut().close_once()
    }
}
