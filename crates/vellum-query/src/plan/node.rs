//! The plan node interface and the closed node set.

use vellum_core::{Spans, Value};

use crate::error::QueryResult;
use crate::mapper::Doc;

use super::aggregate::{AverageNode, CountNode, ExtremaNode, SumNode};
use super::commit::CommitSelectNode;
use super::dag_scan::DagScanNode;
use super::group::GroupNode;
use super::limit::LimitNode;
use super::multi_scan::MultiScanNode;
use super::order::OrderNode;
use super::parallel::ParallelNode;
use super::scan::ScanNode;
use super::type_join::TypeIndexJoinNode;

/// The common lifecycle of every plan node.
pub trait PlanNode {
    /// Configures the node's fetchers. May be called again to re-target
    /// the node.
    fn init(&mut self) -> QueryResult<()>;

    /// Opens the node for iteration.
    fn start(&mut self) -> QueryResult<()>;

    /// Targets the node's leaf scans at the given key spans.
    fn spans(&mut self, spans: Spans);

    /// Pulls the next document, or `None` when exhausted.
    fn next(&mut self) -> QueryResult<Option<Doc>>;

    /// Releases the node.
    fn close(&mut self) -> QueryResult<()>;
}

/// The closed set of plan node kinds.
///
/// Plans compose these variants directly rather than boxing a trait
/// object, keeping dispatch exhaustive: adding a node kind forces every
/// match in this module to acknowledge it.
pub enum Node {
    /// Leaf collection scan.
    Scan(ScanNode),
    /// A reader handle over a shared scan cursor.
    MultiScan(MultiScanNode),
    /// Relation join.
    TypeJoin(Box<TypeIndexJoinNode>),
    /// Fan-out over a shared source with result merging.
    Parallel(Box<ParallelNode>),
    /// Buffering comparison sort.
    Order(OrderNode),
    /// Grouping into `_group` children.
    Group(GroupNode),
    /// Row limit and offset.
    Limit(LimitNode),
    /// Element count aggregate.
    Count(CountNode),
    /// Sum aggregate.
    Sum(SumNode),
    /// Average over sum and count dependencies.
    Average(AverageNode),
    /// Min/max aggregate.
    Extrema(ExtremaNode),
    /// Commit DAG traversal for one document.
    DagScan(DagScanNode),
    /// A commit query (latest / all / one).
    CommitSelect(CommitSelectNode),
}

macro_rules! delegate {
    ($self:ident, $node:ident => $call:expr) => {
        match $self {
            Node::Scan($node) => $call,
            Node::MultiScan($node) => $call,
            Node::TypeJoin($node) => $call,
            Node::Parallel($node) => $call,
            Node::Order($node) => $call,
            Node::Group($node) => $call,
            Node::Limit($node) => $call,
            Node::Count($node) => $call,
            Node::Sum($node) => $call,
            Node::Average($node) => $call,
            Node::Extrema($node) => $call,
            Node::DagScan($node) => $call,
            Node::CommitSelect($node) => $call,
        }
    };
}

impl PlanNode for Node {
    fn init(&mut self) -> QueryResult<()> {
        delegate!(self, node => node.init())
    }

    fn start(&mut self) -> QueryResult<()> {
        delegate!(self, node => node.start())
    }

    fn spans(&mut self, spans: Spans) {
        delegate!(self, node => node.spans(spans));
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        delegate!(self, node => node.next())
    }

    fn close(&mut self) -> QueryResult<()> {
        delegate!(self, node => node.close())
    }
}

impl Node {
    /// Pushes an equality condition onto the leaf scan feeding this
    /// node. Used by joins to constrain the child side by foreign key.
    ///
    /// Returns false if no scan is reachable (commit pipelines).
    pub(crate) fn set_scan_filter_condition(&mut self, index: usize, value: Value) -> bool {
        match self {
            Node::Scan(scan) => {
                scan.set_filter_condition(index, value);
                true
            }
            Node::MultiScan(node) => node.set_scan_filter_condition(index, value),
            Node::TypeJoin(node) => node.root_mut().set_scan_filter_condition(index, value),
            Node::Parallel(node) => node.source_mut().set_scan_filter_condition(index, value),
            Node::Order(node) => node.source_mut().set_scan_filter_condition(index, value),
            Node::Group(node) => node.source_mut().set_scan_filter_condition(index, value),
            Node::Limit(node) => node.source_mut().set_scan_filter_condition(index, value),
            Node::Count(node) => node.source_mut().set_scan_filter_condition(index, value),
            Node::Sum(node) => node.source_mut().set_scan_filter_condition(index, value),
            Node::Average(node) => node.source_mut().set_scan_filter_condition(index, value),
            Node::Extrema(node) => node.source_mut().set_scan_filter_condition(index, value),
            Node::DagScan(_) | Node::CommitSelect(_) => false,
        }
    }
}
