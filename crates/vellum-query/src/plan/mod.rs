//! The execution plan tree.
//!
//! Plans are single-threaded, pull-based pipelines. Each node follows
//! the same lifecycle:
//!
//! 1. `spans` (optional) targets the leaf scans at key ranges
//! 2. `init` configures fetchers
//! 3. `start` opens them
//! 4. `next` pulls one document at a time until `None`
//! 5. `close` releases the node
//!
//! The node set is closed: every plan is a composition of the variants
//! of [`Node`], built by the [`Planner`] from a compiled query.

mod aggregate;
mod commit;
mod dag_scan;
mod group;
mod head_set;
mod limit;
mod multi_scan;
mod node;
mod order;
mod parallel;
mod planner;
mod scan;
mod type_join;

pub use commit::CommitSelectNode;
pub use dag_scan::DagScanNode;
pub use group::{GroupChild, GroupNode};
pub use head_set::HeadSetScanNode;
pub use multi_scan::{MultiScanNode, SharedScanCursor};
pub use node::{Node, PlanNode};
pub use planner::{Executor, Planner};
pub use scan::ScanNode;
pub use type_join::TypeIndexJoinNode;
