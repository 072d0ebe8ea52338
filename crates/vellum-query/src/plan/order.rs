//! Buffering comparison sort.

use std::cmp::Ordering;

use vellum_core::{Spans, Value};

use crate::error::QueryResult;
use crate::mapper::{Doc, DocValue, OrderBy};
use crate::request::OrderDirection;

use super::node::{Node, PlanNode};

/// Sorts the source's full output before yielding anything.
///
/// There is no upstream order to merge against, so the node buffers
/// every row, sorts once, and replays. The sort is stable: rows equal
/// under every condition keep their source order.
pub struct OrderNode {
    source: Box<Node>,
    order: OrderBy,
    buffered: Option<std::vec::IntoIter<Doc>>,
}

impl OrderNode {
    pub(crate) fn new(source: Node, order: OrderBy) -> Self {
        Self { source: Box::new(source), order, buffered: None }
    }

    pub(crate) fn source_mut(&mut self) -> &mut Node {
        &mut self.source
    }
}

impl PlanNode for OrderNode {
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
            sort_docs(&self.order, &mut docs);
            self.buffered = Some(docs.into_iter());
        }
        Ok(self.buffered.as_mut().and_then(Iterator::next))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.buffered = None;
        self.source.close()
    }
}

/// Stable-sorts documents under an ordering. Shared with the group
/// stage, which orders group members without a dedicated plan node.
pub(crate) fn sort_docs(order: &OrderBy, docs: &mut [Doc]) {
    docs.sort_by(|a, b| compare_docs(order, a, b));
}

static NULL: Value = Value::Null;

fn compare_docs(order: &OrderBy, a: &Doc, b: &Doc) -> Ordering {
    for condition in &order.conditions {
        let left = path_value(a, &condition.fields).unwrap_or(&NULL);
        let right = path_value(b, &condition.fields).unwrap_or(&NULL);
        // Incomparable pairs tie rather than abort the sort.
        let ordering = left.compare(right).unwrap_or(Ordering::Equal);
        let ordering = match condition.direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Resolves an index path against a document, descending through child
/// documents. On a many-valued slot the first child decides.
fn path_value<'a>(doc: &'a Doc, path: &[usize]) -> Option<&'a Value> {
    let (&first, rest) = path.split_first()?;
    match doc.get(first)? {
        DocValue::Value(value) => {
            if rest.is_empty() {
                Some(value)
            } else {
                None
            }
        }
        DocValue::Doc(child) => path_value(child, rest),
        DocValue::Docs(children) => children.first().and_then(|c| path_value(c, rest)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::OrderCondition;

    fn doc(values: Vec<Value>) -> Doc {
        let mut doc = Doc::with_width(values.len());
        for (i, v) in values.into_iter().enumerate() {
            doc.set_value(i, v);
        }
        doc
    }

    fn order(conditions: Vec<(Vec<usize>, OrderDirection)>) -> OrderBy {
        OrderBy {
            conditions: conditions
                .into_iter()
                .map(|(fields, direction)| OrderCondition { fields, direction })
                .collect(),
        }
    }

    #[test]
    fn sorts_by_first_non_equal_condition() {
        let mut docs = vec![
            doc(vec![Value::Int(1), Value::String("b".into())]),
            doc(vec![Value::Int(1), Value::String("a".into())]),
            doc(vec![Value::Int(0), Value::String("z".into())]),
        ];
        let order = order(vec![
            (vec![0], OrderDirection::Asc),
            (vec![1], OrderDirection::Asc),
        ]);
        sort_docs(&order, &mut docs);
        assert_eq!(docs[0].value(1), Some(&Value::String("z".into())));
        assert_eq!(docs[1].value(1), Some(&Value::String("a".into())));
        assert_eq!(docs[2].value(1), Some(&Value::String("b".into())));
    }

    #[test]
    fn descending_flips_the_comparison() {
        let mut docs = vec![doc(vec![Value::Int(1)]), doc(vec![Value::Int(3)])];
        sort_docs(&order(vec![(vec![0], OrderDirection::Desc)]), &mut docs);
        assert_eq!(docs[0].value(0), Some(&Value::Int(3)));
    }

    #[test]
    fn ties_keep_source_order() {
        let mut a = doc(vec![Value::Int(1)]);
        a.set_value(1, Value::String("first".into()));
        let mut b = doc(vec![Value::Int(1)]);
        b.set_value(1, Value::String("second".into()));

        let mut docs = vec![a, b];
        sort_docs(&order(vec![(vec![0], OrderDirection::Asc)]), &mut docs);
        assert_eq!(docs[0].value(1), Some(&Value::String("first".into())));
    }

    #[test]
    fn paths_descend_into_children() {
        let mut child = Doc::with_width(1);
        child.set_value(0, Value::Float(4.8));
        let mut parent = Doc::with_width(2);
        parent.set(1, DocValue::Docs(vec![child]));
        assert_eq!(path_value(&parent, &[1, 0]), Some(&Value::Float(4.8)));
        // Null slots compare below everything rather than erroring.
        assert_eq!(path_value(&parent, &[0, 0]), None);
    }
}
