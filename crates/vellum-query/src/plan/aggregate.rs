//! Aggregate plan nodes.
//!
//! Aggregates never re-query: they read the child lists (or scalar
//! arrays) already materialized on the document by the joins and group
//! stage below them, apply the target filter per element, and write the
//! result into their own slot. An average reads the sum and count slots
//! its dependencies wrote, so dependency nodes always sit deeper in the
//! chain.

use vellum_core::{Spans, Value};

use crate::error::QueryResult;
use crate::mapper::{Aggregate, Doc, DocValue};
use crate::request::AggregateKind;

use super::node::{Node, PlanNode};

/// The elements one aggregate target contributes.
enum Elements<'a> {
    /// A materialized child document list.
    Docs(&'a [Doc]),
    /// A scalar array's values.
    Scalars(&'a [Value]),
    /// Nothing materialized; contributes zero elements.
    None,
}

fn target_elements<'a>(doc: &'a Doc, host_index: usize) -> Elements<'a> {
    match doc.get(host_index) {
        Some(DocValue::Docs(docs)) => Elements::Docs(docs),
        Some(DocValue::Value(Value::Array(items))) => Elements::Scalars(items),
        _ => Elements::None,
    }
}

/// Counts elements across the aggregate's targets.
pub struct CountNode {
    source: Box<Node>,
    aggregate: Aggregate,
}

impl CountNode {
    pub(crate) fn new(source: Node, aggregate: Aggregate) -> Self {
        Self { source: Box::new(source), aggregate }
    }

    pub(crate) fn source_mut(&mut self) -> &mut Node {
        &mut self.source
    }
}

impl PlanNode for CountNode {
    fn init(&mut self) -> QueryResult<()> {
        self.source.init()
    }

    fn start(&mut self) -> QueryResult<()> {
        self.source.start()
    }

    fn spans(&mut self, spans: Spans) {
        self.source.spans(spans);
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        let Some(mut doc) = self.source.next()? else {
            return Ok(None);
        };
        let mut total: i64 = 0;
        for target in &self.aggregate.targets {
            match target_elements(&doc, target.host_index) {
                Elements::Docs(docs) => {
                    for child in docs {
                        match &target.filter {
                            Some(filter) if !filter.matches(child)? => {}
                            _ => total += 1,
                        }
                    }
                }
                Elements::Scalars(items) => {
                    total += i64::try_from(items.len()).unwrap_or(i64::MAX);
                }
                Elements::None => {}
            }
        }
        doc.set_value(self.aggregate.field.index, Value::Int(total));
        Ok(Some(doc))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.source.close()
    }
}

/// Sums the targeted child field (or scalar-array elements). The result
/// type was decided at compile time from the contributing field kinds.
pub struct SumNode {
    source: Box<Node>,
    aggregate: Aggregate,
}

impl SumNode {
    pub(crate) fn new(source: Node, aggregate: Aggregate) -> Self {
        Self { source: Box::new(source), aggregate }
    }

    pub(crate) fn source_mut(&mut self) -> &mut Node {
        &mut self.source
    }
}

impl PlanNode for SumNode {
    fn init(&mut self) -> QueryResult<()> {
        self.source.init()
    }

    fn start(&mut self) -> QueryResult<()> {
        self.source.start()
    }

    fn spans(&mut self, spans: Spans) {
        self.source.spans(spans);
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        let Some(mut doc) = self.source.next()? else {
            return Ok(None);
        };
        let mut float_total = 0.0f64;
        let mut int_total = 0i64;
        for target in &self.aggregate.targets {
            match target_elements(&doc, target.host_index) {
                Elements::Docs(docs) => {
                    for child in docs {
                        if let Some(filter) = &target.filter {
                            if !filter.matches(child)? {
                                continue;
                            }
                        }
                        let value = target
                            .child_index
                            .and_then(|index| child.value(index))
                            .cloned()
                            .unwrap_or(Value::Null);
                        accumulate(&value, &mut float_total, &mut int_total);
                    }
                }
                Elements::Scalars(items) => {
                    for item in items {
                        accumulate(item, &mut float_total, &mut int_total);
                    }
                }
                Elements::None => {}
            }
        }
        let result = if self.aggregate.float_result {
            Value::Float(float_total)
        } else {
            Value::Int(int_total)
        };
        doc.set_value(self.aggregate.field.index, result);
        Ok(Some(doc))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.source.close()
    }
}

fn accumulate(value: &Value, float_total: &mut f64, int_total: &mut i64) {
    if let Some(f) = value.as_numeric() {
        *float_total += f;
    }
    if let Some(i) = value.as_int() {
        *int_total = int_total.saturating_add(i);
    }
}

/// Divides the sum dependency by the count dependency. A zero count
/// yields `0.0`, never a division error.
pub struct AverageNode {
    source: Box<Node>,
    aggregate: Aggregate,
    sum_index: Option<usize>,
    count_index: Option<usize>,
}

impl AverageNode {
    pub(crate) fn new(source: Node, aggregate: Aggregate) -> Self {
        let sum_index = aggregate
            .dependencies
            .iter()
            .find(|d| d.kind == AggregateKind::Sum)
            .map(|d| d.index);
        let count_index = aggregate
            .dependencies
            .iter()
            .find(|d| d.kind == AggregateKind::Count)
            .map(|d| d.index);
        Self { source: Box::new(source), aggregate, sum_index, count_index }
    }

    pub(crate) fn source_mut(&mut self) -> &mut Node {
        &mut self.source
    }
}

impl PlanNode for AverageNode {
    fn init(&mut self) -> QueryResult<()> {
        self.source.init()
    }

    fn start(&mut self) -> QueryResult<()> {
        self.source.start()
    }

    fn spans(&mut self, spans: Spans) {
        self.source.spans(spans);
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        let Some(mut doc) = self.source.next()? else {
            return Ok(None);
        };
        let sum = self
            .sum_index
            .and_then(|i| doc.value(i))
            .and_then(Value::as_numeric)
            .unwrap_or(0.0);
        let count = self
            .count_index
            .and_then(|i| doc.value(i))
            .and_then(Value::as_int)
            .unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let average = if count <= 0 { 0.0 } else { sum / count as f64 };
        doc.set_value(self.aggregate.field.index, Value::Float(average));
        Ok(Some(doc))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.source.close()
    }
}

/// Tracks the smallest or largest contributing value. An empty target
/// set yields null.
pub struct ExtremaNode {
    source: Box<Node>,
    aggregate: Aggregate,
}

impl ExtremaNode {
    pub(crate) fn new(source: Node, aggregate: Aggregate) -> Self {
        Self { source: Box::new(source), aggregate }
    }

    pub(crate) fn source_mut(&mut self) -> &mut Node {
        &mut self.source
    }

    fn consider(&self, best: &mut Option<Value>, candidate: &Value) {
        if candidate.is_null() {
            return;
        }
        match best {
            None => *best = Some(candidate.clone()),
            Some(current) => {
                let replace = match current.compare(candidate) {
                    Some(ordering) => match self.aggregate.kind {
                        AggregateKind::Min => ordering == std::cmp::Ordering::Greater,
                        _ => ordering == std::cmp::Ordering::Less,
                    },
                    None => false,
                };
                if replace {
                    *best = Some(candidate.clone());
                }
            }
        }
    }
}

impl PlanNode for ExtremaNode {
    fn init(&mut self) -> QueryResult<()> {
        self.source.init()
    }

    fn start(&mut self) -> QueryResult<()> {
        self.source.start()
    }

    fn spans(&mut self, spans: Spans) {
        self.source.spans(spans);
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        let Some(mut doc) = self.source.next()? else {
            return Ok(None);
        };
        let mut best: Option<Value> = None;
        for target in &self.aggregate.targets {
            match target_elements(&doc, target.host_index) {
                Elements::Docs(docs) => {
                    for child in docs {
                        if let Some(filter) = &target.filter {
                            if !filter.matches(child)? {
                                continue;
                            }
                        }
                        if let Some(value) =
                            target.child_index.and_then(|index| child.value(index))
                        {
                            let value = value.clone();
                            self.consider(&mut best, &value);
                        }
                    }
                }
                Elements::Scalars(items) => {
                    for item in items {
                        let item = item.clone();
                        self.consider(&mut best, &item);
                    }
                }
                Elements::None => {}
            }
        }
        doc.set_value(self.aggregate.field.index, best.unwrap_or(Value::Null));
        Ok(Some(doc))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.source.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{AggregateTarget, Field};

    fn aggregate(kind: AggregateKind, host: usize, child: Option<usize>, out: usize) -> Aggregate {
        Aggregate {
            field: Field { index: out, name: kind.as_str().to_owned() },
            kind,
            targets: vec![AggregateTarget {
                host_index: host,
                child_index: child,
                filter: None,
            }],
            dependencies: Vec::new(),
            float_result: true,
        }
    }

    #[test]
    fn scalar_array_elements_count_directly() {
        let mut doc = Doc::with_width(2);
        doc.set_value(
            0,
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        );
        let agg = aggregate(AggregateKind::Count, 0, None, 1);

        let mut total = 0i64;
        for target in &agg.targets {
            if let Elements::Scalars(items) = target_elements(&doc, target.host_index) {
                total += items.len() as i64;
            }
        }
        assert_eq!(total, 3);
    }

    #[test]
    fn missing_host_contributes_nothing() {
        let doc = Doc::with_width(2);
        assert!(matches!(target_elements(&doc, 0), Elements::None));
    }
}
