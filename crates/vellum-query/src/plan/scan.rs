//! Leaf collection scan.

use std::sync::Arc;

use vellum_core::{keys, CollectionDescription, Span, Spans, Value};
use vellum_store::{DocumentFetcher, Transaction};

use crate::error::QueryResult;
use crate::filter::Filter;
use crate::mapper::{Doc, MappingArena, MappingId, DOC_KEY_FIELD};

use super::node::PlanNode;

/// Scans one collection's primary index within a set of key spans,
/// shaping each row into a mapped document and applying the scan-level
/// filter. Filter non-matches are skipped inside `next`; filter errors
/// are not.
pub struct ScanNode {
    txn: Arc<dyn Transaction>,
    collection: CollectionDescription,
    arena: Arc<MappingArena>,
    mapping: MappingId,
    filter: Option<Filter>,
    reverse: bool,
    spans: Spans,
    fetcher: Box<dyn DocumentFetcher>,
}

impl ScanNode {
    /// Creates a scan over the collection's full primary-index range.
    pub fn new(
        txn: Arc<dyn Transaction>,
        collection: CollectionDescription,
        arena: Arc<MappingArena>,
        mapping: MappingId,
        filter: Option<Filter>,
        reverse: bool,
    ) -> Self {
        let fetcher = txn.document_fetcher();
        let prefix =
            keys::collection_prefix(collection.id, collection.primary_index().id);
        Self {
            txn,
            collection,
            arena,
            mapping,
            filter,
            reverse,
            spans: Spans::single(Span::prefix(prefix)),
            fetcher,
        }
    }

    /// Pushes an equality condition onto the scan filter, replacing any
    /// previous condition on the same index.
    pub fn set_filter_condition(&mut self, index: usize, value: Value) {
        self.filter.get_or_insert_with(Filter::default).set_condition(index, value);
    }

    fn shape(&self, key: &str, values: std::collections::HashMap<String, Value>) -> Doc {
        let mapping = self.arena.get(self.mapping);
        let mut doc = Doc::with_width(mapping.width());
        for &index in mapping.indexes_of(DOC_KEY_FIELD) {
            doc.set_value(index, Value::String(key.to_owned()));
        }
        for (name, value) in values {
            for &index in mapping.indexes_of(&name) {
                // Relation slots belong to the join above this scan.
                if mapping.child(index).is_none() {
                    doc.set_value(index, value.clone());
                }
            }
        }
        doc
    }
}

impl PlanNode for ScanNode {
    fn init(&mut self) -> QueryResult<()> {
        self.fetcher.init(
            &self.collection,
            self.collection.primary_index(),
            &self.collection.fields,
            self.reverse,
        )?;
        Ok(())
    }

    fn start(&mut self) -> QueryResult<()> {
        tracing::trace!(collection = %self.collection.name, spans = self.spans.as_slice().len(), "scan start");
        self.fetcher.start(&*self.txn, &self.spans)?;
        Ok(())
    }

    fn spans(&mut self, spans: Spans) {
        self.spans = spans;
    }

    fn next(&mut self) -> QueryResult<Option<Doc>> {
        loop {
            let Some((key, values)) = self.fetcher.fetch_next_map()? else {
                return Ok(None);
            };
            let doc = self.shape(key.as_str(), values);
            match &self.filter {
                Some(filter) if !filter.matches(&doc)? => continue,
                _ => return Ok(Some(doc)),
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        Ok(())
    }
}
