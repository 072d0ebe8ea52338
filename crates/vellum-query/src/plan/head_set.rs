//! Head CID resolution.

use std::sync::Arc;

use vellum_core::{keys, DocKey, Span};
use vellum_store::{HeadFetcher, Transaction};

use crate::error::QueryResult;

/// Scans the head keyspace for one document/field composite key and
/// yields the current head CIDs. Feeds the DAG traversal its entry
/// points; not a plan node itself.
pub struct HeadSetScanNode {
    txn: Arc<dyn Transaction>,
    fetcher: Box<dyn HeadFetcher>,
    span: Option<Span>,
}

impl HeadSetScanNode {
    pub(crate) fn new(txn: Arc<dyn Transaction>) -> Self {
        let fetcher = txn.head_fetcher();
        Self { txn, fetcher, span: None }
    }

    /// Targets the scan at one document register.
    pub(crate) fn set_target(&mut self, doc_key: &DocKey, field_name: &str) {
        self.span = Some(Span::prefix(keys::head_prefix(doc_key, field_name)));
    }

    /// Opens the fetcher over the configured span. A start without a
    /// target leaves the scan empty.
    pub(crate) fn start(&mut self) -> QueryResult<()> {
        if let Some(span) = &self.span {
            tracing::trace!(?span, "starting head scan");
            self.fetcher.start(&*self.txn, span)?;
        }
        Ok(())
    }

    pub(crate) fn next(&mut self) -> QueryResult<Option<vellum_core::Cid>> {
        if self.span.is_none() {
            return Ok(None);
        }
        Ok(self.fetcher.fetch_next()?)
    }
}
