//! Key spans scoping what a scan reads.
//!
//! A [`Span`] is a half-open byte-key range `[start, end)`. Scans receive a
//! set of spans before starting and only surface rows whose keys fall
//! inside one of them. An empty `end` means the span is unbounded above.

use serde::{Deserialize, Serialize};

use crate::cid::Cid;
use crate::keys::prefix_end;
use crate::types::DocKey;

/// A half-open byte-key range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    start: Vec<u8>,
    end: Vec<u8>,
}

impl Span {
    /// Creates a span from explicit start and end keys.
    #[must_use]
    pub fn new(start: Vec<u8>, end: Vec<u8>) -> Self {
        Self { start, end }
    }

    /// Creates a span covering every key beginning with `prefix`.
    #[must_use]
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let end = prefix_end(&prefix);
        Self { start: prefix, end }
    }

    /// The inclusive start key.
    #[inline]
    #[must_use]
    pub fn start(&self) -> &[u8] {
        &self.start
    }

    /// The exclusive end key. Empty means unbounded above.
    #[inline]
    #[must_use]
    pub fn end(&self) -> &[u8] {
        &self.end
    }

    /// Returns true if `key` falls inside this span.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && (self.end.is_empty() || key < self.end.as_slice())
    }
}

/// An ordered set of spans targeted by one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spans(Vec<Span>);

impl Spans {
    /// Creates an empty span set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a span set with a single span.
    #[must_use]
    pub fn single(span: Span) -> Self {
        Self(vec![span])
    }

    /// Adds a span to the set.
    pub fn push(&mut self, span: Span) {
        self.0.push(span);
    }

    /// Returns the spans in order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[Span] {
        &self.0
    }

    /// Returns true if no spans have been set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `key` falls inside any span in the set.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.0.iter().any(|s| s.contains(key))
    }
}

impl From<Vec<Span>> for Spans {
    fn from(spans: Vec<Span>) -> Self {
        Self(spans)
    }
}

/// The target of a head-set or DAG scan: a document/field composite key
/// plus an optional explicit CID.
///
/// When `cid` is set the DAG scan skips head resolution and fetches the
/// named block directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadSpan {
    /// The document whose history is scanned.
    pub doc_key: DocKey,
    /// The field whose CRDT heads are resolved. The composite-register
    /// head of the whole document uses the empty string.
    pub field_name: String,
    /// An explicit commit to start from, if any.
    pub cid: Option<Cid>,
}

impl HeadSpan {
    /// Creates a head span for a document field.
    #[must_use]
    pub fn new(doc_key: DocKey, field_name: impl Into<String>) -> Self {
        Self { doc_key, field_name: field_name.into(), cid: None }
    }

    /// Sets an explicit CID to start from.
    #[must_use]
    pub fn with_cid(mut self, cid: Cid) -> Self {
        self.cid = Some(cid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_span_contains_extensions() {
        let span = Span::prefix(vec![0x01, 0x02]);
        assert!(span.contains(&[0x01, 0x02]));
        assert!(span.contains(&[0x01, 0x02, 0xff]));
        assert!(!span.contains(&[0x01, 0x03]));
        assert!(!span.contains(&[0x01, 0x01, 0xff]));
    }

    #[test]
    fn unbounded_end() {
        let span = Span::new(vec![0x05], Vec::new());
        assert!(span.contains(&[0xff, 0xff]));
        assert!(!span.contains(&[0x04]));
    }

    #[test]
    fn span_set_union() {
        let mut spans = Spans::new();
        spans.push(Span::prefix(vec![0x01]));
        spans.push(Span::prefix(vec![0x03]));
        assert!(spans.contains(&[0x01, 0xaa]));
        assert!(spans.contains(&[0x03]));
        assert!(!spans.contains(&[0x02]));
    }
}
