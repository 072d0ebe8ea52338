//! In-memory reference store.
//!
//! [`MemoryStore`] keeps the primary keyspace in an ordered map and blocks
//! in a hash map. Transactions are cheap snapshots: reads during one plan
//! execution never observe later writes. This backend exists for tests
//! and embedded hosts; durability is explicitly out of scope.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;

use vellum_core::{
    keys, Cid, CollectionDescription, Commit, CommitLink, DocKey, FieldDescription,
    IndexDescription, Span, Spans, Value,
};

use crate::error::StoreError;
use crate::traits::{DocumentFetcher, HeadFetcher, KeyValue, Transaction};

/// An in-memory document and block store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    /// The primary keyspace: document data and head-tracking keys.
    kv: BTreeMap<Vec<u8>, Vec<u8>>,
    /// The content-addressed block store.
    blocks: HashMap<Cid, Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a document's field values under the collection's default
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the payload cannot be encoded.
    pub fn insert_document(
        &mut self,
        collection: &CollectionDescription,
        doc_key: &DocKey,
        fields: HashMap<String, Value>,
    ) -> Result<(), StoreError> {
        let key = keys::data_key(collection.id, collection.primary_index().id, doc_key);
        let payload = serde_json::to_vec(&fields)?;
        self.kv.insert(key, payload);
        Ok(())
    }

    /// Stores a block and returns its CID.
    pub fn put_block(&mut self, bytes: Vec<u8>) -> Cid {
        let cid = Cid::hash(&bytes);
        self.blocks.insert(cid, bytes);
        cid
    }

    /// Replaces the head set of a `(doc_key, field_name)` pair with a
    /// single CID.
    pub fn set_head(&mut self, doc_key: &DocKey, field_name: &str, cid: Cid) {
        let prefix = keys::head_prefix(doc_key, field_name);
        let end = keys::prefix_end(&prefix);
        let stale: Vec<Vec<u8>> = self
            .kv
            .range((Bound::Included(prefix.clone()), upper_bound(&end)))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            self.kv.remove(&key);
        }
        self.kv.insert(keys::head_key(doc_key, field_name, &cid), Vec::new());
    }

    /// Appends a commit to a document field's history: encodes the block,
    /// links it to the previous head (if any) and advances the head.
    ///
    /// Returns the new commit's CID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the previous head block cannot
    /// be decoded.
    pub fn write_commit(
        &mut self,
        doc_key: &DocKey,
        field_name: &str,
        delta: &[u8],
    ) -> Result<Cid, StoreError> {
        let prefix = keys::head_prefix(doc_key, field_name);
        let end = keys::prefix_end(&prefix);
        let prev = self
            .kv
            .range((Bound::Included(prefix.clone()), upper_bound(&end)))
            .next()
            .and_then(|(k, _)| keys::cid_from_head_key(&prefix, k));

        let (height, links) = match prev {
            Some(prev_cid) => {
                let block = self
                    .blocks
                    .get(&prev_cid)
                    .ok_or_else(|| StoreError::BlockNotFound(prev_cid.to_string()))?;
                let commit = Commit::decode_block(prev_cid, block)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                (
                    commit.height + 1,
                    vec![CommitLink { name: "_head".to_owned(), cid: prev_cid }],
                )
            }
            None => (1, Vec::new()),
        };

        let bytes = Commit::encode_block(height, delta, &links)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let cid = self.put_block(bytes);
        self.set_head(doc_key, field_name, cid);
        Ok(cid)
    }

    /// Begins a read transaction over a snapshot of the current state.
    #[must_use]
    pub fn begin(&self) -> MemoryTransaction {
        MemoryTransaction {
            kv: Arc::new(self.kv.clone()),
            blocks: Arc::new(self.blocks.clone()),
        }
    }
}

/// A snapshot read transaction over a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryTransaction {
    kv: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
    blocks: Arc<HashMap<Cid, Vec<u8>>>,
}

fn upper_bound(end: &[u8]) -> Bound<Vec<u8>> {
    if end.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Excluded(end.to_vec())
    }
}

impl Transaction for MemoryTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.kv.get(key).cloned())
    }

    fn iterate(&self, span: &Span, reverse: bool) -> Result<Vec<KeyValue>, StoreError> {
        let range = (
            Bound::Included(span.start().to_vec()),
            upper_bound(span.end()),
        );
        let mut rows: Vec<KeyValue> =
            self.kv.range(range).map(|(k, v)| (k.clone(), v.clone())).collect();
        if reverse {
            rows.reverse();
        }
        Ok(rows)
    }

    fn get_block(&self, cid: &Cid) -> Result<Vec<u8>, StoreError> {
        self.blocks
            .get(cid)
            .cloned()
            .ok_or_else(|| StoreError::BlockNotFound(cid.to_string()))
    }

    fn document_fetcher(&self) -> Box<dyn DocumentFetcher> {
        Box::new(MemoryDocumentFetcher::default())
    }

    fn head_fetcher(&self) -> Box<dyn HeadFetcher> {
        Box::new(MemoryHeadFetcher::default())
    }
}

/// A document fetcher that snapshots the span range at `start`.
#[derive(Debug, Default)]
struct MemoryDocumentFetcher {
    /// Collection prefix for the configured index, set by `init`.
    prefix: Option<Vec<u8>>,
    reverse: bool,
    rows: VecDeque<KeyValue>,
    started: bool,
}

impl DocumentFetcher for MemoryDocumentFetcher {
    fn init(
        &mut self,
        collection: &CollectionDescription,
        index: &IndexDescription,
        _fields: &[FieldDescription],
        reverse: bool,
    ) -> Result<(), StoreError> {
        self.prefix = Some(keys::collection_prefix(collection.id, index.id));
        self.reverse = reverse;
        self.rows.clear();
        self.started = false;
        Ok(())
    }

    fn start(&mut self, txn: &dyn Transaction, spans: &Spans) -> Result<(), StoreError> {
        if self.prefix.is_none() {
            return Err(StoreError::NotStarted("init"));
        }
        self.rows.clear();
        let mut ordered: Vec<&Span> = spans.as_slice().iter().collect();
        if self.reverse {
            ordered.reverse();
        }
        for span in ordered {
            self.rows.extend(txn.iterate(span, self.reverse)?);
        }
        self.started = true;
        Ok(())
    }

    fn fetch_next_map(
        &mut self,
    ) -> Result<Option<(DocKey, HashMap<String, Value>)>, StoreError> {
        if !self.started {
            return Err(StoreError::NotStarted("start"));
        }
        let prefix = self.prefix.as_deref().unwrap_or_default();
        while let Some((key, payload)) = self.rows.pop_front() {
            let Some(doc_key) = keys::doc_key_from_data_key(prefix, &key) else {
                // Key from another keyspace leaked into the span; skip it.
                continue;
            };
            let fields: HashMap<String, Value> = serde_json::from_slice(&payload)?;
            return Ok(Some((doc_key, fields)));
        }
        Ok(None)
    }
}

/// A head fetcher that snapshots the head span at `start`.
#[derive(Debug, Default)]
struct MemoryHeadFetcher {
    cids: VecDeque<Cid>,
    started: bool,
}

impl HeadFetcher for MemoryHeadFetcher {
    fn start(&mut self, txn: &dyn Transaction, span: &Span) -> Result<(), StoreError> {
        self.cids.clear();
        let prefix = span.start().to_vec();
        for (key, _) in txn.iterate(span, false)? {
            let cid = keys::cid_from_head_key(&prefix, &key)
                .ok_or_else(|| StoreError::Corrupt("malformed head key".to_owned()))?;
            self.cids.push_back(cid);
        }
        self.started = true;
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Cid>, StoreError> {
        if !self.started {
            return Err(StoreError::NotStarted("start"));
        }
        Ok(self.cids.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::{FieldKind, Span};

    fn authors() -> CollectionDescription {
        CollectionDescription::new(
            "Author",
            1,
            vec![
                FieldDescription::scalar("name", 1, FieldKind::String),
                FieldDescription::scalar("age", 2, FieldKind::Int),
            ],
        )
    }

    fn doc(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    #[test]
    fn fetch_documents_in_key_order() {
        let col = authors();
        let mut store = MemoryStore::new();
        store
            .insert_document(&col, &DocKey::new("b"), doc(&[("name", "B".into())]))
            .unwrap();
        store
            .insert_document(&col, &DocKey::new("a"), doc(&[("name", "A".into())]))
            .unwrap();

        let txn = store.begin();
        let mut fetcher = txn.document_fetcher();
        fetcher.init(&col, col.primary_index(), &col.fields, false).unwrap();
        let spans =
            Spans::single(Span::prefix(keys::collection_prefix(col.id, 0)));
        fetcher.start(&txn, &spans).unwrap();

        let (k1, _) = fetcher.fetch_next_map().unwrap().unwrap();
        let (k2, _) = fetcher.fetch_next_map().unwrap().unwrap();
        assert_eq!(k1.as_str(), "a");
        assert_eq!(k2.as_str(), "b");
        assert!(fetcher.fetch_next_map().unwrap().is_none());
    }

    #[test]
    fn reverse_fetch() {
        let col = authors();
        let mut store = MemoryStore::new();
        for key in ["a", "b", "c"] {
            store
                .insert_document(&col, &DocKey::new(key), doc(&[("name", key.into())]))
                .unwrap();
        }
        let txn = store.begin();
        let mut fetcher = txn.document_fetcher();
        fetcher.init(&col, col.primary_index(), &col.fields, true).unwrap();
        fetcher
            .start(&txn, &Spans::single(Span::prefix(keys::collection_prefix(col.id, 0))))
            .unwrap();
        let (k, _) = fetcher.fetch_next_map().unwrap().unwrap();
        assert_eq!(k.as_str(), "c");
    }

    #[test]
    fn snapshot_isolation() {
        let col = authors();
        let mut store = MemoryStore::new();
        store
            .insert_document(&col, &DocKey::new("a"), doc(&[("name", "A".into())]))
            .unwrap();
        let txn = store.begin();
        store
            .insert_document(&col, &DocKey::new("b"), doc(&[("name", "B".into())]))
            .unwrap();

        let span = Span::prefix(keys::collection_prefix(col.id, 0));
        assert_eq!(txn.iterate(&span, false).unwrap().len(), 1);
    }

    #[test]
    fn commit_chain_advances_heads() {
        let mut store = MemoryStore::new();
        let doc_key = DocKey::new("bae-1");

        let c1 = store.write_commit(&doc_key, "rating", b"v1").unwrap();
        let c2 = store.write_commit(&doc_key, "rating", b"v2").unwrap();
        assert_ne!(c1, c2);

        let txn = store.begin();
        let mut heads = txn.head_fetcher();
        let prefix = keys::head_prefix(&doc_key, "rating");
        heads.start(&txn, &Span::prefix(prefix)).unwrap();
        assert_eq!(heads.fetch_next().unwrap(), Some(c2));
        assert_eq!(heads.fetch_next().unwrap(), None);

        let block = txn.get_block(&c2).unwrap();
        let commit = Commit::decode_block(c2, &block).unwrap();
        assert_eq!(commit.height, 2);
        assert_eq!(commit.head_link(), Some(c1));
    }

    #[test]
    fn missing_block_errors() {
        let store = MemoryStore::new();
        let txn = store.begin();
        let err = txn.get_block(&Cid::hash(b"nope")).unwrap_err();
        assert!(matches!(err, StoreError::BlockNotFound(_)));
    }
}
