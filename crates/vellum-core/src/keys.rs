//! Key encoding for ordered storage.
//!
//! This module provides key encoding that preserves sort order for range
//! queries in key-value storage backends. Keys are designed to support
//! efficient prefix-based range scans.
//!
//! # Key Prefixes
//!
//! Different data types use different key prefixes to partition the
//! keyspace:
//!
//! - `0x01` - Document data: `[0x01][collection_id][index_id][doc_key]`
//! - `0x02` - Head tracking: `[0x02][doc_key]\0[field_name]\0[cid]`
//!
//! All numeric components are encoded in big-endian format to preserve
//! sort order. Commit blocks live in a separate content-addressed store
//! keyed by CID and do not appear in this keyspace.

use crate::cid::Cid;
use crate::types::DocKey;

/// Key prefix for primary document data.
pub const PREFIX_DATA: u8 = 0x01;
/// Key prefix for the head-tracking keyspace.
pub const PREFIX_HEAD: u8 = 0x02;

/// Separator between variable-length components of a head key.
///
/// Document keys and field names never contain a NUL byte, so the
/// separator keeps the encoding prefix-free.
const SEPARATOR: u8 = 0x00;

/// Encodes the key prefix covering every document of a collection under
/// one index.
///
/// The format is: `[PREFIX_DATA][collection_id BE][index_id BE]`.
#[must_use]
pub fn collection_prefix(collection_id: u32, index_id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(PREFIX_DATA);
    key.extend_from_slice(&collection_id.to_be_bytes());
    key.extend_from_slice(&index_id.to_be_bytes());
    key
}

/// Encodes the storage key for one document.
///
/// The format is: `[collection_prefix][doc_key bytes]`. Document keys sort
/// lexicographically within the collection prefix, which is the order a
/// scan yields rows in.
#[must_use]
pub fn data_key(collection_id: u32, index_id: u32, doc_key: &DocKey) -> Vec<u8> {
    let mut key = collection_prefix(collection_id, index_id);
    key.extend_from_slice(doc_key.as_bytes());
    key
}

/// Extracts the document key from a storage key, given the collection
/// prefix it was encoded under.
///
/// Returns `None` if the key is not under the prefix or the remainder is
/// not valid UTF-8.
#[must_use]
pub fn doc_key_from_data_key(prefix: &[u8], key: &[u8]) -> Option<DocKey> {
    let rest = key.strip_prefix(prefix)?;
    std::str::from_utf8(rest).ok().map(DocKey::new)
}

/// Encodes the head-keyspace prefix for a `(doc_key, field_name)` pair.
///
/// The format is: `[PREFIX_HEAD][doc_key]\0[field_name]\0`. Scanning this
/// prefix yields one entry per current head CID.
#[must_use]
pub fn head_prefix(doc_key: &DocKey, field_name: &str) -> Vec<u8> {
    let mut key =
        Vec::with_capacity(1 + doc_key.as_bytes().len() + field_name.len() + 2);
    key.push(PREFIX_HEAD);
    key.extend_from_slice(doc_key.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(field_name.as_bytes());
    key.push(SEPARATOR);
    key
}

/// Encodes a full head-tracking key for one head CID.
#[must_use]
pub fn head_key(doc_key: &DocKey, field_name: &str, cid: &Cid) -> Vec<u8> {
    let mut key = head_prefix(doc_key, field_name);
    key.extend_from_slice(cid.as_bytes());
    key
}

/// Extracts the head CID from a head-tracking key, given the prefix it was
/// encoded under.
#[must_use]
pub fn cid_from_head_key(prefix: &[u8], key: &[u8]) -> Option<Cid> {
    let rest = key.strip_prefix(prefix)?;
    Cid::from_slice(rest)
}

/// Computes the exclusive upper bound of the range of keys beginning with
/// `prefix`.
///
/// The bound is the prefix with its last non-`0xff` byte incremented and
/// everything after it truncated. An empty result means the range is
/// unbounded above (the prefix was empty or all `0xff`).
#[must_use]
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last == 0xff {
            end.pop();
        } else {
            *last += 1;
            return end;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_key_round_trip() {
        let doc = DocKey::new("bae-42");
        let prefix = collection_prefix(7, 0);
        let key = data_key(7, 0, &doc);
        assert!(key.starts_with(&prefix));
        assert_eq!(doc_key_from_data_key(&prefix, &key), Some(doc));
    }

    #[test]
    fn data_key_wrong_prefix() {
        let key = data_key(7, 0, &DocKey::new("bae-42"));
        let other = collection_prefix(8, 0);
        assert_eq!(doc_key_from_data_key(&other, &key), None);
    }

    #[test]
    fn head_key_round_trip() {
        let doc = DocKey::new("bae-1");
        let cid = Cid::hash(b"block");
        let prefix = head_prefix(&doc, "rating");
        let key = head_key(&doc, "rating", &cid);
        assert!(key.starts_with(&prefix));
        assert_eq!(cid_from_head_key(&prefix, &key), Some(cid));
    }

    #[test]
    fn prefix_end_increments() {
        assert_eq!(prefix_end(&[0x01, 0x02]), vec![0x01, 0x03]);
        assert_eq!(prefix_end(&[0x01, 0xff]), vec![0x02]);
        assert_eq!(prefix_end(&[0xff, 0xff]), Vec::<u8>::new());
        assert_eq!(prefix_end(&[]), Vec::<u8>::new());
    }

    #[test]
    fn collections_partition_the_keyspace() {
        // Keys of different collections never interleave.
        let a_end = prefix_end(&collection_prefix(1, 0));
        let b_start = collection_prefix(2, 0);
        assert!(a_end <= b_start);
    }
}

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::prefix_end;

    proptest! {
        /// Every extension of a prefix sorts inside `[prefix, prefix_end)`.
        #[test]
        fn prefix_end_bounds_extensions(
            prefix in proptest::collection::vec(any::<u8>(), 1..16),
            suffix in proptest::collection::vec(any::<u8>(), 0..16),
        ) {
            let mut key = prefix.clone();
            key.extend_from_slice(&suffix);
            let end = prefix_end(&prefix);
            prop_assert!(key.as_slice() >= prefix.as_slice());
            if !end.is_empty() {
                prop_assert!(key.as_slice() < end.as_slice());
            }
        }
    }
}
