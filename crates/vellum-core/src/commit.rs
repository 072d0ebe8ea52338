//! MerkleCRDT commit blocks.
//!
//! A commit is the decoded form of one immutable DAG block: a causal
//! priority (`height`), an opaque CRDT delta payload, and named links to
//! parent and child commits. Commits are produced transiently while
//! traversing the block store; the query engine never persists them.
//!
//! # Block Format
//!
//! A block is encoded as:
//! - 1 byte format version
//! - 8 bytes height (big-endian u64)
//! - 4 bytes delta length + delta bytes
//! - 4 bytes link count
//! - For each link: 4 bytes name length + UTF-8 name + 32-byte CID

use crate::cid::{Cid, CID_LEN};
use crate::error::CoreError;

/// The current block format version.
pub const BLOCK_FORMAT_VERSION: u8 = 1;

/// The conventional link name pointing at a commit's predecessor.
pub const HEAD_LINK_NAME: &str = "_head";

/// A named link from one commit to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitLink {
    /// The link name: `_head` for the causal predecessor, or a field name
    /// for a composite commit's per-field children.
    pub name: String,
    /// The linked block's content identifier.
    pub cid: Cid,
}

/// A decoded MerkleCRDT DAG node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// The block's content identifier.
    pub cid: Cid,
    /// Causal priority; a commit's height is strictly greater than any
    /// commit it links to via `_head`.
    pub height: u64,
    /// The opaque CRDT delta payload.
    pub delta: Vec<u8>,
    /// Named links to related commits.
    pub links: Vec<CommitLink>,
}

impl Commit {
    /// Encodes a commit body as block bytes. The block's CID is the hash
    /// of these bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encoding`] if a length field overflows.
    pub fn encode_block(
        height: u64,
        delta: &[u8],
        links: &[CommitLink],
    ) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::with_capacity(1 + 8 + 4 + delta.len() + 4);
        buf.push(BLOCK_FORMAT_VERSION);
        buf.extend_from_slice(&height.to_be_bytes());

        let delta_len = u32::try_from(delta.len())
            .map_err(|_| CoreError::Encoding("delta too long".to_owned()))?;
        buf.extend_from_slice(&delta_len.to_be_bytes());
        buf.extend_from_slice(delta);

        let link_count = u32::try_from(links.len())
            .map_err(|_| CoreError::Encoding("too many links".to_owned()))?;
        buf.extend_from_slice(&link_count.to_be_bytes());

        for link in links {
            let name_bytes = link.name.as_bytes();
            let name_len = u32::try_from(name_bytes.len())
                .map_err(|_| CoreError::Encoding("link name too long".to_owned()))?;
            buf.extend_from_slice(&name_len.to_be_bytes());
            buf.extend_from_slice(name_bytes);
            buf.extend_from_slice(link.cid.as_bytes());
        }

        Ok(buf)
    }

    /// Decodes block bytes fetched from the content-addressed store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encoding`] identifying the missing or invalid
    /// field when the block is malformed.
    pub fn decode_block(cid: Cid, bytes: &[u8]) -> Result<Self, CoreError> {
        let mut reader = BlockReader { bytes, pos: 0 };

        let version = reader.read_u8("format version")?;
        if version != BLOCK_FORMAT_VERSION {
            return Err(CoreError::Encoding(format!(
                "unsupported block format version {version}"
            )));
        }

        let height = reader.read_u64("priority")?;
        let delta_len = reader.read_u32("delta length")? as usize;
        let delta = reader.read_bytes(delta_len, "delta")?.to_vec();

        let link_count = reader.read_u32("link count")? as usize;
        let mut links = Vec::with_capacity(link_count.min(64));
        for _ in 0..link_count {
            let name_len = reader.read_u32("link name length")? as usize;
            let name_bytes = reader.read_bytes(name_len, "link name")?;
            let name = std::str::from_utf8(name_bytes)
                .map_err(|_| CoreError::Encoding("link name is not valid UTF-8".to_owned()))?
                .to_owned();
            let cid_bytes = reader.read_bytes(CID_LEN, "link cid")?;
            // read_bytes guarantees the exact length
            let cid = Cid::from_slice(cid_bytes)
                .ok_or_else(|| CoreError::Encoding("link cid truncated".to_owned()))?;
            links.push(CommitLink { name, cid });
        }

        if reader.pos != bytes.len() {
            return Err(CoreError::Encoding("trailing bytes after block".to_owned()));
        }

        Ok(Self { cid, height, delta, links })
    }

    /// Returns the CID linked under `_head`, if present.
    #[must_use]
    pub fn head_link(&self) -> Option<Cid> {
        self.links.iter().find(|l| l.name == HEAD_LINK_NAME).map(|l| l.cid)
    }
}

/// Cursor over block bytes with field-aware truncation errors.
struct BlockReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BlockReader<'a> {
    fn read_bytes(&mut self, len: usize, field: &str) -> Result<&'a [u8], CoreError> {
        let end = self.pos.checked_add(len).filter(|&e| e <= self.bytes.len()).ok_or_else(
            || CoreError::Encoding(format!("block truncated: missing {field}")),
        )?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self, field: &str) -> Result<u8, CoreError> {
        Ok(self.read_bytes(1, field)?[0])
    }

    fn read_u32(&mut self, field: &str) -> Result<u32, CoreError> {
        let bytes = self.read_bytes(4, field)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("length checked")))
    }

    fn read_u64(&mut self, field: &str) -> Result<u64, CoreError> {
        let bytes = self.read_bytes(8, field)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("length checked")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_links() -> Vec<CommitLink> {
        vec![
            CommitLink { name: HEAD_LINK_NAME.to_owned(), cid: Cid::hash(b"parent") },
            CommitLink { name: "rating".to_owned(), cid: Cid::hash(b"rating-block") },
        ]
    }

    #[test]
    fn encode_decode_round_trip() {
        let links = sample_links();
        let bytes = Commit::encode_block(3, b"delta-payload", &links).unwrap();
        let cid = Cid::hash(&bytes);

        let commit = Commit::decode_block(cid, &bytes).unwrap();
        assert_eq!(commit.cid, cid);
        assert_eq!(commit.height, 3);
        assert_eq!(commit.delta, b"delta-payload");
        assert_eq!(commit.links, links);
        assert_eq!(commit.head_link(), Some(Cid::hash(b"parent")));
    }

    #[test]
    fn empty_block_missing_priority() {
        let err = Commit::decode_block(Cid::hash(b""), &[BLOCK_FORMAT_VERSION]).unwrap_err();
        assert!(err.to_string().contains("missing priority"));
    }

    #[test]
    fn truncated_delta() {
        let bytes = Commit::encode_block(1, b"0123456789", &[]).unwrap();
        let err = Commit::decode_block(Cid::hash(&bytes), &bytes[..bytes.len() - 8]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn unsupported_version() {
        let mut bytes = Commit::encode_block(1, b"", &[]).unwrap();
        bytes[0] = 99;
        let err = Commit::decode_block(Cid::hash(&bytes), &bytes).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = Commit::encode_block(1, b"d", &[]).unwrap();
        bytes.push(0x00);
        assert!(Commit::decode_block(Cid::hash(&bytes), &bytes).is_err());
    }
}
