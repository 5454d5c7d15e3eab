//! Node metadata codec.
//!
//! Every file and directory node carries a [`UnixFs`] record in its payload.
//! The record's `kind` is the only thing that decides whether a directory
//! is flat or sharded.

use std::fmt;

use serde::{Deserialize, Serialize};

use dagfs_cas::DagNode;

use crate::Result;

/// Entry type stored in node metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
    HamtShard,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::HamtShard => "hamt-sharded-directory",
        }
    }

    pub fn is_directory(self) -> bool {
        matches!(self, EntryKind::Directory | EntryKind::HamtShard)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modification time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mtime {
    /// Seconds since the Unix epoch
    pub secs: i64,
    pub nanos: u32,
}

impl Mtime {
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }
}

/// Metadata payload of a file or directory node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnixFs {
    pub kind: EntryKind,
    /// File bytes, or the occupancy bitfield of a shard bucket
    pub data: Vec<u8>,
    /// Total file length; `None` for directories
    pub file_size: Option<u64>,
    /// Shard table size
    pub fanout: Option<u64>,
    /// Multihash code of the name hash used for slotting
    pub hash_type: Option<u64>,
    pub mode: Option<u32>,
    pub mtime: Option<Mtime>,
}

impl UnixFs {
    fn empty(kind: EntryKind) -> Self {
        Self {
            kind,
            data: Vec::new(),
            file_size: None,
            fanout: None,
            hash_type: None,
            mode: None,
            mtime: None,
        }
    }

    /// Single-block file holding `data`
    pub fn file(data: Vec<u8>) -> Self {
        let mut meta = Self::empty(EntryKind::File);
        meta.file_size = Some(data.len() as u64);
        meta.data = data;
        meta
    }

    /// Flat directory
    pub fn directory() -> Self {
        Self::empty(EntryKind::Directory)
    }

    /// One bucket of a sharded directory
    pub fn hamt_shard(bitfield: Vec<u8>, fanout: u64, hash_type: u64) -> Self {
        let mut meta = Self::empty(EntryKind::HamtShard);
        meta.data = bitfield;
        meta.fanout = Some(fanout);
        meta.hash_type = Some(hash_type);
        meta
    }

    pub fn with_mode(mut self, mode: Option<u32>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_mtime(mut self, mtime: Option<Mtime>) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Wrap this metadata in a node with no links.
    pub fn to_node(&self) -> Result<DagNode> {
        Ok(DagNode::new(self.encode()?))
    }
}

/// Occupancy bitfield for a table of `fanout` slots.
///
/// Big-endian: the last byte holds slots 0..8, bit 0 being slot 0.
pub(crate) fn bitfield(occupied: impl IntoIterator<Item = usize>, fanout: usize) -> Vec<u8> {
    let len = fanout.div_ceil(8);
    let mut bytes = vec![0u8; len];
    for slot in occupied {
        bytes[len - 1 - slot / 8] |= 1 << (slot % 8);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_roundtrip() {
        let meta = UnixFs::directory()
            .with_mode(Some(0o755))
            .with_mtime(Some(Mtime::new(1_600_000_000, 5)));
        let decoded = UnixFs::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(decoded.kind, EntryKind::Directory);
    }

    #[test]
    fn test_kind_discriminates_encoding() {
        let flat = UnixFs::directory().encode().unwrap();
        let sharded = UnixFs::hamt_shard(vec![], 256, 0x1e).encode().unwrap();
        assert_ne!(flat, sharded);
    }

    #[test]
    fn test_directory_kinds() {
        assert!(EntryKind::Directory.is_directory());
        assert!(EntryKind::HamtShard.is_directory());
        assert!(!EntryKind::File.is_directory());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(UnixFs::decode(&[]).is_err());
        assert!(UnixFs::decode(&[0xff; 3]).is_err());
    }

    #[test]
    fn test_file_size() {
        let meta = UnixFs::file(vec![0, 1, 2, 3]);
        assert_eq!(meta.file_size, Some(4));
        assert_eq!(meta.kind.as_str(), "file");
    }

    #[test]
    fn test_bitfield() {
        assert_eq!(bitfield([0usize, 9], 16), vec![0b0000_0010, 0b0000_0001]);
        assert_eq!(bitfield([255usize], 256)[0], 0b1000_0000);
        assert_eq!(bitfield(std::iter::empty(), 2), vec![0]);
    }
}
