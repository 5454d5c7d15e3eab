//! Hash-array-mapped-trie sharding for large directories.
//!
//! A sharded directory is a tree of buckets. Each bucket is one node whose
//! link names encode slot occupancy:
//!
//! ```text
//! "0A"          subshard at slot 0x0A (child node is the next bucket)
//! "0Afoo.txt"   entry "foo.txt" stored directly at slot 0x0A
//! ```
//!
//! The shape is canonical: an entry lives at the shallowest depth where its
//! hash prefix is unique among the directory's entries. Incremental edits
//! and a bulk build of the same entries therefore produce the same CIDs.

mod bucket;
mod hash;
mod path;

pub use bucket::{Bucket, Slot};
pub use hash::{slot, NameHash, HASH_TYPE_BLAKE3};
pub(crate) use path::{load_bucket, ShardPath};

use crate::{DirError, Result};

/// Shard table geometry: `2^bits` slots per bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HamtParams {
    bits: u8,
}

impl Default for HamtParams {
    fn default() -> Self {
        Self { bits: 8 }
    }
}

impl HamtParams {
    pub fn new(bits: u8) -> Result<Self> {
        if !(1..=8).contains(&bits) {
            return Err(DirError::InvalidShard(format!(
                "bits per level must be 1..=8, got {}",
                bits
            )));
        }
        Ok(Self { bits })
    }

    /// Geometry recorded in an existing shard node.
    pub fn from_fanout(fanout: u64) -> Result<Self> {
        if !fanout.is_power_of_two() || !(2..=256).contains(&fanout) {
            return Err(DirError::InvalidShard(format!("unsupported fanout {}", fanout)));
        }
        Self::new(fanout.trailing_zeros() as u8)
    }

    pub fn bits(self) -> u8 {
        self.bits
    }

    /// Slots per bucket
    pub fn fanout(self) -> usize {
        1 << self.bits
    }

    /// Hex digits needed to name any slot
    pub fn prefix_len(self) -> usize {
        usize::from(self.bits).div_ceil(4)
    }

    /// Link-name prefix for `slot` (fixed-width uppercase hex).
    pub fn prefix(self, slot: usize) -> String {
        format!("{:0width$X}", slot, width = self.prefix_len())
    }

    /// Slot encoded at the start of a link name.
    pub fn parse_prefix(self, name: &str) -> Option<usize> {
        let prefix = name.get(..self.prefix_len())?;
        if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let slot = usize::from_str_radix(prefix, 16).ok()?;
        (slot < self.fanout()).then_some(slot)
    }
}
