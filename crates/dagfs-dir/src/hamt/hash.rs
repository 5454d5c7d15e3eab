//! Name hashing and slot selection.
//!
//! A name is hashed once with BLAKE3; depth `d` reads bit window
//! `[d * bits, (d + 1) * bits)` of that digest, most significant bit first.
//! Changing this mapping changes every sharded directory's CID.

use crate::{DirError, Result};

use super::HamtParams;

/// Multihash code recorded in shard metadata for the name hash
pub const HASH_TYPE_BLAKE3: u64 = 0x1e;

/// Digest width in bits
pub(crate) const DIGEST_BITS: u32 = 256;

/// Digest of an entry name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameHash([u8; 32]);

impl NameHash {
    pub fn of(name: &str) -> Self {
        Self(*blake3::hash(name.as_bytes()).as_bytes())
    }

    /// Read `bits` bits starting at bit `offset`, or `None` past the digest.
    fn window(&self, offset: u32, bits: u8) -> Option<usize> {
        if offset + u32::from(bits) > DIGEST_BITS {
            return None;
        }
        let mut value = 0usize;
        for bit in offset..offset + u32::from(bits) {
            let byte = self.0[(bit / 8) as usize];
            let b = (byte >> (7 - bit % 8)) & 1;
            value = (value << 1) | usize::from(b);
        }
        Some(value)
    }

    /// Slot index at `depth`.
    pub fn slot(&self, depth: u32, params: HamtParams) -> Option<usize> {
        let bits = params.bits();
        self.window(depth.checked_mul(u32::from(bits))?, bits)
    }
}

/// Slot index of `name` in a bucket at `depth`.
pub fn slot(name: &str, depth: u32, params: HamtParams) -> Result<usize> {
    NameHash::of(name)
        .slot(depth, params)
        .ok_or_else(|| DirError::ShardDepthExceeded {
            name: name.to_string(),
            depth,
        })
}
