//! One level of a sharded directory.

use std::collections::BTreeMap;

use dagfs_cas::{Cid, DagLink, DagNode};

use crate::unixfs::{bitfield, Mtime, UnixFs};
use crate::{DirError, Result};

use super::hash::{slot, HASH_TYPE_BLAKE3};
use super::HamtParams;

/// Occupant of a bucket slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Directory entry; the link carries the un-prefixed entry name
    Leaf(DagLink),
    /// Persisted subshard that has not been loaded
    Shard { cid: Cid, size: u64 },
    /// Subshard materialised at this arena index
    Child(usize),
}

/// Slot table of one trie level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    depth: u32,
    slots: BTreeMap<usize, Slot>,
}

impl Bucket {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            slots: BTreeMap::new(),
        }
    }

    /// Interpret the links of a shard node as a bucket at `depth`.
    ///
    /// Every leaf must sit in the slot its name hashes to.
    pub fn from_links(links: &[DagLink], depth: u32, params: HamtParams) -> Result<Self> {
        let mut bucket = Self::new(depth);
        let prefix_len = params.prefix_len();

        for link in links {
            let pos = params
                .parse_prefix(&link.name)
                .ok_or_else(|| DirError::InvalidShard(format!("bad link name {:?}", link.name)))?;

            let occupant = if link.name.len() == prefix_len {
                Slot::Shard {
                    cid: link.cid.clone(),
                    size: link.size,
                }
            } else {
                let name = &link.name[prefix_len..];
                if slot(name, depth, params)? != pos {
                    return Err(DirError::InvalidShard(format!(
                        "{:?} does not belong in slot {} at depth {}",
                        name, pos, depth
                    )));
                }
                Slot::Leaf(DagLink::new(name, link.size, link.cid.clone()))
            };

            if bucket.slots.insert(pos, occupant).is_some() {
                return Err(DirError::InvalidShard(format!(
                    "slot {} occupied twice at depth {}",
                    pos, depth
                )));
            }
        }

        Ok(bucket)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn get(&self, pos: usize) -> Option<&Slot> {
        self.slots.get(&pos)
    }

    pub fn set(&mut self, pos: usize, occupant: Slot) -> Option<Slot> {
        self.slots.insert(pos, occupant)
    }

    pub fn remove(&mut self, pos: usize) -> Option<Slot> {
        self.slots.remove(&pos)
    }

    /// Number of occupied slots
    pub fn occupied(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots in slot order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots.iter().map(|(pos, s)| (*pos, s))
    }

    /// Serialize this bucket into a shard node.
    ///
    /// Subshards must already be flushed; a [`Slot::Child`] is an error.
    pub fn to_node(&self, params: HamtParams, mode: Option<u32>, mtime: Option<Mtime>) -> Result<DagNode> {
        let mut links = Vec::with_capacity(self.slots.len());
        for (pos, occupant) in &self.slots {
            let prefix = params.prefix(*pos);
            match occupant {
                Slot::Leaf(link) => {
                    links.push(DagLink::new(format!("{}{}", prefix, link.name), link.size, link.cid.clone()));
                }
                Slot::Shard { cid, size } => links.push(DagLink::new(prefix, *size, cid.clone())),
                Slot::Child(idx) => {
                    return Err(DirError::InvalidShard(format!(
                        "slot {} still references unflushed level {}",
                        pos, idx
                    )));
                }
            }
        }

        let meta = UnixFs::hamt_shard(
            bitfield(self.slots.keys().copied(), params.fanout()),
            params.fanout() as u64,
            HASH_TYPE_BLAKE3,
        )
        .with_mode(mode)
        .with_mtime(mtime);

        Ok(DagNode::with_links(meta.encode()?, links))
    }
}
