//! Read-side directory operations.

use dagfs_cas::{Cid, Codec, DagLink, NodeStore};

use crate::engine::{LinkEngine, Representation};
use crate::hamt::{load_bucket, Bucket, HamtParams, ShardPath, Slot};
use crate::unixfs::{EntryKind, Mtime, UnixFs};
use crate::{DirError, ParentRef, Result};

/// Summary of a stored node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub cid: Cid,
    pub kind: EntryKind,
    /// File length in bytes; 0 for directories
    pub size: u64,
    /// Encoded node plus all linked subtrees
    pub cumulative_size: u64,
    /// Number of links in the node itself
    pub blocks: usize,
    pub mode: Option<u32>,
    pub mtime: Option<Mtime>,
}

impl<S: NodeStore> LinkEngine<S> {
    /// Find the entry called `name`.
    pub fn lookup(&self, dir: impl Into<ParentRef>, name: &str) -> Result<Option<DagLink>> {
        let node = self.resolve(dir)?;
        match Representation::decode(node)? {
            Representation::Flat { node, .. } => Ok(node.link(name).cloned()),
            Representation::Sharded { node, params, .. } => {
                ShardPath::from_root(&node, params)?.find(self.store(), name)
            }
        }
    }

    /// Every entry of a directory.
    ///
    /// Flat directories list in link order; sharded ones depth-first in slot
    /// order. Names never carry slot prefixes.
    pub fn list(&self, dir: impl Into<ParentRef>) -> Result<Vec<DagLink>> {
        let node = self.resolve(dir)?;
        match Representation::decode(node)? {
            Representation::Flat { node, .. } => Ok(node.links),
            Representation::Sharded { node, params, .. } => {
                let mut entries = Vec::new();
                let root = Bucket::from_links(&node.links, 0, params)?;
                self.collect(&root, params, &mut entries)?;
                Ok(entries)
            }
        }
    }

    fn collect(&self, bucket: &Bucket, params: HamtParams, out: &mut Vec<DagLink>) -> Result<()> {
        for (pos, occupant) in bucket.iter() {
            match occupant {
                Slot::Leaf(link) => out.push(link.clone()),
                Slot::Shard { cid, .. } => {
                    let child = load_bucket(self.store(), cid, bucket.depth() + 1, params)?;
                    self.collect(&child, params, out)?;
                }
                Slot::Child(_) => {
                    return Err(DirError::InvalidShard(format!(
                        "unexpected in-memory child at slot {}",
                        pos
                    )));
                }
            }
        }
        Ok(())
    }

    /// Describe the node stored under `cid`.
    ///
    /// Raw blocks are reported as files holding their bytes.
    pub fn stat(&self, cid: &Cid) -> Result<Stat> {
        let node = self.store().get(cid)?;
        let cumulative_size = node.cumulative_size()?;

        if cid.codec() == Codec::Raw {
            return Ok(Stat {
                cid: cid.clone(),
                kind: EntryKind::File,
                size: node.data.len() as u64,
                cumulative_size,
                blocks: 0,
                mode: None,
                mtime: None,
            });
        }

        let meta = UnixFs::decode(&node.data)?;
        Ok(Stat {
            cid: cid.clone(),
            kind: meta.kind,
            size: meta.file_size.unwrap_or(0),
            cumulative_size,
            blocks: node.links.len(),
            mode: meta.mode,
            mtime: meta.mtime,
        })
    }
}
