//! Bucket chain reconstruction and bottom-up flushing.
//!
//! Levels live in an arena indexed by position; each records its parent
//! index and the slot it occupies there. A child is always pushed after its
//! parent, so flushing in reverse index order writes children before the
//! parents that link to them.

use dagfs_cas::{Cid, DagLink, DagNode, NodeStore, PutOptions};
use dagfs_config::{log_hamt_debug, log_hamt_trace};

use crate::unixfs::{EntryKind, Mtime, UnixFs};
use crate::{DirError, Result};

use super::hash::{slot, HASH_TYPE_BLAKE3};
use super::{Bucket, HamtParams, Slot};

#[derive(Debug)]
struct Level {
    bucket: Bucket,
    /// `(parent level, slot in parent)`; `None` for the root
    parent: Option<(usize, usize)>,
    /// Collapsed into its parent; not flushed
    detached: bool,
}

/// Arena of the buckets touched by one operation
#[derive(Debug)]
pub(crate) struct ShardPath {
    params: HamtParams,
    levels: Vec<Level>,
}

enum Step {
    Into(usize),
    Load(Cid),
}

impl ShardPath {
    /// Start from an empty root bucket.
    pub fn empty(params: HamtParams) -> Self {
        Self {
            params,
            levels: vec![Level {
                bucket: Bucket::new(0),
                parent: None,
                detached: false,
            }],
        }
    }

    /// Start from the links of a persisted root shard node.
    pub fn from_root(root: &DagNode, params: HamtParams) -> Result<Self> {
        let mut path = Self::empty(params);
        path.levels[0].bucket = Bucket::from_links(&root.links, 0, params)?;
        Ok(path)
    }

    fn push(&mut self, bucket: Bucket, parent: (usize, usize)) -> usize {
        self.levels.push(Level {
            bucket,
            parent: Some(parent),
            detached: false,
        });
        self.levels.len() - 1
    }

    /// Follow `name`'s hash through subshards, loading them as needed.
    ///
    /// Returns the level and slot where `name` lives or would be placed. The
    /// slot is empty or holds a leaf (not necessarily `name`).
    fn descend<S: NodeStore + ?Sized>(&mut self, store: &S, name: &str) -> Result<(usize, usize)> {
        let mut level = 0;
        loop {
            let depth = self.levels[level].bucket.depth();
            let pos = slot(name, depth, self.params)?;

            let step = match self.levels[level].bucket.get(pos) {
                Some(Slot::Child(idx)) => Step::Into(*idx),
                Some(Slot::Shard { cid, .. }) => Step::Load(cid.clone()),
                _ => return Ok((level, pos)),
            };

            level = match step {
                Step::Into(idx) => idx,
                Step::Load(cid) => {
                    log_hamt_debug!(
                        "Found subshard",
                        prefix = self.params.prefix(pos).as_str(),
                        depth = depth
                    );
                    let bucket = load_bucket(store, &cid, depth + 1, self.params)?;
                    let idx = self.push(bucket, (level, pos));
                    self.levels[level].bucket.set(pos, Slot::Child(idx));
                    idx
                }
            };
        }
    }

    /// Insert or overwrite an entry.
    ///
    /// A different entry already in the target slot is pushed one level down
    /// into a new subshard, repeatedly while both names keep colliding.
    pub fn insert<S: NodeStore + ?Sized>(&mut self, store: &S, link: DagLink) -> Result<()> {
        let (mut level, mut pos) = self.descend(store, &link.name)?;

        loop {
            let existing = match self.levels[level].bucket.get(pos) {
                None => None,
                Some(Slot::Leaf(existing)) if existing.name == link.name => {
                    log_hamt_trace!("Replacing leaf", name = link.name.as_str());
                    None
                }
                Some(Slot::Leaf(existing)) => Some(existing.name.clone()),
                Some(_) => {
                    return Err(DirError::InvalidShard(format!(
                        "descent for {} stopped on a subshard",
                        link.name
                    )));
                }
            };

            let Some(existing_name) = existing else {
                self.levels[level].bucket.set(pos, Slot::Leaf(link));
                return Ok(());
            };

            let depth = self.levels[level].bucket.depth() + 1;
            let existing_pos = slot(&existing_name, depth, self.params)?;
            let new_pos = slot(&link.name, depth, self.params)?;
            log_hamt_debug!(
                "Splitting slot into subshard",
                prefix = self.params.prefix(pos).as_str(),
                existing = existing_name.as_str(),
                depth = depth
            );

            let mut child = Bucket::new(depth);
            if let Some(moved) = self.levels[level].bucket.remove(pos) {
                child.set(existing_pos, moved);
            }
            let idx = self.push(child, (level, pos));
            self.levels[level].bucket.set(pos, Slot::Child(idx));

            level = idx;
            pos = new_pos;
        }
    }

    /// Look up an entry without modifying any bucket contents.
    pub fn find<S: NodeStore + ?Sized>(&mut self, store: &S, name: &str) -> Result<Option<DagLink>> {
        let (level, pos) = self.descend(store, name)?;
        Ok(match self.levels[level].bucket.get(pos) {
            Some(Slot::Leaf(link)) if link.name == name => Some(link.clone()),
            _ => None,
        })
    }

    /// Remove an entry and collapse buckets left with a single leaf.
    pub fn remove<S: NodeStore + ?Sized>(&mut self, store: &S, name: &str) -> Result<DagLink> {
        let (level, pos) = self.descend(store, name)?;

        let removed = match self.levels[level].bucket.get(pos) {
            Some(Slot::Leaf(link)) if link.name == name => self.levels[level].bucket.remove(pos),
            _ => None,
        };
        let Some(Slot::Leaf(removed)) = removed else {
            return Err(DirError::NotFound {
                name: name.to_string(),
            });
        };

        self.collapse(level);
        Ok(removed)
    }

    /// Hoist lone leaves upwards, starting at `level`.
    ///
    /// A non-root bucket holding exactly one leaf is replaced in its parent by
    /// that leaf; an empty one is dropped. A lone subshard stays in place.
    /// The root is never collapsed.
    fn collapse(&mut self, mut level: usize) {
        while let Some((parent, pos)) = self.levels[level].parent {
            let bucket = &self.levels[level].bucket;
            let replacement = match bucket.occupied() {
                0 => None,
                1 => match bucket.iter().next() {
                    Some((_, Slot::Leaf(link))) => Some(link.clone()),
                    _ => break,
                },
                _ => break,
            };

            log_hamt_debug!(
                "Collapsing subshard",
                prefix = self.params.prefix(pos).as_str(),
                depth = bucket.depth()
            );
            self.levels[level].detached = true;
            match replacement {
                Some(link) => self.levels[parent].bucket.set(pos, Slot::Leaf(link)),
                None => self.levels[parent].bucket.remove(pos),
            };
            level = parent;
        }
    }

    /// Persist every live level bottom-up and return the new root.
    pub fn flush<S: NodeStore + ?Sized>(
        mut self,
        store: &S,
        options: &PutOptions,
        mode: Option<u32>,
        mtime: Option<Mtime>,
    ) -> Result<(Cid, DagNode)> {
        for idx in (1..self.levels.len()).rev() {
            if self.levels[idx].detached {
                continue;
            }
            let Some((parent, pos)) = self.levels[idx].parent else {
                continue;
            };

            match self.levels[parent].bucket.get(pos) {
                Some(Slot::Child(linked)) if *linked == idx => {}
                _ => {
                    return Err(DirError::InvalidShard(format!(
                        "level {} is not linked from its parent",
                        idx
                    )));
                }
            }

            let node = self.levels[idx].bucket.to_node(self.params, None, None)?;
            let cid = store.put(&node, options)?;
            let size = node.cumulative_size()?;
            log_hamt_trace!("Flushed subshard", cid = cid.to_string().as_str(), size = size);
            self.levels[parent].bucket.set(pos, Slot::Shard { cid, size });
        }

        let root = self.levels[0].bucket.to_node(self.params, mode, mtime)?;
        let cid = store.put(&root, options)?;
        Ok((cid, root))
    }
}

/// Fetch a persisted subshard and read it as a bucket at `depth`.
///
/// The node must be a shard with the same fanout and name hash as its parent.
pub(crate) fn load_bucket<S: NodeStore + ?Sized>(
    store: &S,
    cid: &Cid,
    depth: u32,
    params: HamtParams,
) -> Result<Bucket> {
    let node = store.get(cid)?;
    let meta = UnixFs::decode(&node.data)?;
    if meta.kind != EntryKind::HamtShard {
        return Err(DirError::InvalidShard(format!("subshard {} is a {}", cid, meta.kind)));
    }
    if meta.fanout != Some(params.fanout() as u64) {
        return Err(DirError::InvalidShard(format!(
            "subshard {} has fanout {:?}, expected {}",
            cid,
            meta.fanout,
            params.fanout()
        )));
    }
    if meta.hash_type != Some(HASH_TYPE_BLAKE3) {
        return Err(DirError::InvalidShard(format!(
            "subshard {} uses name hash {:?}",
            cid, meta.hash_type
        )));
    }
    Bucket::from_links(&node.links, depth, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagfs_cas::{CidVersion, Codec, HashAlg, MemoryStore};

    fn leaf(name: &str) -> DagLink {
        let cid = Cid::hash_block(name.as_bytes(), CidVersion::V1, Codec::Raw, HashAlg::Sha2_256).unwrap();
        DagLink::new(name, 4, cid)
    }

    /// Two distinct names sharing the depth-0 slot.
    fn colliding_pair(params: HamtParams) -> (String, String) {
        let mut seen = std::collections::HashMap::new();
        for i in 0.. {
            let name = format!("n{}", i);
            let pos = slot(&name, 0, params).unwrap();
            if let Some(other) = seen.insert(pos, name.clone()) {
                return (other, name);
            }
        }
        unreachable!()
    }

    #[test]
    fn test_collision_creates_subshard() {
        let store = MemoryStore::new();
        let params = HamtParams::default();
        let (a, b) = colliding_pair(params);

        let mut path = ShardPath::empty(params);
        path.insert(&store, leaf(&a)).unwrap();
        path.insert(&store, leaf(&b)).unwrap();

        let pos = slot(&a, 0, params).unwrap();
        assert!(matches!(path.levels[0].bucket.get(pos), Some(Slot::Child(_))));
        assert_eq!(path.find(&store, &a).unwrap().unwrap().name, a);
        assert_eq!(path.find(&store, &b).unwrap().unwrap().name, b);
    }

    #[test]
    fn test_remove_collapses_back_to_leaf() {
        let store = MemoryStore::new();
        let params = HamtParams::default();
        let (a, b) = colliding_pair(params);

        let mut path = ShardPath::empty(params);
        path.insert(&store, leaf(&a)).unwrap();
        path.insert(&store, leaf(&b)).unwrap();
        path.remove(&store, &b).unwrap();

        let pos = slot(&a, 0, params).unwrap();
        assert_eq!(path.levels[0].bucket.get(pos), Some(&Slot::Leaf(leaf(&a))));

        let (_, root) = path.flush(&store, &PutOptions::default(), None, None).unwrap();
        assert_eq!(root.links.len(), 1);
        assert_eq!(root.links[0].name, format!("{}{}", params.prefix(pos), a));
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let store = MemoryStore::new();
        let mut path = ShardPath::empty(HamtParams::default());
        path.insert(&store, leaf("present")).unwrap();
        assert!(matches!(
            path.remove(&store, "absent"),
            Err(DirError::NotFound { .. })
        ));
    }

    #[test]
    fn test_subshard_with_foreign_hash_is_rejected() {
        let store = MemoryStore::new();
        let params = HamtParams::default();
        let fanout = params.fanout() as u64;

        let inner = UnixFs::hamt_shard(vec![0; params.fanout() / 8], fanout, 0x22).to_node().unwrap();
        let inner_cid = store.put(&inner, &PutOptions::default()).unwrap();

        let pos = slot("target", 0, params).unwrap();
        let root_meta = UnixFs::hamt_shard(vec![0; params.fanout() / 8], fanout, HASH_TYPE_BLAKE3);
        let root = DagNode::with_links(
            root_meta.encode().unwrap(),
            vec![DagLink::new(params.prefix(pos), 0, inner_cid)],
        );

        let mut path = ShardPath::from_root(&root, params).unwrap();
        assert!(matches!(
            path.find(&store, "target"),
            Err(DirError::InvalidShard(_))
        ));
    }

    #[test]
    fn test_flush_writes_children_first() {
        let store = MemoryStore::new();
        let params = HamtParams::new(1).unwrap();

        let mut path = ShardPath::empty(params);
        for i in 0..6 {
            path.insert(&store, leaf(&format!("f{}", i))).unwrap();
        }
        let (cid, root) = path.flush(&store, &PutOptions::default(), None, None).unwrap();
        assert_eq!(store.get(&cid).unwrap(), root);

        for link in &root.links {
            if link.name.len() == params.prefix_len() {
                assert!(store.has(&link.cid).unwrap());
            }
        }
    }
}
