//! Directory link engine.
//!
//! Every mutation decodes its parent once, edits either the flat link list or
//! the shard bucket chain, and writes new nodes bottom-up. Existing nodes are
//! never modified; the caller publishes the returned root.

use dagfs_cas::{Cid, Codec, DagLink, DagNode, NodeStore};
use dagfs_config::{log_dir_debug, log_dir_info, log_store_debug};

use crate::hamt::{HamtParams, ShardPath, HASH_TYPE_BLAKE3};
use crate::options::{AddLink, LinkOptions, LinkResult, ParentSource, RemoveLink};
use crate::unixfs::{EntryKind, Mtime, UnixFs};
use crate::{DirError, Result};

/// Decoded directory node
#[derive(Debug)]
pub(crate) enum Representation {
    Flat { node: DagNode, meta: UnixFs },
    Sharded { node: DagNode, meta: UnixFs, params: HamtParams },
}

impl Representation {
    pub fn decode(node: DagNode) -> Result<Self> {
        let meta = UnixFs::decode(&node.data)?;
        match meta.kind {
            EntryKind::Directory => Ok(Representation::Flat { node, meta }),
            EntryKind::HamtShard => {
                let fanout = meta
                    .fanout
                    .ok_or_else(|| DirError::InvalidShard("shard root has no fanout".to_string()))?;
                if meta.hash_type != Some(HASH_TYPE_BLAKE3) {
                    return Err(DirError::InvalidShard(format!(
                        "unsupported name hash {:?}",
                        meta.hash_type
                    )));
                }
                let params = HamtParams::from_fanout(fanout)?;
                Ok(Representation::Sharded { node, meta, params })
            }
            kind => Err(DirError::NotADirectory { kind }),
        }
    }
}

/// Adds, removes and reorganises links inside directory nodes
#[derive(Debug, Clone)]
pub struct LinkEngine<S> {
    store: S,
}

impl<S: NodeStore> LinkEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub(crate) fn load(&self, parent: ParentSource) -> Result<DagNode> {
        match parent {
            ParentSource::Node(node) => Ok(node),
            ParentSource::Cid(cid) if cid.codec() == Codec::Raw => {
                Err(DirError::NotADirectory { kind: EntryKind::File })
            }
            ParentSource::Cid(cid) => Ok(self.store.get(&cid)?),
        }
    }

    fn put(&self, node: DagNode, options: &LinkOptions) -> Result<LinkResult> {
        let cid = self.store.put(&node, &options.put_options())?;
        log_store_debug!(
            "Put directory node",
            store = self.store.name(),
            links = node.links.len(),
            hash_only = !options.flush
        );
        Ok(LinkResult { cid, node })
    }

    /// Add `name -> cid` to a directory, replacing any existing entry.
    ///
    /// A flat directory already holding `shard_split_threshold` links is
    /// converted to a sharded one, even when `name` replaces an entry. Sharded directories stay sharded.
    pub fn add_link(&self, request: AddLink, options: &LinkOptions) -> Result<LinkResult> {
        let (parent, link) = request.validate()?;
        let node = self.load(parent)?;

        match Representation::decode(node)? {
            Representation::Sharded { node, meta, params } => {
                log_dir_debug!("Adding link to sharded directory", name = link.name.as_str());
                let mut path = ShardPath::from_root(&node, params)?;
                path.insert(&self.store, link)?;
                self.flush(path, &meta, options)
            }
            Representation::Flat { node, meta } => {
                // Counted before dropping a same-named link, so an overwrite
                // at the threshold converts too.
                let count = node.links.len() + 1;

                if count > options.shard_split_threshold {
                    log_dir_info!(
                        "Converting directory to sharded",
                        links = count,
                        threshold = options.shard_split_threshold
                    );
                    let mut path = ShardPath::empty(options.hamt_params()?);
                    for existing in node.links {
                        path.insert(&self.store, existing)?;
                    }
                    path.insert(&self.store, link)?;
                    return self.flush(path, &meta, options);
                }

                log_dir_debug!("Adding link to regular directory", name = link.name.as_str());
                let mut node = node;
                node.remove_link(&link.name);
                node.add_link(link);
                self.put(node, options)
            }
        }
    }

    /// Remove the entry called `name` from a directory.
    pub fn remove_link(&self, request: RemoveLink, options: &LinkOptions) -> Result<LinkResult> {
        let (parent, name) = request.validate()?;
        let node = self.load(parent)?;

        match Representation::decode(node)? {
            Representation::Sharded { node, meta, params } => {
                log_dir_debug!("Removing link from sharded directory", name = name.as_str());
                let mut path = ShardPath::from_root(&node, params)?;
                path.remove(&self.store, &name)?;
                self.flush(path, &meta, options)
            }
            Representation::Flat { mut node, .. } => {
                log_dir_debug!("Removing link from regular directory", name = name.as_str());
                if node.remove_link(&name).is_none() {
                    return Err(DirError::NotFound { name });
                }
                self.put(node, options)
            }
        }
    }

    fn flush(&self, path: ShardPath, root_meta: &UnixFs, options: &LinkOptions) -> Result<LinkResult> {
        let (cid, node) = path.flush(
            &self.store,
            &options.put_options(),
            root_meta.mode,
            root_meta.mtime,
        )?;
        Ok(LinkResult { cid, node })
    }

    /// Write an empty flat directory.
    pub fn create_directory(
        &self,
        mode: Option<u32>,
        mtime: Option<Mtime>,
        options: &LinkOptions,
    ) -> Result<LinkResult> {
        let node = UnixFs::directory().with_mode(mode).with_mtime(mtime).to_node()?;
        self.put(node, options)
    }

    /// Build a sharded directory holding `entries` from scratch.
    ///
    /// Later entries replace earlier ones with the same name. The result is
    /// the same tree incremental `add_link` calls produce for the same set.
    pub fn build_shard<I>(
        &self,
        entries: I,
        mode: Option<u32>,
        mtime: Option<Mtime>,
        options: &LinkOptions,
    ) -> Result<LinkResult>
    where
        I: IntoIterator<Item = DagLink>,
    {
        let mut path = ShardPath::empty(options.hamt_params()?);
        let mut count = 0usize;
        for entry in entries {
            if entry.name.is_empty() {
                return Err(DirError::MissingChildName);
            }
            path.insert(&self.store, entry)?;
            count += 1;
        }
        log_dir_info!("Building sharded directory", entries = count);

        let root_meta = UnixFs::directory().with_mode(mode).with_mtime(mtime);
        self.flush(path, &root_meta, options)
    }

    /// Replace `mode` and/or `mtime` of a node, keeping everything else.
    ///
    /// `None` leaves the current value in place.
    pub fn update_metadata(
        &self,
        target: impl Into<crate::ParentRef>,
        mode: Option<u32>,
        mtime: Option<Mtime>,
        options: &LinkOptions,
    ) -> Result<LinkResult> {
        let mut node = self.load(target.into().resolve()?)?;
        let mut meta = UnixFs::decode(&node.data)?;
        if mode.is_some() {
            meta.mode = mode;
        }
        if mtime.is_some() {
            meta.mtime = mtime;
        }
        log_dir_debug!("Updating node metadata", kind = meta.kind.as_str());
        node.data = meta.encode()?;
        self.put(node, options)
    }

    /// Resolve `target` to a node without modifying anything.
    pub fn resolve(&self, target: impl Into<crate::ParentRef>) -> Result<DagNode> {
        self.load(target.into().resolve()?)
    }

    /// CID a node would get under `options`, without writing it.
    pub fn cid_of(&self, node: &DagNode, options: &LinkOptions) -> Result<Cid> {
        let mut put = options.put_options();
        put.hash_only = true;
        Ok(put.encode(node)?.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagfs_cas::{CidVersion, HashAlg, MemoryStore};

    fn file_link(name: &str) -> DagLink {
        let cid = Cid::hash_block(name.as_bytes(), CidVersion::V1, Codec::Raw, HashAlg::Sha2_256).unwrap();
        DagLink::new(name, name.len() as u64, cid)
    }

    fn add(engine: &LinkEngine<MemoryStore>, parent: &Cid, name: &str, options: &LinkOptions) -> LinkResult {
        engine
            .add_link(AddLink::new().parent(parent).link(file_link(name)), options)
            .unwrap()
    }

    #[test]
    fn test_flat_add_and_replace() {
        let engine = LinkEngine::new(MemoryStore::new());
        let options = LinkOptions::default();
        let dir = engine.create_directory(None, None, &options).unwrap();

        let one = add(&engine, &dir.cid, "a", &options);
        let two = add(&engine, &one.cid, "b", &options);
        assert_eq!(two.node.links.len(), 2);

        let replaced = engine
            .add_link(
                AddLink::new()
                    .parent(&two.cid)
                    .name("a")
                    .cid(file_link("other").cid)
                    .size(99),
                &options,
            )
            .unwrap();
        let names: Vec<_> = replaced.node.links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(replaced.node.link("a").unwrap().size, 99);
    }

    #[test]
    fn test_overwrite_at_threshold_converts() {
        let engine = LinkEngine::new(MemoryStore::new());
        let options = LinkOptions::default().with_threshold(2);
        let dir = engine.create_directory(None, None, &options).unwrap();
        let dir = add(&engine, &dir.cid, "a", &options);
        let dir = add(&engine, &dir.cid, "b", &options);
        let meta = UnixFs::decode(&dir.node.data).unwrap();
        assert_eq!(meta.kind, EntryKind::Directory);

        let dir = add(&engine, &dir.cid, "a", &options);
        let meta = UnixFs::decode(&dir.node.data).unwrap();
        assert_eq!(meta.kind, EntryKind::HamtShard);

        let bulk = engine
            .build_shard([file_link("a"), file_link("b")], None, None, &options)
            .unwrap();
        assert_eq!(dir.cid, bulk.cid);
    }

    #[test]
    fn test_below_threshold_overwrite_stays_flat() {
        let engine = LinkEngine::new(MemoryStore::new());
        let options = LinkOptions::default().with_threshold(3);
        let dir = engine.create_directory(None, None, &options).unwrap();
        let dir = add(&engine, &dir.cid, "a", &options);
        let dir = add(&engine, &dir.cid, "b", &options);
        let dir = add(&engine, &dir.cid, "a", &options);

        let meta = UnixFs::decode(&dir.node.data).unwrap();
        assert_eq!(meta.kind, EntryKind::Directory);
        assert_eq!(dir.node.links.len(), 2);
    }

    #[test]
    fn test_conversion_keeps_root_metadata() {
        let engine = LinkEngine::new(MemoryStore::new());
        let options = LinkOptions::default().with_threshold(1);
        let mtime = Mtime::new(1_700_000_000, 0);
        let dir = engine.create_directory(Some(0o750), Some(mtime), &options).unwrap();
        let dir = add(&engine, &dir.cid, "a", &options);
        let dir = add(&engine, &dir.cid, "b", &options);

        let meta = UnixFs::decode(&dir.node.data).unwrap();
        assert_eq!(meta.kind, EntryKind::HamtShard);
        assert_eq!(meta.mode, Some(0o750));
        assert_eq!(meta.mtime, Some(mtime));
    }

    #[test]
    fn test_file_parent_is_rejected() {
        let engine = LinkEngine::new(MemoryStore::new());
        let file = UnixFs::file(b"data".to_vec()).to_node().unwrap();
        let err = engine
            .add_link(AddLink::new().parent(file).link(file_link("x")), &LinkOptions::default())
            .unwrap_err();
        assert!(matches!(err, DirError::NotADirectory { kind: EntryKind::File }));
    }

    #[test]
    fn test_update_metadata_keeps_links() {
        let engine = LinkEngine::new(MemoryStore::new());
        let options = LinkOptions::default();
        let dir = engine.create_directory(Some(0o755), None, &options).unwrap();
        let dir = add(&engine, &dir.cid, "a", &options);

        let touched = engine
            .update_metadata(&dir.cid, None, Some(Mtime::new(42, 7)), &options)
            .unwrap();
        let meta = UnixFs::decode(&touched.node.data).unwrap();
        assert_eq!(meta.mode, Some(0o755));
        assert_eq!(meta.mtime, Some(Mtime::new(42, 7)));
        assert_eq!(touched.node.links, dir.node.links);
        assert_ne!(touched.cid, dir.cid);
    }

    #[test]
    fn test_cid_of_matches_put() {
        let engine = LinkEngine::new(MemoryStore::new());
        let options = LinkOptions::default();
        let dir = engine.create_directory(None, None, &options).unwrap();
        assert_eq!(engine.cid_of(&dir.node, &options).unwrap(), dir.cid);
    }
}
