//! Mutation requests and options.

use dagfs_cas::{Cid, CidVersion, Codec, DagLink, DagNode, HashAlg, PutOptions};
use dagfs_config::MutationConfig;

use crate::hamt::HamtParams;
use crate::{DirError, Result};

/// Encoding and sharding parameters for one mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    pub format: Codec,
    pub hash_alg: HashAlg,
    pub cid_version: CidVersion,
    /// Flat directories with more links than this become sharded
    pub shard_split_threshold: usize,
    /// Persist new nodes; `false` only computes CIDs
    pub flush: bool,
    /// Bits per level for newly created shards
    pub hamt_bits: u8,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self::from_config(&MutationConfig::default())
    }
}

impl LinkOptions {
    pub fn from_config(config: &MutationConfig) -> Self {
        Self {
            format: config.format,
            hash_alg: config.hash_alg,
            cid_version: config.cid_version,
            shard_split_threshold: config.shard_split_threshold,
            flush: config.flush,
            hamt_bits: config.hamt_bits,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.shard_split_threshold = threshold;
        self
    }

    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }

    pub fn with_hamt_bits(mut self, bits: u8) -> Self {
        self.hamt_bits = bits;
        self
    }

    /// Store parameters for every node this mutation writes.
    pub fn put_options(&self) -> PutOptions {
        PutOptions {
            format: self.format,
            hash_alg: self.hash_alg,
            cid_version: self.cid_version,
            hash_only: !self.flush,
        }
    }

    /// Geometry for shards created from scratch.
    pub fn hamt_params(&self) -> Result<HamtParams> {
        HamtParams::new(self.hamt_bits)
    }
}

/// Directory being edited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// Already-decoded node
    Node(DagNode),
    Cid(Cid),
    /// CID in text form, parsed before any store access
    Encoded(String),
}

impl From<DagNode> for ParentRef {
    fn from(node: DagNode) -> Self {
        ParentRef::Node(node)
    }
}

impl From<Cid> for ParentRef {
    fn from(cid: Cid) -> Self {
        ParentRef::Cid(cid)
    }
}

impl From<&Cid> for ParentRef {
    fn from(cid: &Cid) -> Self {
        ParentRef::Cid(cid.clone())
    }
}

impl From<&str> for ParentRef {
    fn from(s: &str) -> Self {
        ParentRef::Encoded(s.to_string())
    }
}

impl From<String> for ParentRef {
    fn from(s: String) -> Self {
        ParentRef::Encoded(s)
    }
}

/// Parent after text CIDs have been parsed
#[derive(Debug)]
pub(crate) enum ParentSource {
    Node(DagNode),
    Cid(Cid),
}

impl ParentRef {
    pub(crate) fn resolve(self) -> Result<ParentSource> {
        match self {
            ParentRef::Node(node) => Ok(ParentSource::Node(node)),
            ParentRef::Cid(cid) => Ok(ParentSource::Cid(cid)),
            ParentRef::Encoded(text) => text
                .parse()
                .map(ParentSource::Cid)
                .map_err(|_| DirError::InvalidParentCid(text)),
        }
    }
}

fn resolve_parent(parent: Option<ParentRef>) -> Result<ParentSource> {
    parent.ok_or(DirError::InvalidParentReference)?.resolve()
}

/// Request to add or replace one named link
///
/// ```ignore
/// let request = AddLink::new()
///     .parent(dir_cid)
///     .name("a.txt")
///     .cid(file_cid)
///     .size(12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AddLink {
    pub parent: Option<ParentRef>,
    pub name: Option<String>,
    pub cid: Option<Cid>,
    pub size: Option<u64>,
}

impl AddLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: impl Into<ParentRef>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn cid(mut self, cid: Cid) -> Self {
        self.cid = Some(cid);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Copy name, CID and size from an existing link.
    pub fn link(self, link: DagLink) -> Self {
        self.name(link.name).cid(link.cid).size(link.size)
    }

    pub(crate) fn validate(self) -> Result<(ParentSource, DagLink)> {
        let parent = resolve_parent(self.parent)?;
        let cid = self.cid.ok_or(DirError::MissingChildCid)?;
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .ok_or(DirError::MissingChildName)?;
        let size = self.size.ok_or(DirError::MissingChildSize)?;
        Ok((parent, DagLink::new(name, size, cid)))
    }
}

/// Request to remove one named link
#[derive(Debug, Clone, Default)]
pub struct RemoveLink {
    pub parent: Option<ParentRef>,
    pub name: Option<String>,
}

impl RemoveLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: impl Into<ParentRef>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn validate(self) -> Result<(ParentSource, String)> {
        let parent = resolve_parent(self.parent)?;
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .ok_or(DirError::MissingChildName)?;
        Ok((parent, name))
    }
}

/// New directory root produced by a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResult {
    pub cid: Cid,
    pub node: DagNode,
}
