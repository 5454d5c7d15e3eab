//! In-memory node store.

use dashmap::DashMap;
use tracing::instrument;

use crate::node::verify_and_decode;
use crate::{CasError, Cid, DagNode, NodeStore, PutOptions, Result};

/// Node store backed by a concurrent hash map of encoded blocks.
///
/// Blocks are kept in their encoded form so that reads go through the same
/// decode and verification path as [`crate::FsStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: DashMap<Cid, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total encoded bytes held
    pub fn total_bytes(&self) -> u64 {
        self.blocks.iter().map(|e| e.value().len() as u64).sum()
    }
}

impl NodeStore for MemoryStore {
    #[instrument(skip(self), level = "debug", fields(cid = %cid))]
    fn get(&self, cid: &Cid) -> Result<DagNode> {
        let bytes = self.blocks.get(cid).ok_or_else(|| CasError::NotFound {
            cid: cid.to_string(),
        })?;
        verify_and_decode(cid, bytes.value())
    }

    #[instrument(skip(self, node), level = "debug")]
    fn put(&self, node: &DagNode, options: &PutOptions) -> Result<Cid> {
        let (cid, bytes) = options.encode(node)?;
        if !options.hash_only {
            self.blocks.entry(cid.clone()).or_insert(bytes);
        }
        Ok(cid)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.blocks.contains_key(cid))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
