//! DAG nodes and block encoding.
//!
//! A [`DagNode`] is an opaque payload plus an ordered list of named links.
//! Nodes are immutable once persisted; edits build a new node and a new CID.

use serde::{Deserialize, Serialize};

use crate::{CasError, Cid, CidVersion, Codec, HashAlg, Result};

/// Named, sized reference from one node to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DagLink {
    pub name: String,
    /// Cumulative byte size of the subtree rooted at `cid`
    pub size: u64,
    pub cid: Cid,
}

impl DagLink {
    pub fn new(name: impl Into<String>, size: u64, cid: Cid) -> Self {
        Self {
            name: name.into(),
            size,
            cid,
        }
    }
}

/// Payload plus ordered links
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub data: Vec<u8>,
    pub links: Vec<DagLink>,
}

impl DagNode {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            links: Vec::new(),
        }
    }

    pub fn with_links(data: Vec<u8>, links: Vec<DagLink>) -> Self {
        Self { data, links }
    }

    /// Find a link by exact name.
    pub fn link(&self, name: &str) -> Option<&DagLink> {
        self.links.iter().find(|l| l.name == name)
    }

    /// Remove the link with the given name, returning it if present.
    pub fn remove_link(&mut self, name: &str) -> Option<DagLink> {
        let index = self.links.iter().position(|l| l.name == name)?;
        Some(self.links.remove(index))
    }

    /// Append a link at the end of the list.
    pub fn add_link(&mut self, link: DagLink) {
        self.links.push(link);
    }

    /// Encode this node into block bytes for the given codec.
    pub fn encode(&self, codec: Codec) -> Result<Vec<u8>> {
        match codec {
            Codec::DagPb => Ok(bincode::serialize(self)?),
            Codec::Raw => {
                if !self.links.is_empty() {
                    return Err(CasError::Unsupported(format!(
                        "raw blocks cannot carry links ({} present)",
                        self.links.len()
                    )));
                }
                Ok(self.data.clone())
            }
        }
    }

    /// Decode block bytes written by [`DagNode::encode`].
    pub fn decode(bytes: &[u8], codec: Codec) -> Result<Self> {
        match codec {
            Codec::DagPb => Ok(bincode::deserialize(bytes)?),
            Codec::Raw => Ok(Self::new(bytes.to_vec())),
        }
    }

    /// Size of the dag-pb encoding of this node alone.
    pub fn encoded_len(&self) -> Result<u64> {
        Ok(bincode::serialized_size(self)?)
    }

    /// Encoded size plus the cumulative size of every linked subtree.
    ///
    /// This is the value a parent records in its link to this node.
    pub fn cumulative_size(&self) -> Result<u64> {
        let links: u64 = self.links.iter().map(|l| l.size).sum();
        Ok(self.encoded_len()? + links)
    }
}

/// How a node is encoded, hashed and (optionally) persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PutOptions {
    pub format: Codec,
    pub hash_alg: HashAlg,
    pub cid_version: CidVersion,
    /// Compute the CID without writing the block
    pub hash_only: bool,
}

impl PutOptions {
    /// Encode `node` and derive its CID.
    pub fn encode(&self, node: &DagNode) -> Result<(Cid, Vec<u8>)> {
        let bytes = node.encode(self.format)?;
        let cid = Cid::hash_block(&bytes, self.cid_version, self.format, self.hash_alg)?;
        Ok((cid, bytes))
    }
}

/// Check that `bytes` hash to `cid` and decode them.
pub(crate) fn verify_and_decode(cid: &Cid, bytes: &[u8]) -> Result<DagNode> {
    let actual = cid.hash_alg().digest(bytes);
    if actual != cid.digest() {
        return Err(CasError::HashMismatch {
            expected: cid.digest_hex(),
            actual: hex::encode(actual),
        });
    }
    DagNode::decode(bytes, cid.codec())
}
