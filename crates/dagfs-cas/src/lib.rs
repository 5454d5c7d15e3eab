//! # dagfs-cas
//!
//! Content-addressed node storage for dagfs.
//!
//! Every node is encoded into a block, hashed into a [`Cid`], and stored
//! under that CID. Blocks are never rewritten: a changed node is a new block.
//!
//! ## Directory Layout
//!
//! [`FsStore`] fans blocks out by hash algorithm and the first two bytes of
//! the digest:
//!
//! ```text
//! ~/.dagfs/blocks/
//! └── sha2-256/
//!     └── ab/
//!         └── cd/
//!             └── 1220abcd...   # CID string
//! ```
//!
//! ## Stores
//!
//! - [`MemoryStore`]: concurrent in-memory map, used by tests and dry runs
//! - [`FsStore`]: durable store on the local filesystem

mod cid;
mod memory;
mod node;

pub use cid::{Cid, CidVersion, Codec, HashAlg};
pub use memory::MemoryStore;
pub use node::{DagLink, DagNode, PutOptions};

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;
use walkdir::WalkDir;

use node::verify_and_decode;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum CasError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Block not found: {cid}")]
    NotFound { cid: String },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("Invalid CID: {0}")]
    InvalidCid(String),

    #[error("Unsupported {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, CasError>;

/// Block storage addressed by CID.
///
/// Implementations must be safe to share between threads. A `put` with
/// `hash_only` set computes the CID without making the block readable.
pub trait NodeStore: Send + Sync {
    /// Load and decode the node stored under `cid`.
    fn get(&self, cid: &Cid) -> Result<DagNode>;

    /// Encode `node`, derive its CID and persist it unless `hash_only`.
    fn put(&self, node: &DagNode, options: &PutOptions) -> Result<Cid>;

    /// Whether a block for `cid` is present.
    fn has(&self, cid: &Cid) -> Result<bool>;

    /// Store name for logging/debugging
    fn name(&self) -> &'static str;
}

impl<T: NodeStore + ?Sized> NodeStore for &T {
    fn get(&self, cid: &Cid) -> Result<DagNode> {
        (**self).get(cid)
    }

    fn put(&self, node: &DagNode, options: &PutOptions) -> Result<Cid> {
        (**self).put(node, options)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        (**self).has(cid)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: NodeStore + ?Sized> NodeStore for Arc<T> {
    fn get(&self, cid: &Cid) -> Result<DagNode> {
        (**self).get(cid)
    }

    fn put(&self, node: &DagNode, options: &PutOptions) -> Result<Cid> {
        (**self).put(node, options)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        (**self).has(cid)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Filesystem-backed node store
///
/// Stores blocks indexed by CID with a 2-level digest prefix fan-out.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a new store at the given root directory.
    ///
    /// The directory will be created if it doesn't exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Create a store at the default location (`~/.dagfs/blocks/`).
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self::new(home.join(".dagfs").join("blocks"))
    }

    /// Get the path where the block for `cid` would be stored.
    ///
    /// Layout: `<hash-alg>/ab/cd/<cid>`
    fn block_path(&self, cid: &Cid) -> Result<PathBuf> {
        let hex = cid.digest_hex();
        let (Some(l1), Some(l2)) = (hex.get(..2), hex.get(2..4)) else {
            return Err(CasError::InvalidCid(format!("digest too short for {}", cid)));
        };
        Ok(self
            .root
            .join(cid.hash_alg().name())
            .join(l1)
            .join(l2)
            .join(cid.to_string()))
    }

    /// Get the root path of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get statistics about the store.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for entry in self.block_files() {
            let entry = entry?;
            stats.block_count += 1;
            stats.total_bytes += entry.metadata().map_err(io::Error::from)?.len();
        }
        Ok(stats)
    }

    /// Iterate over the CIDs of every stored block.
    pub fn iter(&self) -> impl Iterator<Item = Result<Cid>> + '_ {
        self.block_files().map(|entry| {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy();
            name.parse::<Cid>()
        })
    }

    /// Walk block files, skipping in-flight temp files.
    fn block_files(&self) -> impl Iterator<Item = Result<walkdir::DirEntry>> + '_ {
        WalkDir::new(&self.root)
            .min_depth(4)
            .max_depth(4)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) if !e.file_type().is_file() => None,
                Ok(e) if e.path().extension().is_some_and(|ext| ext == "tmp") => None,
                Ok(e) => Some(Ok(e)),
                Err(e) => Some(Err(CasError::Io(io::Error::from(e)))),
            })
    }
}

impl NodeStore for FsStore {
    /// Retrieve a block and verify it against its CID.
    #[instrument(skip(self), level = "debug", fields(cid = %cid))]
    fn get(&self, cid: &Cid) -> Result<DagNode> {
        let path = self.block_path(cid)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CasError::NotFound {
                    cid: cid.to_string(),
                });
            }
            Err(e) => return Err(CasError::Io(e)),
        };
        verify_and_decode(cid, &bytes)
    }

    /// Store a block, returning its CID.
    ///
    /// If the block already exists, this is a no-op (deduplication).
    /// Uses unique temp file names so concurrent writers never collide.
    #[instrument(skip(self, node), level = "debug")]
    fn put(&self, node: &DagNode, options: &PutOptions) -> Result<Cid> {
        let (cid, bytes) = options.encode(node)?;
        if options.hash_only {
            return Ok(cid);
        }

        let path = self.block_path(&cid)?;
        if path.exists() {
            return Ok(cid);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_name = format!(
            "{}.{}.{:?}.tmp",
            cid,
            std::process::id(),
            std::thread::current().id()
        );
        let temp_path = path.with_file_name(&temp_name);
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        // Atomic rename - if another writer beat us, that's fine (same content)
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            if path.exists() {
                return Ok(cid);
            }
            return Err(CasError::Io(e));
        }

        tracing::debug!(cid = %cid, bytes = bytes.len(), "Stored block");
        Ok(cid)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.block_path(cid)?.exists())
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

/// Statistics about an [`FsStore`]
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of unique blocks stored
    pub block_count: u64,
    /// Total bytes stored (deduplicated)
    pub total_bytes: u64,
}

impl StoreStats {
    /// Calculate average block size
    pub fn avg_block_size(&self) -> u64 {
        if self.block_count == 0 {
            0
        } else {
            self.total_bytes / self.block_count
        }
    }
}
