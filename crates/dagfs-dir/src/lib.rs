//! # dagfs-dir
//!
//! Directory link engine for content-addressed file trees.
//!
//! Directories are immutable DAG nodes. Adding or removing an entry produces
//! a new directory node (and new nodes for every shard bucket on the way to
//! the entry); the caller decides when to publish the new root CID.
//!
//! Small directories keep their entries as a flat link list. Once the link
//! count crosses [`LinkOptions::shard_split_threshold`] the directory is
//! rewritten as a hash-array-mapped trie of buckets (see [`hamt`]).
//!
//! ```ignore
//! use dagfs_cas::MemoryStore;
//! use dagfs_dir::{AddLink, LinkEngine, LinkOptions};
//!
//! let engine = LinkEngine::new(MemoryStore::new());
//! let options = LinkOptions::default();
//! let dir = engine.create_directory(None, None, &options)?;
//! let dir = engine.add_link(
//!     AddLink::new().parent(&dir.cid).name("a.txt").cid(file_cid).size(12),
//!     &options,
//! )?;
//! ```

pub mod engine;
pub mod error;
pub mod hamt;
pub mod options;
pub mod read;
pub mod unixfs;

pub use engine::LinkEngine;
pub use error::{DirError, Result};
pub use options::{AddLink, LinkOptions, LinkResult, ParentRef, RemoveLink};
pub use read::Stat;
pub use unixfs::{EntryKind, Mtime, UnixFs};
