use thiserror::Error;

use dagfs_cas::CasError;

use crate::unixfs::EntryKind;

/// Errors raised by directory mutations and reads
#[derive(Error, Debug)]
pub enum DirError {
    #[error("No parent node or CID passed")]
    InvalidParentReference,

    #[error("Invalid parent CID: {0}")]
    InvalidParentCid(String),

    #[error("No child CID passed")]
    MissingChildCid,

    #[error("No child name passed")]
    MissingChildName,

    #[error("No child size passed")]
    MissingChildSize,

    #[error("No link named {name}")]
    NotFound { name: String },

    #[error("Store failure: {0}")]
    Store(#[from] CasError),

    #[error("Invalid node metadata: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Not a directory: node is a {kind}")]
    NotADirectory { kind: EntryKind },

    #[error("Invalid shard: {0}")]
    InvalidShard(String),

    #[error("Name hash exhausted at depth {depth} for {name}")]
    ShardDepthExceeded { name: String, depth: u32 },
}

pub type Result<T> = std::result::Result<T, DirError>;
