use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot version {0} does not fit in 32 bits")]
    VersionOutOfRange(i64),

    #[error("Snapshot already exists at {0}")]
    SnapshotExists(PathBuf),

    #[error("Invalid store name `{0}`")]
    InvalidStoreName(String),

    #[error("Store `{0}` was already imported")]
    DuplicateStore(String),

    #[error("Node received before any store was declared")]
    NoTreeDeclared,

    #[error("Store `{store}`: node #{position} has invalid height {height}")]
    InvalidHeight {
        store: String,
        position: u64,
        height: i8,
    },

    #[error("Store `{store}`: branch node #{position} has fewer than two pending children")]
    InvalidNodeOrder { store: String, position: u64 },

    #[error("Store `{store}`: node stream ended with {pending} detached subtrees")]
    IncompleteTree { store: String, pending: usize },

    #[error("Store `{store}`: node version {version} does not fit in 32 bits")]
    NodeVersionOutOfRange { store: String, version: i64 },

    #[error("Store `{store}`: {what} exceeds 32 bits")]
    Overflow { store: String, what: &'static str },

    #[error("Snapshot was already finalized")]
    AlreadyFinalized,

    #[error("Snapshot metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}
