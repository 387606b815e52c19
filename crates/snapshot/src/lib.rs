//! Builder for multi-tree snapshots.
//!
//! A snapshot is a directory named `snapshot-<version>` holding one
//! sub-directory per store plus a JSON `metadata` file. Stores are imported
//! one after another from a flat post-order node stream: every node pushed
//! with [`SnapshotImporter::add_node`] belongs to the store most recently
//! declared with [`SnapshotImporter::add_tree`].

mod error;
mod hash;
mod importer;
mod tree;

pub use error::ImportError;
pub use importer::{MultiTreeImporter, SnapshotMetadata, TreeMetadata, snapshot_name};

/// A node as accepted by the importer. `height == 0` marks a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub version: i64,
    pub height: i8,
}

pub trait SnapshotImporter {
    /// Starts a new store. Closes the previous one, if any.
    fn add_tree(&mut self, name: &str) -> Result<(), ImportError>;

    /// Appends the next post-order node of the current store.
    fn add_node(&mut self, node: SnapshotNode) -> Result<(), ImportError>;

    /// Closes the last store and makes the snapshot durable.
    fn finalize(&mut self) -> Result<(), ImportError>;

    /// Releases the importer.
    fn close(self) -> Result<(), ImportError>;
}
