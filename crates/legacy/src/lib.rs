//! Read-only access to legacy (v0) IAVL multi-store databases.
//!
//! A legacy database holds one IAVL tree per logical store plus the commit
//! info of the latest committed version. This crate exposes that data through
//! a small set of traits so that consumers can stream every node of a store in
//! post-order without knowing the on-disk layout:
//!
//! - [`LegacySource`] opens independent readers over the same database.
//! - [`LegacyStoreReader`] reports per-store commit info and hands out trees.
//! - [`TreeHandle`] produces a [`NodeExporter`] for one tree.
//! - [`NodeExporter`] yields [`ExportItem`]s until [`ExportItem::Done`].
//!
//! The RocksDB implementation lives in [`store`].

mod commit_info;
mod encoding;
mod error;
mod exporter;
#[cfg(any(test, feature = "test-utils"))]
mod fixture;
mod node;
pub mod store;

use std::collections::BTreeMap;

pub use commit_info::CommitInfo;
pub use encoding::DecodeError;
pub use error::LegacyError;
pub use exporter::IavlExporter;
#[cfg(any(test, feature = "test-utils"))]
pub use fixture::LegacyDbBuilder;
pub use store::{IavlTree, RocksDbReader, RocksDbSource};

/// A node produced by a tree export.
///
/// Branch nodes (`height > 0`) carry an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedNode {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub version: i64,
    pub height: i8,
}

impl ExportedNode {
    pub fn is_leaf(&self) -> bool {
        self.height == 0
    }
}

/// Result of pulling one item from a [`NodeExporter`].
///
/// `Done` is the normal end of the stream and is never an error.
#[derive(Debug)]
pub enum ExportItem {
    Node(ExportedNode),
    Done,
    Failed(LegacyError),
}

/// Root of a committed tree. `hash` is `None` for a tree committed empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRoot {
    pub version: i64,
    pub hash: Option<[u8; 32]>,
}

/// Opens readers over a legacy database.
///
/// Every call returns a fresh, independent handle.
pub trait LegacySource {
    type Reader: LegacyStoreReader;

    fn open(&self) -> Result<Self::Reader, LegacyError>;
}

pub trait LegacyStoreReader {
    type Tree: TreeHandle;

    /// Commit info of the latest committed version, keyed by store name.
    fn commit_info_by_name(&self) -> &BTreeMap<String, CommitInfo>;

    /// Loads the latest committed tree of `store`.
    ///
    /// Fails with [`LegacyError::TreeUnavailable`] when the store never
    /// committed a tree.
    fn latest_tree(&self, store: &str) -> Result<(TreeRoot, Self::Tree), LegacyError>;
}

pub trait TreeHandle {
    type Exporter: NodeExporter;

    fn export(&self) -> Result<Self::Exporter, LegacyError>;
}

/// Forward-only producer of tree nodes in post-order (left, right, parent).
pub trait NodeExporter {
    /// Pulls the next node. Once `Done` or `Failed` has been returned every
    /// further call returns `Done`.
    fn next(&mut self) -> ExportItem;
}
