//! Per-store snapshot files.
//!
//! | File       | Record                                                           |
//! |------------|------------------------------------------------------------------|
//! | `kvs`      | key_len u32, key, value_len u32, value                           |
//! | `leaves`   | version u32, key_len u32, key_offset u64, hash(32)               |
//! | `nodes`    | height u8, pad(3), version u32, size u32, key_leaf u32, hash(32) |
//! | `metadata` | magic u32, format u32, version u32                               |
//!
//! All integers are little-endian. `key_offset` points into `kvs`;
//! `key_leaf` is the index of the leaf holding the branch key, i.e. the
//! leftmost leaf of its right subtree. Branches are written in post-order.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::hash::{branch_hash, leaf_hash};
use crate::{ImportError, SnapshotNode};

pub(crate) const TREE_MAGIC: u32 = 0x4c56_4149; // "IAVL"
pub(crate) const TREE_FORMAT: u32 = 0;
pub(crate) const LEAF_RECORD_SIZE: usize = 48;
pub(crate) const NODE_RECORD_SIZE: usize = 48;

struct Subtree {
    hash: [u8; 32],
    size: i64,
    first_leaf: u32,
}

/// Summary of a closed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TreeSummary {
    pub(crate) name: String,
    pub(crate) root_hash: Option<[u8; 32]>,
    pub(crate) leaves: u32,
    pub(crate) branches: u32,
}

pub(crate) struct TreeWriter {
    name: String,
    version: u32,
    dir: PathBuf,
    kvs: BufWriter<File>,
    leaves: BufWriter<File>,
    nodes: BufWriter<File>,
    kv_offset: u64,
    leaf_count: u32,
    branch_count: u32,
    received: u64,
    pending: Vec<Subtree>,
}

impl TreeWriter {
    pub(crate) fn create(name: &str, dir: PathBuf, version: u32) -> Result<Self, ImportError> {
        fs::create_dir(&dir)?;
        let open = |file: &str| -> Result<BufWriter<File>, ImportError> {
            Ok(BufWriter::new(File::create(dir.join(file))?))
        };
        Ok(Self {
            name: name.to_owned(),
            version,
            kvs: open("kvs")?,
            leaves: open("leaves")?,
            nodes: open("nodes")?,
            dir,
            kv_offset: 0,
            leaf_count: 0,
            branch_count: 0,
            received: 0,
            pending: Vec::new(),
        })
    }

    pub(crate) fn add(&mut self, node: SnapshotNode) -> Result<(), ImportError> {
        self.received += 1;
        let version =
            u32::try_from(node.version).map_err(|_| ImportError::NodeVersionOutOfRange {
                store: self.name.clone(),
                version: node.version,
            })?;

        match node.height {
            0 => self.add_leaf(node, version),
            height if height > 0 => self.add_branch(node, version),
            height => Err(ImportError::InvalidHeight {
                store: self.name.clone(),
                position: self.received,
                height,
            }),
        }
    }

    fn add_leaf(&mut self, node: SnapshotNode, version: u32) -> Result<(), ImportError> {
        let key_len = self.fit_u32(node.key.len(), "key length")?;
        let value_len = self.fit_u32(node.value.len(), "value length")?;
        let index = self.leaf_count;
        self.leaf_count = self.leaf_count.checked_add(1).ok_or(ImportError::Overflow {
            store: self.name.clone(),
            what: "leaf count",
        })?;

        self.kvs.write_all(&key_len.to_le_bytes())?;
        self.kvs.write_all(&node.key)?;
        self.kvs.write_all(&value_len.to_le_bytes())?;
        self.kvs.write_all(&node.value)?;
        let key_offset = self.kv_offset + 4;
        self.kv_offset += 8 + u64::from(key_len) + u64::from(value_len);

        let hash = leaf_hash(node.version, &node.key, &node.value);
        let mut record = [0u8; LEAF_RECORD_SIZE];
        record[0..4].copy_from_slice(&version.to_le_bytes());
        record[4..8].copy_from_slice(&key_len.to_le_bytes());
        record[8..16].copy_from_slice(&key_offset.to_le_bytes());
        record[16..48].copy_from_slice(&hash);
        self.leaves.write_all(&record)?;

        self.pending.push(Subtree {
            hash,
            size: 1,
            first_leaf: index,
        });
        Ok(())
    }

    fn add_branch(&mut self, node: SnapshotNode, version: u32) -> Result<(), ImportError> {
        let (Some(right), Some(left)) = (self.pending.pop(), self.pending.pop()) else {
            return Err(ImportError::InvalidNodeOrder {
                store: self.name.clone(),
                position: self.received,
            });
        };

        let size = left.size + right.size;
        let packed_size = self.fit_u32(size as usize, "subtree size")?;
        let hash = branch_hash(node.height, size, node.version, &left.hash, &right.hash);

        let mut record = [0u8; NODE_RECORD_SIZE];
        record[0] = node.height as u8;
        record[4..8].copy_from_slice(&version.to_le_bytes());
        record[8..12].copy_from_slice(&packed_size.to_le_bytes());
        record[12..16].copy_from_slice(&right.first_leaf.to_le_bytes());
        record[16..48].copy_from_slice(&hash);
        self.nodes.write_all(&record)?;
        self.branch_count += 1;

        self.pending.push(Subtree {
            hash,
            size,
            first_leaf: left.first_leaf,
        });
        Ok(())
    }

    fn fit_u32(&self, value: usize, what: &'static str) -> Result<u32, ImportError> {
        u32::try_from(value).map_err(|_| ImportError::Overflow {
            store: self.name.clone(),
            what,
        })
    }

    /// Flushes every file and checks that the stream formed a single tree.
    pub(crate) fn finish(mut self) -> Result<TreeSummary, ImportError> {
        if self.pending.len() > 1 {
            return Err(ImportError::IncompleteTree {
                store: self.name,
                pending: self.pending.len(),
            });
        }

        let mut metadata = [0u8; 12];
        metadata[0..4].copy_from_slice(&TREE_MAGIC.to_le_bytes());
        metadata[4..8].copy_from_slice(&TREE_FORMAT.to_le_bytes());
        metadata[8..12].copy_from_slice(&self.version.to_le_bytes());
        fs::write(self.dir.join("metadata"), metadata)?;

        for writer in [&mut self.kvs, &mut self.leaves, &mut self.nodes] {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        Ok(TreeSummary {
            root_hash: self.pending.pop().map(|root| root.hash),
            name: self.name,
            leaves: self.leaf_count,
            branches: self.branch_count,
        })
    }
}
