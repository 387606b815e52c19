//! Writes legacy databases for tests.

use std::collections::BTreeMap;
use std::path::Path;

use rocksdb::{DB, Options};
use sha2::{Digest, Sha256};

use crate::LegacyError;
use crate::commit_info::{
    CommitInfo, LATEST_VERSION_KEY, commit_info_key, encode_commit_info, encode_latest_version,
};
use crate::encoding::encode::{put_bytes, put_varint};
use crate::node::{LegacyNode, NodeKind, node_key, root_key, store_prefix};

struct FixtureStore {
    version: i64,
    /// `None` registers the store in the commit info without writing a tree.
    leaves: Option<BTreeMap<Vec<u8>, Vec<u8>>>,
}

struct Subtree {
    hash: [u8; 32],
    size: i64,
    height: i8,
}

/// Builds a legacy multi-store database with balanced IAVL trees.
///
/// ```ignore
/// let roots = LegacyDbBuilder::new()
///     .with_tree("bank", 42, [(b"a".to_vec(), b"1".to_vec())])
///     .without_tree("staking", 42)
///     .write(path)?;
/// ```
#[derive(Default)]
pub struct LegacyDbBuilder {
    stores: BTreeMap<String, FixtureStore>,
}

impl LegacyDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` at `version` with a tree holding `leaves`.
    pub fn with_tree<I>(mut self, store: &str, version: i64, leaves: I) -> Self
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        self.stores.insert(
            store.to_owned(),
            FixtureStore {
                version,
                leaves: Some(leaves.into_iter().collect()),
            },
        );
        self
    }

    /// Registers `store` at `version` without ever committing a tree for it.
    pub fn without_tree(mut self, store: &str, version: i64) -> Self {
        self.stores.insert(
            store.to_owned(),
            FixtureStore {
                version,
                leaves: None,
            },
        );
        self
    }

    /// Writes the database and returns the root hash of every written tree.
    ///
    /// The commit info is stored at the highest registered store version.
    pub fn write(&self, path: &Path) -> Result<BTreeMap<String, Option<[u8; 32]>>, LegacyError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;

        let mut roots = BTreeMap::new();
        let mut commit_infos = Vec::with_capacity(self.stores.len());
        for (name, store) in &self.stores {
            let mut hash = Vec::new();
            if let Some(leaves) = &store.leaves {
                let prefix = store_prefix(name);
                let leaves: Vec<_> = leaves.iter().collect();
                let root = if leaves.is_empty() {
                    None
                } else {
                    Some(write_subtree(&db, &prefix, &leaves, store.version)?.hash)
                };
                db.put(
                    root_key(&prefix, store.version),
                    root.map(|hash| hash.to_vec()).unwrap_or_default(),
                )?;
                hash = root.map(|hash| hash.to_vec()).unwrap_or_default();
                roots.insert(name.clone(), root);
            }
            commit_infos.push(CommitInfo {
                name: name.clone(),
                version: store.version,
                hash,
            });
        }

        let latest = self
            .stores
            .values()
            .map(|store| store.version)
            .max()
            .unwrap_or_default();
        db.put(LATEST_VERSION_KEY, encode_latest_version(latest))?;
        db.put(
            commit_info_key(latest),
            encode_commit_info(latest, &commit_infos),
        )?;
        db.flush()?;

        Ok(roots)
    }
}

fn write_subtree(
    db: &DB,
    prefix: &[u8],
    leaves: &[(&Vec<u8>, &Vec<u8>)],
    version: i64,
) -> Result<Subtree, LegacyError> {
    let node = if let [(key, value)] = leaves {
        LegacyNode {
            height: 0,
            size: 1,
            version,
            key: key.to_vec(),
            kind: NodeKind::Leaf {
                value: value.to_vec(),
            },
        }
    } else {
        let mid = leaves.len() / 2;
        let left = write_subtree(db, prefix, &leaves[..mid], version)?;
        let right = write_subtree(db, prefix, &leaves[mid..], version)?;
        LegacyNode {
            height: left.height.max(right.height) + 1,
            size: left.size + right.size,
            version,
            key: leaves[mid].0.to_vec(),
            kind: NodeKind::Branch {
                left: left.hash.to_vec(),
                right: right.hash.to_vec(),
            },
        }
    };

    let hash = node_hash(&node);
    db.put(node_key(prefix, &hash), node.encode())?;
    Ok(Subtree {
        hash,
        size: node.size,
        height: node.height,
    })
}

/// IAVL node hash: sha256 over height, size, version and either the key and
/// value digest (leaves) or both child hashes (branches).
fn node_hash(node: &LegacyNode) -> [u8; 32] {
    let mut buf = Vec::new();
    put_varint(&mut buf, i64::from(node.height));
    put_varint(&mut buf, node.size);
    put_varint(&mut buf, node.version);
    match &node.kind {
        NodeKind::Leaf { value } => {
            put_bytes(&mut buf, &node.key);
            put_bytes(&mut buf, &Sha256::digest(value));
        }
        NodeKind::Branch { left, right } => {
            put_bytes(&mut buf, left);
            put_bytes(&mut buf, right);
        }
    }
    Sha256::digest(&buf).into()
}
