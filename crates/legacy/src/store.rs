//! RocksDB backed legacy database.
//!
//! The database is always opened read-only; several readers may be open on
//! the same path at once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options};
use tracing::debug;

use crate::commit_info::{
    CommitInfo, LATEST_VERSION_KEY, commit_info_key, decode_commit_info, decode_latest_version,
};
use crate::exporter::IavlExporter;
use crate::node::{decode_root_hash, decode_root_version, root_key_prefix, store_prefix};
use crate::{LegacyError, LegacySource, LegacyStoreReader, TreeHandle, TreeRoot};

pub(crate) type Db = DBWithThreadMode<MultiThreaded>;

/// Opens a [`RocksDbReader`] on every [`LegacySource::open`] call.
#[derive(Debug, Clone)]
pub struct RocksDbSource {
    path: PathBuf,
}

impl RocksDbSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LegacySource for RocksDbSource {
    type Reader = RocksDbReader;

    fn open(&self) -> Result<Self::Reader, LegacyError> {
        RocksDbReader::open(&self.path)
    }
}

pub struct RocksDbReader {
    db: Arc<Db>,
    latest_version: i64,
    commit_infos: BTreeMap<String, CommitInfo>,
}

impl RocksDbReader {
    /// Opens the database read-only and loads the latest commit info.
    ///
    /// # Errors
    /// - If the database cannot be opened
    /// - If `s/latest` or the matching commit info record is missing or malformed
    pub fn open(path: &Path) -> Result<Self, LegacyError> {
        let mut opts = Options::default();
        opts.set_disable_auto_compactions(true);
        opts.set_allow_mmap_reads(true);

        let db = Db::open_for_read_only(&opts, path, false)?;

        let raw = db
            .get(LATEST_VERSION_KEY)?
            .ok_or(LegacyError::MissingLatestVersion)?;
        let latest_version =
            decode_latest_version(&raw).map_err(LegacyError::decode("latest version"))?;

        let raw = db
            .get(commit_info_key(latest_version))?
            .ok_or(LegacyError::MissingCommitInfo(latest_version))?;
        let commit_infos: BTreeMap<_, _> = decode_commit_info(&raw)
            .map_err(LegacyError::decode("commit info"))?
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();

        debug!(
            path = %path.display(),
            latest_version,
            stores = commit_infos.len(),
            "Opened legacy database"
        );

        Ok(Self {
            db: Arc::new(db),
            latest_version,
            commit_infos,
        })
    }

    /// Version recorded under `s/latest`.
    pub fn latest_version(&self) -> i64 {
        self.latest_version
    }
}

impl LegacyStoreReader for RocksDbReader {
    type Tree = IavlTree;

    fn commit_info_by_name(&self) -> &BTreeMap<String, CommitInfo> {
        &self.commit_infos
    }

    fn latest_tree(&self, store: &str) -> Result<(TreeRoot, IavlTree), LegacyError> {
        let prefix = store_prefix(store);
        let roots = root_key_prefix(&prefix);
        let mut upper = roots.clone();
        upper.extend_from_slice(&[0xff; 8]);

        // Root keys sort by big-endian version, so the first key at or below
        // `upper` is the latest root, if the store has any.
        let unavailable = || LegacyError::TreeUnavailable {
            store: store.to_owned(),
        };
        let (key, value) = self
            .db
            .iterator(IteratorMode::From(&upper, Direction::Reverse))
            .next()
            .ok_or_else(unavailable)??;
        if !key.starts_with(&roots) {
            return Err(unavailable());
        }

        let root = TreeRoot {
            version: decode_root_version(&key[roots.len()..])
                .map_err(LegacyError::decode("root key"))?,
            hash: decode_root_hash(&value).map_err(LegacyError::decode("root hash"))?,
        };

        Ok((
            root,
            IavlTree {
                db: Arc::clone(&self.db),
                store: store.to_owned(),
                prefix,
                root,
            },
        ))
    }
}

/// A committed IAVL tree of one store.
pub struct IavlTree {
    db: Arc<Db>,
    store: String,
    prefix: Vec<u8>,
    root: TreeRoot,
}

impl TreeHandle for IavlTree {
    type Exporter = IavlExporter;

    fn export(&self) -> Result<IavlExporter, LegacyError> {
        IavlExporter::new(
            Arc::clone(&self.db),
            self.store.clone(),
            self.prefix.clone(),
            self.root.hash,
        )
    }
}
