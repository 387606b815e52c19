use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::tree::{TreeSummary, TreeWriter};
use crate::{ImportError, SnapshotImporter, SnapshotNode};

const METADATA_FILE: &str = "metadata";
const CURRENT_LINK: &str = "current";

/// Directory name of the snapshot taken at `version`.
pub fn snapshot_name(version: u32) -> String {
    format!("snapshot-{version:020}")
}

/// Contents of the snapshot-level `metadata` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub version: u32,
    pub trees: Vec<TreeMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMetadata {
    pub name: String,
    /// Hex-encoded root hash, `None` for an empty tree.
    pub root_hash: Option<String>,
    pub leaves: u32,
    pub branches: u32,
}

impl TreeMetadata {
    fn from_summary(summary: TreeSummary) -> Self {
        Self {
            name: summary.name,
            root_hash: summary.root_hash.map(hex::encode),
            leaves: summary.leaves,
            branches: summary.branches,
        }
    }
}

impl SnapshotMetadata {
    pub fn load(snapshot_dir: &Path) -> Result<Self, ImportError> {
        let raw = fs::read(snapshot_dir.join(METADATA_FILE))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Writes a multi-tree snapshot under `out_dir`.
///
/// Trees are built in `snapshot-<version>.tmp`; [`SnapshotImporter::finalize`]
/// renames it into place and repoints the `current` link.
pub struct MultiTreeImporter {
    out_dir: PathBuf,
    tmp_dir: PathBuf,
    snapshot_dir: PathBuf,
    version: u32,
    current: Option<TreeWriter>,
    names: BTreeSet<String>,
    trees: Vec<TreeMetadata>,
    finalized: bool,
}

impl MultiTreeImporter {
    /// # Errors
    /// - If `version` is negative or larger than `u32::MAX`
    /// - If a snapshot for `version` already exists in `out_dir`
    /// - If the temporary directory cannot be created
    pub fn new(out_dir: impl Into<PathBuf>, version: i64) -> Result<Self, ImportError> {
        let version =
            u32::try_from(version).map_err(|_| ImportError::VersionOutOfRange(version))?;
        let out_dir = out_dir.into();
        let name = snapshot_name(version);
        let snapshot_dir = out_dir.join(&name);
        if snapshot_dir.exists() {
            return Err(ImportError::SnapshotExists(snapshot_dir));
        }

        let tmp_dir = out_dir.join(format!("{name}.tmp"));
        if tmp_dir.exists() {
            debug!(path = %tmp_dir.display(), "Removing stale snapshot build directory");
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        Ok(Self {
            out_dir,
            tmp_dir,
            snapshot_dir,
            version,
            current: None,
            names: BTreeSet::new(),
            trees: Vec::new(),
            finalized: false,
        })
    }

    /// Final location of the snapshot, valid once finalized.
    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    fn ensure_open(&self) -> Result<(), ImportError> {
        if self.finalized {
            return Err(ImportError::AlreadyFinalized);
        }
        Ok(())
    }

    fn finish_current(&mut self) -> Result<(), ImportError> {
        if let Some(writer) = self.current.take() {
            let summary = writer.finish()?;
            debug!(
                store = %summary.name,
                leaves = summary.leaves,
                branches = summary.branches,
                "Closed snapshot tree"
            );
            self.trees.push(TreeMetadata::from_summary(summary));
        }
        Ok(())
    }

    fn update_current_link(&self) -> Result<(), ImportError> {
        let name = snapshot_name(self.version);
        let link = self.out_dir.join(CURRENT_LINK);
        let tmp_link = self.out_dir.join(format!("{CURRENT_LINK}.tmp"));
        if fs::symlink_metadata(&tmp_link).is_ok() {
            fs::remove_file(&tmp_link)?;
        }

        #[cfg(unix)]
        std::os::unix::fs::symlink(&name, &tmp_link)?;
        #[cfg(not(unix))]
        fs::write(&tmp_link, &name)?;

        fs::rename(&tmp_link, &link)?;
        Ok(())
    }
}

fn valid_store_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && name != METADATA_FILE
}

impl SnapshotImporter for MultiTreeImporter {
    fn add_tree(&mut self, name: &str) -> Result<(), ImportError> {
        self.ensure_open()?;
        self.finish_current()?;
        if !valid_store_name(name) {
            return Err(ImportError::InvalidStoreName(name.to_owned()));
        }
        if !self.names.insert(name.to_owned()) {
            return Err(ImportError::DuplicateStore(name.to_owned()));
        }
        self.current = Some(TreeWriter::create(
            name,
            self.tmp_dir.join(name),
            self.version,
        )?);
        Ok(())
    }

    fn add_node(&mut self, node: SnapshotNode) -> Result<(), ImportError> {
        self.ensure_open()?;
        self.current
            .as_mut()
            .ok_or(ImportError::NoTreeDeclared)?
            .add(node)
    }

    fn finalize(&mut self) -> Result<(), ImportError> {
        self.ensure_open()?;
        self.finish_current()?;

        let metadata = SnapshotMetadata {
            version: self.version,
            trees: self.trees.clone(),
        };
        fs::write(
            self.tmp_dir.join(METADATA_FILE),
            serde_json::to_vec_pretty(&metadata)?,
        )?;
        fs::rename(&self.tmp_dir, &self.snapshot_dir)?;
        self.update_current_link()?;
        self.finalized = true;

        info!(
            path = %self.snapshot_dir.display(),
            version = self.version,
            trees = self.trees.len(),
            "Snapshot finalized"
        );
        Ok(())
    }

    fn close(mut self) -> Result<(), ImportError> {
        drop(self.current.take());
        if !self.finalized && self.tmp_dir.exists() {
            debug!(path = %self.tmp_dir.display(), "Discarding unfinished snapshot");
            fs::remove_dir_all(&self.tmp_dir)?;
        }
        Ok(())
    }
}
