use std::time::{Duration, Instant};

use migrate_legacy::{
    ExportItem, ExportedNode, LegacySource, LegacyStoreReader, NodeExporter, TreeHandle,
};
use migrate_snapshot::{ImportError, SnapshotImporter, SnapshotNode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::MigrationError;
use crate::observer::{MigrationObserver, Progress, TracingObserver};

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Stores found in the legacy database and the version they all share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub stores: Vec<String>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StoreOutcome {
    Migrated { nodes: u64 },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub name: String,
    #[serde(flatten)]
    pub outcome: StoreOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub version: i64,
    pub stores: Vec<StoreSummary>,
    pub elapsed: Duration,
}

impl MigrationSummary {
    pub fn migrated_stores(&self) -> usize {
        self.stores
            .iter()
            .filter(|store| matches!(store.outcome, StoreOutcome::Migrated { .. }))
            .count()
    }

    pub fn skipped_stores(&self) -> usize {
        self.stores.len() - self.migrated_stores()
    }

    pub fn total_nodes(&self) -> u64 {
        self.stores
            .iter()
            .map(|store| match store.outcome {
                StoreOutcome::Migrated { nodes } => nodes,
                StoreOutcome::Skipped { .. } => 0,
            })
            .sum()
    }
}

/// Checks that every store committed at the same version.
///
/// Stores are returned in the reader's (name) order.
pub fn discover_stores<R: LegacyStoreReader>(reader: &R) -> Result<Discovery, MigrationError> {
    let mut expected = None;
    let mut stores = Vec::with_capacity(reader.commit_info_by_name().len());
    for (name, info) in reader.commit_info_by_name() {
        match expected {
            None => expected = Some(info.version),
            Some(version) if version != info.version => {
                return Err(MigrationError::VersionMismatch {
                    store: name.clone(),
                    expected: version,
                    found: info.version,
                });
            }
            Some(_) => {}
        }
        stores.push(name.clone());
    }

    let version = expected.ok_or(MigrationError::NoStores)?;
    Ok(Discovery { stores, version })
}

fn to_snapshot_node(node: ExportedNode) -> SnapshotNode {
    SnapshotNode {
        key: node.key,
        value: node.value,
        version: node.version,
        height: node.height,
    }
}

/// Drives a migration from a legacy source into a snapshot importer.
pub struct Migrator<S, O = TracingObserver> {
    source: S,
    observer: O,
    progress_interval: u64,
}

impl<S: LegacySource> Migrator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            observer: TracingObserver,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl<S: LegacySource, O: MigrationObserver> Migrator<S, O> {
    pub fn with_observer<P: MigrationObserver>(self, observer: P) -> Migrator<S, P> {
        Migrator {
            source: self.source,
            observer,
            progress_interval: self.progress_interval,
        }
    }

    /// Sets how many nodes pass between two progress events. Zero disables them.
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn discover(&mut self) -> Result<Discovery, MigrationError> {
        let reader = self.source.open().map_err(MigrationError::OpenLegacy)?;
        let discovery = discover_stores(&reader)?;
        self.observer
            .stores_discovered(&discovery.stores, discovery.version);
        Ok(discovery)
    }

    /// Streams the latest tree of `store` into `importer`.
    ///
    /// A store whose tree cannot be loaded is skipped without touching the
    /// importer.
    pub fn migrate_store<I: SnapshotImporter>(
        &mut self,
        store: &str,
        version: i64,
        importer: &mut I,
    ) -> Result<StoreOutcome, MigrationError> {
        let reader = self
            .source
            .open()
            .map_err(|source| MigrationError::ReopenLegacy {
                store: store.to_owned(),
                source,
            })?;

        let (root, tree) = match reader.latest_tree(store) {
            Ok(loaded) => loaded,
            Err(reason) => {
                self.observer.store_skipped(store, &reason);
                return Ok(StoreOutcome::Skipped {
                    reason: reason.to_string(),
                });
            }
        };
        debug!(store, version, tree_version = root.version, "Loaded latest tree");

        self.observer.store_started(store);
        let import_failed = |source: ImportError| MigrationError::ImportFailed {
            store: store.to_owned(),
            source,
        };
        importer.add_tree(store).map_err(import_failed)?;

        let mut exporter = tree.export().map_err(|source| MigrationError::ExportFailed {
            store: store.to_owned(),
            source,
        })?;

        let mut count = 0u64;
        let mut last_report = Instant::now();
        loop {
            let node = match exporter.next() {
                ExportItem::Node(node) => node,
                ExportItem::Done => break,
                ExportItem::Failed(source) => {
                    return Err(MigrationError::ExportFailed {
                        store: store.to_owned(),
                        source,
                    });
                }
            };

            importer
                .add_node(to_snapshot_node(node))
                .map_err(import_failed)?;
            count += 1;

            if self.progress_interval > 0 && count % self.progress_interval == 0 {
                let now = Instant::now();
                let progress =
                    Progress::new(count, self.progress_interval, now - last_report);
                self.observer.progress(store, progress);
                last_report = now;
            }
        }

        self.observer.store_migrated(store, count);
        Ok(StoreOutcome::Migrated { nodes: count })
    }

    /// Runs the whole migration.
    ///
    /// `create_importer` is only called once every store agreed on a version.
    /// The importer is finalized and closed exactly once on success; on any
    /// fatal error it is dropped unfinished.
    pub fn run<I, F>(
        mut self,
        create_importer: F,
        cancel: &CancellationToken,
    ) -> Result<MigrationSummary, MigrationError>
    where
        I: SnapshotImporter,
        F: FnOnce(i64) -> Result<I, ImportError>,
    {
        let started = Instant::now();
        let Discovery { stores, version } = self.discover()?;
        let mut importer = create_importer(version).map_err(MigrationError::CreateImporter)?;

        let mut summaries = Vec::with_capacity(stores.len());
        for store in stores {
            if cancel.is_cancelled() {
                return Err(MigrationError::Cancelled {
                    completed_stores: summaries.len(),
                });
            }
            let outcome = self.migrate_store(&store, version, &mut importer)?;
            summaries.push(StoreSummary {
                name: store,
                outcome,
            });
        }

        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled {
                completed_stores: summaries.len(),
            });
        }
        importer.finalize().map_err(MigrationError::FinalizeFailed)?;
        importer.close().map_err(MigrationError::CloseFailed)?;

        let summary = MigrationSummary {
            version,
            stores: summaries,
            elapsed: started.elapsed(),
        };
        self.observer.snapshot_finalized(&summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(outcomes: Vec<StoreOutcome>) -> MigrationSummary {
        MigrationSummary {
            version: 1,
            stores: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| StoreSummary {
                    name: format!("store{i}"),
                    outcome,
                })
                .collect(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn summary_totals() {
        let summary = summary(vec![
            StoreOutcome::Migrated { nodes: 5 },
            StoreOutcome::Skipped {
                reason: "gone".into(),
            },
            StoreOutcome::Migrated { nodes: 0 },
        ]);
        assert_eq!(summary.migrated_stores(), 2);
        assert_eq!(summary.skipped_stores(), 1);
        assert_eq!(summary.total_nodes(), 5);
    }

    #[test]
    fn store_summary_flattens_outcome() {
        let store = StoreSummary {
            name: "bank".into(),
            outcome: StoreOutcome::Migrated { nodes: 3 },
        };
        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "bank", "outcome": "migrated", "nodes": 3})
        );
    }
}
