//! Migration of a legacy IAVL multi-store database into a multi-tree snapshot.
//!
//! The [`Migrator`] reads every store at its latest committed version and
//! replays the post-order node stream of each tree into a
//! [`SnapshotImporter`]. Stores without a committed tree are skipped; any
//! other failure aborts the run before the snapshot is finalized.

mod error;
mod observer;
mod orchestrator;

use std::path::Path;

use migrate_legacy::RocksDbSource;
use migrate_snapshot::MultiTreeImporter;
use tokio_util::sync::CancellationToken;

pub use error::MigrationError;
pub use observer::{MigrationObserver, Progress, TracingObserver};
pub use orchestrator::{
    DEFAULT_PROGRESS_INTERVAL, Discovery, MigrationSummary, Migrator, StoreOutcome, StoreSummary,
    discover_stores,
};

/// Migrates the legacy RocksDB database at `db_v0` into a new snapshot under
/// `out`.
pub fn migrate_to_snapshot(
    db_v0: &Path,
    out: &Path,
    cancel: &CancellationToken,
) -> Result<MigrationSummary, MigrationError> {
    Migrator::new(RocksDbSource::new(db_v0))
        .run(|version| MultiTreeImporter::new(out, version), cancel)
}
