use std::time::Duration;

use migrate_legacy::LegacyError;
use tracing::{info, warn};

use crate::MigrationSummary;

/// Throughput sample emitted every `progress_interval` nodes of a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Nodes migrated so far for the current store.
    pub count: u64,
    /// Time since the previous sample.
    pub interval: Duration,
    /// Nodes per second over `interval`.
    pub rate: u64,
}

impl Progress {
    pub(crate) fn new(count: u64, batch: u64, interval: Duration) -> Self {
        let secs = interval.as_secs_f64();
        let rate = if secs > 0.0 {
            (batch as f64 / secs) as u64
        } else {
            batch
        };
        Self {
            count,
            interval,
            rate,
        }
    }
}

/// Receives migration events. Every method defaults to a no-op.
pub trait MigrationObserver {
    fn stores_discovered(&mut self, _stores: &[String], _version: i64) {}

    fn store_started(&mut self, _store: &str) {}

    fn store_skipped(&mut self, _store: &str, _reason: &LegacyError) {}

    fn progress(&mut self, _store: &str, _progress: Progress) {}

    fn store_migrated(&mut self, _store: &str, _nodes: u64) {}

    fn snapshot_finalized(&mut self, _summary: &MigrationSummary) {}
}

impl<O: MigrationObserver + ?Sized> MigrationObserver for &mut O {
    fn stores_discovered(&mut self, stores: &[String], version: i64) {
        (**self).stores_discovered(stores, version)
    }

    fn store_started(&mut self, store: &str) {
        (**self).store_started(store)
    }

    fn store_skipped(&mut self, store: &str, reason: &LegacyError) {
        (**self).store_skipped(store, reason)
    }

    fn progress(&mut self, store: &str, progress: Progress) {
        (**self).progress(store, progress)
    }

    fn store_migrated(&mut self, store: &str, nodes: u64) {
        (**self).store_migrated(store, nodes)
    }

    fn snapshot_finalized(&mut self, summary: &MigrationSummary) {
        (**self).snapshot_finalized(summary)
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl MigrationObserver for TracingObserver {
    fn stores_discovered(&mut self, stores: &[String], version: i64) {
        info!(stores = stores.len(), version, "Discovered legacy stores");
    }

    fn store_started(&mut self, store: &str) {
        info!(store, "Migrating store");
    }

    fn store_skipped(&mut self, store: &str, reason: &LegacyError) {
        warn!(store, %reason, "Skipping store");
    }

    fn progress(&mut self, store: &str, progress: Progress) {
        info!(
            store,
            count = progress.count,
            elapsed = ?progress.interval,
            rate = progress.rate,
            "Migration progress"
        );
    }

    fn store_migrated(&mut self, store: &str, nodes: u64) {
        info!(store, nodes, "Store migrated");
    }

    fn snapshot_finalized(&mut self, summary: &MigrationSummary) {
        info!(
            version = summary.version,
            migrated = summary.migrated_stores(),
            skipped = summary.skipped_stores(),
            nodes = summary.total_nodes(),
            elapsed = ?summary.elapsed,
            "Migration completed"
        );
    }
}
