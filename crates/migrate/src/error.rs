use migrate_legacy::LegacyError;
use migrate_snapshot::ImportError;

/// Fatal migration failures. A store without a committed tree is not an
/// error; it surfaces as [`crate::StoreOutcome::Skipped`].
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Cannot open legacy database")]
    OpenLegacy(#[source] LegacyError),

    #[error("Cannot reopen legacy database for store `{store}`")]
    ReopenLegacy {
        store: String,
        #[source]
        source: LegacyError,
    },

    #[error("Legacy database has no committed stores")]
    NoStores,

    #[error("Store keys have different versions: `{store}` is at {found}, expected {expected}")]
    VersionMismatch {
        store: String,
        expected: i64,
        found: i64,
    },

    #[error("Cannot create snapshot importer")]
    CreateImporter(#[source] ImportError),

    #[error("Export of store `{store}` failed")]
    ExportFailed {
        store: String,
        #[source]
        source: LegacyError,
    },

    #[error("Import of store `{store}` failed")]
    ImportFailed {
        store: String,
        #[source]
        source: ImportError,
    },

    #[error("Cannot finalize snapshot")]
    FinalizeFailed(#[source] ImportError),

    #[error("Cannot close snapshot importer")]
    CloseFailed(#[source] ImportError),

    #[error("Migration cancelled after {completed_stores} store(s)")]
    Cancelled { completed_stores: usize },
}

impl MigrationError {
    /// Stable label used in machine-readable reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenLegacy(_) => "open_legacy",
            Self::ReopenLegacy { .. } => "reopen_legacy",
            Self::NoStores => "no_stores",
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::CreateImporter(_) => "create_importer",
            Self::ExportFailed { .. } => "export_failed",
            Self::ImportFailed { .. } => "import_failed",
            Self::FinalizeFailed(_) => "finalize_failed",
            Self::CloseFailed(_) => "close_failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Run phase in which the error occurred.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::OpenLegacy(_) | Self::NoStores | Self::VersionMismatch { .. } => "discovery",
            Self::ReopenLegacy { .. }
            | Self::CreateImporter(_)
            | Self::ExportFailed { .. }
            | Self::ImportFailed { .. }
            | Self::Cancelled { .. } => "migration",
            Self::FinalizeFailed(_) | Self::CloseFailed(_) => "finalization",
        }
    }
}
