use crate::encoding::DecodeError;

#[derive(Debug, thiserror::Error)]
pub enum LegacyError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Latest version marker `s/latest` not found")]
    MissingLatestVersion,

    #[error("Commit info for version {0} not found")]
    MissingCommitInfo(i64),

    #[error("Store `{store}` has no committed tree")]
    TreeUnavailable { store: String },

    #[error("Node {hash} of store `{store}` not found")]
    MissingNode { store: String, hash: String },

    #[error("Malformed {what}")]
    Decode {
        what: &'static str,
        #[source]
        source: DecodeError,
    },
}

impl LegacyError {
    pub(crate) fn decode(what: &'static str) -> impl FnOnce(DecodeError) -> Self {
        move |source| Self::Decode { what, source }
    }
}
