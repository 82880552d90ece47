use datawars::SourceError;
use storage::StoreError;
use thiserror::Error;

/// Why a unit of synchronization made no progress.
///
/// None of these leave partially written rows behind; retrying later is safe.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote source unavailable: {0}")]
    RemoteUnavailable(#[from] SourceError),

    #[error("remote source returned no data for {what}")]
    RemoteEmptyResult { what: String },

    #[error("local store rejected write: {0}")]
    StoreWriteFailure(#[source] StoreError),

    #[error("local store read failed: {0}")]
    StoreReadFailure(#[source] StoreError),
}

impl SyncError {
    /// Stable label for metrics and incident records.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::RemoteUnavailable(_) => "remote_unavailable",
            SyncError::RemoteEmptyResult { .. } => "remote_empty_result",
            SyncError::StoreWriteFailure(_) => "store_write_failure",
            SyncError::StoreReadFailure(_) => "store_read_failure",
        }
    }
}
