//! Errors produced by the mined-status updater (§7).

use store_iface::{ErrorKind, StoreError};

/// A `Clone`-able summary of a [`StoreError`], used as the batch worker's
/// `tower::Service::Error` — `tower-batch` broadcasts one `Result` to every
/// request in a flushed batch, which requires `Error: Clone`, and the
/// boxed source inside `StoreError` rules that out directly.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct SharedStoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<StoreError> for SharedStoreError {
    fn from(error: StoreError) -> Self {
        SharedStoreError { kind: error.kind, message: error.message }
    }
}

/// An error observed by a caller of [`crate::updater::MinedStatusUpdater`].
#[derive(thiserror::Error, Debug, displaydoc::Display)]
pub enum UpdaterError {
    /// marking transactions as mined failed: {0}
    Store(#[from] SharedStoreError),
    /// mined-status batch worker has shut down
    Gone,
}

impl From<tower_batch::BatchError<SharedStoreError>> for UpdaterError {
    fn from(error: tower_batch::BatchError<SharedStoreError>) -> Self {
        match error {
            tower_batch::BatchError::Closed => UpdaterError::Gone,
            tower_batch::BatchError::Inner(error) => UpdaterError::Store(error),
        }
    }
}
