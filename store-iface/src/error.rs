//! The shared error taxonomy of §7, used across the assembler, validator
//! and mined-status updater so that callers can match on `kind()` rather
//! than downcasting crate-specific error enums.

/// A coarse error kind, used to decide retry/propagation behaviour
/// uniformly across crates (§7).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; surfaced to caller, never retried.
    InvalidArgument,
    /// Consensus failure; the block is rejected.
    BlockInvalid,
    /// Consensus failure; the subtree is rejected.
    SubtreeInvalid,
    /// Internal invariant broken; typically fatal for the current operation.
    Processing,
    /// Transient backend failure; retried with backoff up to a budget.
    Storage,
    /// Transient; caller retries or aborts cleanly.
    ServiceUnavailable,
    /// The calling context was cancelled.
    ContextCancelled,
    /// Expected during validation: the transaction wasn't found.
    TxNotFound,
    /// Expected during validation: the transaction itself is invalid.
    TxInvalid,
    /// Expected during validation: a lock-time rule was violated.
    LockTime,
    /// Too many missing transactions during subtree validation.
    ThresholdExceeded,
}

/// An error produced by a `store-iface` backend call.
#[derive(thiserror::Error, Debug)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        StoreError { kind, message: message.into(), source: None }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TxNotFound, message)
    }

    /// Whether a caller following §7's recovery boundaries should retry
    /// this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Storage | ErrorKind::ServiceUnavailable)
    }
}
