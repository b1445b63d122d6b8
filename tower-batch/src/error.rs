//! Errors produced by a [`crate::Batch`] service.

use std::fmt;

/// An error produced calling through a [`crate::Batch`].
#[derive(Clone, Debug)]
pub enum BatchError<E> {
    /// The batch worker task has shut down; no further requests can be
    /// served.
    Closed,
    /// The inner service returned this error for the whole batch; every
    /// request in that batch observes the same value.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for BatchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::Closed => write!(f, "batch worker has shut down"),
            BatchError::Inner(error) => write!(f, "{error}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BatchError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchError::Closed => None,
            BatchError::Inner(error) => Some(error),
        }
    }
}
