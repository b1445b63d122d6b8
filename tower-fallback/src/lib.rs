//! A [`tower::Service`] combinator that retries a failed request against a
//! secondary service when the primary's error matches a predicate.
//!
//! Used by `block-validator`'s subtree fetcher (C5, §4.5): the primary
//! service reads from the blob store with retry; the fallback is a
//! peer-fetch resolver invoked only when the primary reports "not found".

mod future;
mod service;

pub use future::ResponseFuture;
pub use service::Fallback;

/// Decides whether a [`Fallback`] should retry a failed request against its
/// secondary service.
pub trait Predicate<E> {
    fn should_fallback(&self, error: &E) -> bool;
}

impl<F, E> Predicate<E> for F
where
    F: Fn(&E) -> bool,
{
    fn should_fallback(&self, error: &E) -> bool {
        (self)(error)
    }
}
