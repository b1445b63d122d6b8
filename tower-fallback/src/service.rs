use std::task::{Context, Poll};

use tower::Service;

use crate::{future::ResponseFuture, Predicate};

/// Wraps a primary and a fallback [`Service`] over the same request/response
/// types: on a primary error matching `predicate`, the same request is
/// retried against the fallback.
///
/// Readiness is reported from the primary only — the fallback is expected to
/// be a cheap clone (e.g. a `Buffer` handle) that doesn't need backpressure
/// of its own.
#[derive(Clone, Debug)]
pub struct Fallback<S1, S2, P> {
    primary: S1,
    fallback: S2,
    predicate: P,
}

impl<S1, S2, P> Fallback<S1, S2, P> {
    pub fn new(primary: S1, fallback: S2, predicate: P) -> Self {
        Fallback { primary, fallback, predicate }
    }
}

impl<S1, S2, P, Request> Service<Request> for Fallback<S1, S2, P>
where
    Request: Clone,
    S1: Service<Request>,
    S2: Service<Request, Response = S1::Response, Error = S1::Error> + Clone,
    P: Predicate<S1::Error> + Clone,
{
    type Response = S1::Response;
    type Error = S1::Error;
    type Future = ResponseFuture<S1, S2, P, Request>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.primary.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let primary_future = self.primary.call(request.clone());
        ResponseFuture::new(primary_future, self.fallback.clone(), self.predicate.clone(), request)
    }
}
