use std::{
    task::{Context, Poll},
    time::Duration,
};

use tokio::sync::{mpsc, oneshot};
use tower::Service;

use crate::{future::ResponseFuture, worker};

/// A [`tower::Service`] combinator that accumulates individual `Request`s
/// and flushes them as one call to an inner `Service<Vec<Request>>`,
/// broadcasting that call's single result back to every request in the
/// batch.
///
/// Used by `mined-status`'s updater (C7, §4.7) to turn per-node
/// `set_mined` calls into `max_mined_batch`-sized `set_mined_multi` calls
/// without the caller having to do its own chunking.
pub struct Batch<Request, Response, Error> {
    tx: mpsc::UnboundedSender<(Request, oneshot::Sender<Result<Response, Error>>)>,
}

impl<Request, Response, Error> Clone for Batch<Request, Response, Error> {
    fn clone(&self) -> Self {
        Batch { tx: self.tx.clone() }
    }
}

impl<Request, Response, Error> Batch<Request, Response, Error>
where
    Request: Send + 'static,
    Response: Clone + Send + 'static,
    Error: Clone + Send + 'static,
{
    /// Spawns the worker task and returns a handle to it.
    ///
    /// `max_items` bounds how many requests accumulate before a flush is
    /// forced; `max_latency` bounds how long the first request in a batch
    /// waits for more to join it.
    pub fn new<S>(service: S, max_items: usize, max_latency: Duration) -> Self
    where
        S: Service<Vec<Request>, Response = Response, Error = Error> + Send + 'static,
        S::Future: Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker::run(service, rx, max_items, max_latency));
        Batch { tx }
    }
}

impl<Request, Response, Error> Service<Request> for Batch<Request, Response, Error>
where
    Request: Send + 'static,
    Response: Clone + Send + 'static,
    Error: Clone + Send + 'static,
{
    type Response = Response;
    type Error = crate::error::BatchError<Error>;
    type Future = ResponseFuture<Response, Error>;

    /// Always ready: requests queue on an unbounded channel (the same
    /// "no size bound by design" choice the intake queue makes, §4.2) and
    /// backpressure is visible only through growing latency, not through
    /// `poll_ready`.
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send((request, reply_tx)).is_err() {
            // The worker is gone; the future will observe `BatchError::Closed`
            // once it's polled, since `reply_rx` never receives a value.
            tracing::warn!("batch worker has shut down; request will observe BatchError::Closed");
        }
        ResponseFuture::new(reply_rx)
    }
}
