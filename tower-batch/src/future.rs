use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project::pin_project;
use tokio::sync::oneshot;

use crate::error::BatchError;

/// The [`Future`] returned by [`crate::Batch::call`]: resolves once the
/// worker task has flushed the batch this request landed in and broadcast
/// its shared result.
#[pin_project]
pub struct ResponseFuture<Response, Error> {
    #[pin]
    rx: oneshot::Receiver<Result<Response, Error>>,
}

impl<Response, Error> ResponseFuture<Response, Error> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<Response, Error>>) -> Self {
        ResponseFuture { rx }
    }
}

impl<Response, Error> Future for ResponseFuture<Response, Error> {
    type Output = Result<Response, BatchError<Error>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.rx.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result.map_err(BatchError::Inner)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BatchError::Closed)),
        }
    }
}
