use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project::pin_project;
use tower::Service;

use crate::Predicate;

/// The [`Future`] returned by [`crate::Fallback`]: polls the primary first,
/// switching to the fallback exactly once if the primary errors and
/// `predicate` says to retry.
#[pin_project(project = ResponseFutureProj)]
pub enum ResponseFuture<S1, S2, P, Request>
where
    S1: Service<Request>,
    S2: Service<Request, Response = S1::Response, Error = S1::Error>,
{
    Primary {
        #[pin]
        future: S1::Future,
        fallback: S2,
        predicate: P,
        request: Option<Request>,
    },
    Fallback {
        #[pin]
        future: S2::Future,
    },
}

impl<S1, S2, P, Request> ResponseFuture<S1, S2, P, Request>
where
    S1: Service<Request>,
    S2: Service<Request, Response = S1::Response, Error = S1::Error>,
{
    pub(crate) fn new(future: S1::Future, fallback: S2, predicate: P, request: Request) -> Self {
        ResponseFuture::Primary { future, fallback, predicate, request: Some(request) }
    }
}

impl<S1, S2, P, Request> Future for ResponseFuture<S1, S2, P, Request>
where
    S1: Service<Request>,
    S2: Service<Request, Response = S1::Response, Error = S1::Error>,
    P: Predicate<S1::Error>,
{
    type Output = Result<S1::Response, S1::Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.as_mut().project() {
                ResponseFutureProj::Primary { future, fallback, predicate, request } => match future.poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(response)) => return Poll::Ready(Ok(response)),
                    Poll::Ready(Err(error)) => {
                        if !predicate.should_fallback(&error) {
                            return Poll::Ready(Err(error));
                        }
                        let request = request.take().expect("primary future only ever polled to completion once");
                        let fallback_future = fallback.call(request);
                        self.set(ResponseFuture::Fallback { future: fallback_future });
                    }
                },
                ResponseFutureProj::Fallback { future } => return future.poll(cx),
            }
        }
    }
}
