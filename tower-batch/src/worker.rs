//! The batching worker task: a single owner task that accumulates incoming
//! requests and flushes them as one call to the wrapped service, matching
//! this workspace's recurring "single consumer task over a channel" idiom
//! (see `subtree-assembler::processor`).

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tower::Service;

type Job<Request, Response, Error> = (Request, oneshot::Sender<Result<Response, Error>>);

/// Runs until every [`crate::Batch`] handle has been dropped.
///
/// Buffers incoming requests until either `max_items` have accumulated or
/// `max_latency` has elapsed since the first request in the buffer arrived,
/// then calls `service` once with the whole `Vec<Request>` and broadcasts
/// its single `Result` to every waiting caller.
pub(crate) async fn run<S, Request>(
    mut service: S,
    mut rx: mpsc::UnboundedReceiver<Job<Request, S::Response, S::Error>>,
    max_items: usize,
    max_latency: Duration,
) where
    S: Service<Vec<Request>>,
    S::Response: Clone,
    S::Error: Clone,
{
    let mut buffer: Vec<Job<Request, S::Response, S::Error>> = Vec::with_capacity(max_items);

    loop {
        let Some(first) = rx.recv().await else {
            tracing::debug!("all batch handles dropped, shutting down worker");
            return;
        };
        buffer.push(first);

        let deadline = tokio::time::sleep(max_latency);
        tokio::pin!(deadline);

        while buffer.len() < max_items {
            tokio::select! {
                biased;

                maybe_job = rx.recv() => {
                    match maybe_job {
                        Some(job) => buffer.push(job),
                        None => break,
                    }
                }
                _ = &mut deadline => break,
            }
        }

        flush(&mut service, &mut buffer).await;
    }
}

async fn flush<S, Request>(service: &mut S, buffer: &mut Vec<(Request, oneshot::Sender<Result<S::Response, S::Error>>)>)
where
    S: Service<Vec<Request>>,
    S::Response: Clone,
    S::Error: Clone,
{
    if buffer.is_empty() {
        return;
    }

    let jobs = std::mem::replace(buffer, Vec::with_capacity(buffer.capacity()));
    let (requests, senders): (Vec<Request>, Vec<_>) = jobs.into_iter().unzip();

    let result = match futures::future::poll_fn(|cx| service.poll_ready(cx)).await {
        Ok(()) => service.call(requests).await,
        Err(error) => Err(error),
    };

    for sender in senders {
        let _ = sender.send(result.clone());
    }
}
