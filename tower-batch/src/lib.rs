//! A [`tower::Service`] combinator that batches individual requests into
//! one call to an inner `Service<Vec<Request>>`.
//!
//! Originally built for signature-batch-verification, generalised here to
//! this workspace's bulk store calls: `mined-status`'s updater (C7, §4.7)
//! batches per-node "mark mined" requests into `max_mined_batch`-sized
//! groups before calling the external meta store's `set_mined_multi`.

mod error;
mod future;
mod service;
mod worker;

pub use error::BatchError;
pub use future::ResponseFuture;
pub use service::Batch;
