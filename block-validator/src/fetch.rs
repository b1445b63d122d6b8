//! C5: the subtree fetcher, built on `tower-fallback`: a primary service
//! reads from the blob store with jittered exponential backoff; an
//! optional fallback invokes a peer-fetch resolver once on a not-found
//! error (§4.5).

use std::{
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use store_iface::{BlobStore, Extension, ErrorKind, StoreError, SubtreeFetcher};
use subtree_primitives::{Hash, Subtree, SubtreeMeta};
use tower::{Service, ServiceExt};
use tower_fallback::Fallback;

use crate::{config::Config, retry::retry_storage_call};

/// What's being fetched: a subtree's leaves, or its optional `.meta`
/// sidecar (§4.5).
#[derive(Clone, Copy, Debug)]
enum FetchKind {
    Subtree { leaf_capacity: u64 },
    Meta,
}

#[derive(Clone, Debug)]
struct FetchRequest {
    hash: Hash,
    kind: FetchKind,
}

#[derive(Clone, Debug)]
enum FetchResponse {
    Subtree(Subtree),
    Meta(Option<SubtreeMeta>),
}

/// A resolver consulted only after the blob store itself reports "not
/// found" for a subtree — typically a peer-fetch over the legacy protocol
/// (§4.5). Framing and peer discovery are out of scope (§1); this is just
/// the capability boundary.
#[async_trait]
pub trait PeerSubtreeResolver: Send + Sync {
    async fn fetch_subtree(&self, hash: Hash, leaf_capacity: u64) -> Result<Subtree, StoreError>;
}

/// Retries a fetch against the blob store with jittered exponential
/// backoff, stopping after `max_attempts` or on a non-retryable error
/// (§4.5, §7).
#[derive(Clone)]
struct BlobFetchService {
    blob_store: Arc<dyn BlobStore>,
    initial_backoff: Duration,
    max_backoff: Duration,
    max_attempts: u32,
}

impl BlobFetchService {
    async fn fetch_once(&self, request: FetchRequest) -> Result<FetchResponse, StoreError> {
        let ext = match request.kind {
            FetchKind::Subtree { .. } => Extension::Subtree,
            FetchKind::Meta => Extension::Meta,
        };

        retry_storage_call(self.initial_backoff, self.max_backoff, self.max_attempts, || async {
            self.blob_store.get(request.hash, ext).await.and_then(|bytes| decode(request.kind, &bytes[..]))
        })
        .await
    }
}

fn decode(kind: FetchKind, bytes: &[u8]) -> Result<FetchResponse, StoreError> {
    match kind {
        FetchKind::Subtree { leaf_capacity } => Subtree::deserialize(bytes, leaf_capacity)
            .map(FetchResponse::Subtree)
            .map_err(|error| StoreError::new(ErrorKind::InvalidArgument, error.to_string())),
        FetchKind::Meta => SubtreeMeta::deserialize(bytes)
            .map(|meta| FetchResponse::Meta(Some(meta)))
            .map_err(|error| StoreError::new(ErrorKind::InvalidArgument, error.to_string())),
    }
}

impl Service<FetchRequest> for BlobFetchService {
    type Response = FetchResponse;
    type Error = StoreError;
    type Future = BoxFuture<'static, Result<FetchResponse, StoreError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: FetchRequest) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.fetch_once(request).await })
    }
}

/// Invokes the configured [`PeerSubtreeResolver`], translating a `.meta`
/// request (which has no peer-fetch equivalent, §4.5: "absent meta is not
/// fatal") into an immediate not-found.
#[derive(Clone)]
struct PeerFetchService {
    resolver: Arc<dyn PeerSubtreeResolver>,
}

impl Service<FetchRequest> for PeerFetchService {
    type Response = FetchResponse;
    type Error = StoreError;
    type Future = BoxFuture<'static, Result<FetchResponse, StoreError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: FetchRequest) -> Self::Future {
        let resolver = self.resolver.clone();
        Box::pin(async move {
            match request.kind {
                FetchKind::Subtree { leaf_capacity } => {
                    resolver.fetch_subtree(request.hash, leaf_capacity).await.map(FetchResponse::Subtree)
                }
                FetchKind::Meta => Ok(FetchResponse::Meta(None)),
            }
        })
    }
}

fn is_not_found(error: &StoreError) -> bool {
    error.kind == ErrorKind::TxNotFound
}

/// The public C5 service: wraps the retrying blob fetch, optionally
/// composed with a peer-fetch fallback, behind the shared
/// [`store_iface::SubtreeFetcher`] trait that both the processor (C3) and
/// the validator (C6) depend on.
///
/// Both branches report `poll_ready` as immediately ready (there's no
/// shared state to arbitrate access to), so each call just clones the
/// cheap `Arc`-backed service and drives it with `ServiceExt::oneshot`
/// rather than routing through a `tower::buffer::Buffer` worker task.
#[derive(Clone)]
enum Inner {
    BlobOnly(BlobFetchService),
    WithPeerFallback(Fallback<BlobFetchService, PeerFetchService, fn(&StoreError) -> bool>),
}

#[derive(Clone)]
pub struct SubtreeFetchService {
    inner: Inner,
}

impl SubtreeFetchService {
    pub fn new(blob_store: Arc<dyn BlobStore>, peer_resolver: Option<Arc<dyn PeerSubtreeResolver>>, config: &Config) -> Self {
        let blob_service = BlobFetchService {
            blob_store,
            initial_backoff: Duration::from_millis(config.fetch_initial_backoff_millis),
            max_backoff: Duration::from_millis(config.fetch_max_backoff_millis),
            max_attempts: config.fetch_max_attempts,
        };

        let inner = match peer_resolver {
            Some(resolver) => {
                let peer_service = PeerFetchService { resolver };
                Inner::WithPeerFallback(Fallback::new(blob_service, peer_service, is_not_found as fn(&StoreError) -> bool))
            }
            None => Inner::BlobOnly(blob_service),
        };

        SubtreeFetchService { inner }
    }

    async fn dispatch(&self, request: FetchRequest) -> Result<FetchResponse, StoreError> {
        match self.inner.clone() {
            Inner::BlobOnly(mut service) => service.ready().await?.call(request).await,
            Inner::WithPeerFallback(mut service) => service.ready().await?.call(request).await,
        }
    }
}

#[async_trait]
impl SubtreeFetcher for SubtreeFetchService {
    async fn fetch(&self, hash: Hash, leaf_capacity: u64) -> Result<Subtree, StoreError> {
        let request = FetchRequest { hash, kind: FetchKind::Subtree { leaf_capacity } };
        match self.dispatch(request).await? {
            FetchResponse::Subtree(subtree) => Ok(subtree),
            FetchResponse::Meta(_) => unreachable!("subtree request can only yield FetchResponse::Subtree"),
        }
    }

    async fn fetch_meta(&self, hash: Hash) -> Result<Option<SubtreeMeta>, StoreError> {
        let request = FetchRequest { hash, kind: FetchKind::Meta };
        match self.dispatch(request).await {
            Ok(FetchResponse::Meta(meta)) => Ok(meta),
            Ok(FetchResponse::Subtree(_)) => unreachable!("meta request can only yield FetchResponse::Meta"),
            Err(error) if error.kind == ErrorKind::TxNotFound => Ok(None),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use store_iface::testing::MemoryBlobStore;
    use subtree_primitives::SubtreeNode;

    use super::*;

    fn test_config() -> Config {
        Config {
            fetch_initial_backoff_millis: 1,
            fetch_max_backoff_millis: 2,
            fetch_max_attempts: 3,
            ..Config::default()
        }
    }

    async fn stored_subtree(store: &MemoryBlobStore, leaf_capacity: u64) -> (Hash, Subtree) {
        let mut subtree = Subtree::new(leaf_capacity).unwrap();
        subtree.add_node(SubtreeNode::new(Hash([9u8; 32]), 1, 2)).unwrap();
        let hash = subtree.root_hash();
        let mut bytes = Vec::new();
        subtree.serialize(&mut bytes).unwrap();
        store.put(hash, Extension::Subtree, bytes.into(), None).await.unwrap();
        (hash, subtree)
    }

    #[tokio::test]
    async fn fetches_and_decodes_a_stored_subtree() {
        let store = Arc::new(MemoryBlobStore::new());
        let (hash, original) = stored_subtree(&store, 4).await;

        let fetcher = SubtreeFetchService::new(store, None, &test_config());
        let fetched = fetcher.fetch(hash, 4).await.unwrap();
        assert_eq!(fetched.root_hash(), original.root_hash());
    }

    #[tokio::test]
    async fn not_found_without_fallback_surfaces_as_not_found() {
        let store = Arc::new(MemoryBlobStore::new());
        let fetcher = SubtreeFetchService::new(store, None, &test_config());
        let error = fetcher.fetch(Hash([1u8; 32]), 4).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::TxNotFound);
    }

    struct CountingResolver {
        calls: AtomicUsize,
        subtree: Subtree,
    }

    #[async_trait]
    impl PeerSubtreeResolver for CountingResolver {
        async fn fetch_subtree(&self, _hash: Hash, _leaf_capacity: u64) -> Result<Subtree, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.subtree.clone())
        }
    }

    #[tokio::test]
    async fn falls_back_to_peer_resolver_on_not_found() {
        let store = Arc::new(MemoryBlobStore::new());
        let mut subtree = Subtree::new(4).unwrap();
        subtree.add_node(SubtreeNode::new(Hash([3u8; 32]), 1, 1)).unwrap();

        let resolver = Arc::new(CountingResolver { calls: AtomicUsize::new(0), subtree: subtree.clone() });
        let fetcher = SubtreeFetchService::new(store, Some(resolver.clone()), &test_config());

        let fetched = fetcher.fetch(Hash([5u8; 32]), 4).await.unwrap();
        assert_eq!(fetched.root_hash(), subtree.root_hash());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn absent_meta_is_not_an_error() {
        let store = Arc::new(MemoryBlobStore::new());
        let fetcher = SubtreeFetchService::new(store, None, &test_config());
        let meta = fetcher.fetch_meta(Hash([1u8; 32])).await.unwrap();
        assert!(meta.is_none());
    }
}
