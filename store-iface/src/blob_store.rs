//! The opaque content-addressed blob store (§6).
//!
//! The store itself — file-backed, in-memory, remote-object-store, or a
//! batching/TTL decorator over any of those — is an external collaborator
//! (§1): this module only specifies the capability set every backend must
//! expose, decoupling this thin services crate from any concrete store
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use subtree_primitives::Hash;
use tokio::io::AsyncRead;

use crate::error::StoreError;

/// The file extension a blob is stored under, which doubles as its
/// "kind" for routing/metrics purposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Extension {
    Block,
    Subtree,
    Meta,
    Utxoset,
    Utxodiff,
}

impl Extension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Extension::Block => "block",
            Extension::Subtree => "subtree",
            Extension::Meta => "meta",
            Extension::Utxoset => "utxoset",
            Extension::Utxodiff => "utxodiff",
        }
    }
}

/// A streamable reader over a blob's bytes.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// The capability set consumed from the blob store (§6).
///
/// The store guarantees atomic put and read-your-write within a single
/// key; cross-key ordering is not guaranteed, so callers must not infer
/// anything from the relative order two different keys became visible.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: Hash, ext: Extension) -> Result<Bytes, StoreError>;

    async fn get_reader(&self, key: Hash, ext: Extension) -> Result<BlobReader, StoreError>;

    async fn put(
        &self,
        key: Hash,
        ext: Extension,
        bytes: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    async fn put_from_reader(
        &self,
        key: Hash,
        ext: Extension,
        reader: BlobReader,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    async fn exists(&self, key: Hash, ext: Extension) -> Result<bool, StoreError>;

    async fn delete(&self, key: Hash, ext: Extension) -> Result<(), StoreError>;
}
