//! In-memory test doubles for the three external interfaces of §6.
//!
//! Gated behind `test-support`, so this scaffolding stays out of default
//! builds. Two kinds of callers enable it: every other crate's test
//! suite, and `subtree-node`'s standalone run mode, which has no real
//! blob/meta-store endpoint to point at and falls back to these doubles.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use subtree_primitives::{Hash, Subtree, SubtreeMeta, TxMeta};
use tokio::sync::{broadcast, Mutex};

use crate::{
    blob_store::{BlobReader, BlobStore, Extension},
    error::{ErrorKind, StoreError},
    fetcher::SubtreeFetcher,
    gossip::{BlockAnnouncement, Gossip, RejectedTx, SubtreeAnnouncement, TxMetaUpdate},
    meta_store::MetaStore,
};

/// An in-memory [`BlobStore`] backed by a plain `HashMap`.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<(Hash, &'static str), Bytes>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets a test fail a single `get`/`exists` for `key`/`ext`, simulating
    /// the "not found, fall back to peer fetch" path of C5.
    pub async fn remove(&self, key: Hash, ext: Extension) {
        self.blobs.lock().await.remove(&(key, ext.as_str()));
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: Hash, ext: Extension) -> Result<Bytes, StoreError> {
        self.blobs
            .lock()
            .await
            .get(&(key, ext.as_str()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("no {} blob for {key}", ext.as_str())))
    }

    async fn get_reader(&self, key: Hash, ext: Extension) -> Result<BlobReader, StoreError> {
        let bytes = self.get(key, ext).await?;
        Ok(Box::new(std::io::Cursor::new(bytes.to_vec())) as BlobReader)
    }

    async fn put(
        &self,
        key: Hash,
        ext: Extension,
        bytes: Bytes,
        _ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.blobs.lock().await.insert((key, ext.as_str()), bytes);
        Ok(())
    }

    async fn put_from_reader(
        &self,
        key: Hash,
        ext: Extension,
        mut reader: BlobReader,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| StoreError::storage(e.to_string()))?;
        self.put(key, ext, Bytes::from(buf), ttl).await
    }

    async fn exists(&self, key: Hash, ext: Extension) -> Result<bool, StoreError> {
        Ok(self.blobs.lock().await.contains_key(&(key, ext.as_str())))
    }

    async fn delete(&self, key: Hash, ext: Extension) -> Result<(), StoreError> {
        self.blobs.lock().await.remove(&(key, ext.as_str()));
        Ok(())
    }
}

/// An in-memory [`MetaStore`], optionally configured to fail the first `N`
/// calls to `set_mined_multi` (used by the §8 scenario 7 retry test).
pub struct MemoryMetaStore {
    records: Arc<Mutex<HashMap<Hash, TxMeta>>>,
    fail_next_mined_calls: Arc<Mutex<usize>>,
}

impl Default for MemoryMetaStore {
    fn default() -> Self {
        MemoryMetaStore {
            records: Arc::new(Mutex::new(HashMap::new())),
            fail_next_mined_calls: Arc::new(Mutex::new(0)),
        }
    }
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, hash: Hash, meta: TxMeta) {
        self.records.lock().await.insert(hash, meta);
    }

    /// The next `count` calls to `set_mined_multi` will return a storage
    /// error instead of succeeding.
    pub async fn fail_next_mined_calls(&self, count: usize) {
        *self.fail_next_mined_calls.lock().await = count;
    }
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn get_meta(&self, hash: Hash) -> Result<TxMeta, StoreError> {
        self.records
            .lock()
            .await
            .get(&hash)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("no meta for {hash}")))
    }

    async fn batch_decorate(
        &self,
        missing: &[Hash],
        _fields: &[&str],
    ) -> Result<Vec<(Hash, TxMeta)>, StoreError> {
        let records = self.records.lock().await;
        Ok(missing.iter().filter_map(|h| records.get(h).cloned().map(|m| (*h, m))).collect())
    }

    async fn set_mined_multi(&self, hashes: &[Hash], block_id: u32) -> Result<(), StoreError> {
        let mut remaining = self.fail_next_mined_calls.lock().await;
        if *remaining > 0 {
            *remaining -= 1;
            return Err(StoreError::storage("simulated transient failure"));
        }
        drop(remaining);

        let mut records = self.records.lock().await;
        for hash in hashes {
            if let Some(meta) = records.get_mut(hash) {
                meta.block_ids.push(block_id);
            }
        }
        Ok(())
    }

    async fn delete(&self, hash: Hash) -> Result<(), StoreError> {
        self.records.lock().await.remove(&hash);
        Ok(())
    }

    async fn store(&self, hash: Hash, meta: TxMeta, _spendable_height: u32) -> Result<(), StoreError> {
        self.records.lock().await.insert(hash, meta);
        Ok(())
    }
}

/// An in-memory [`Gossip`] that records published messages for assertions
/// and fans `TxMeta` updates out to any number of `subscribe_tx_meta`
/// receivers over a `tokio::sync::broadcast` channel.
pub struct MemoryGossip {
    pub subtrees: Arc<Mutex<Vec<SubtreeAnnouncement>>>,
    pub blocks: Arc<Mutex<Vec<BlockAnnouncement>>>,
    pub tx_meta: Arc<Mutex<Vec<TxMetaUpdate>>>,
    pub rejected: Arc<Mutex<Vec<RejectedTx>>>,
    tx_meta_tx: broadcast::Sender<TxMetaUpdate>,
}

impl Default for MemoryGossip {
    fn default() -> Self {
        let (tx_meta_tx, _) = broadcast::channel(256);
        MemoryGossip {
            subtrees: Arc::new(Mutex::new(Vec::new())),
            blocks: Arc::new(Mutex::new(Vec::new())),
            tx_meta: Arc::new(Mutex::new(Vec::new())),
            rejected: Arc::new(Mutex::new(Vec::new())),
            tx_meta_tx,
        }
    }
}

impl MemoryGossip {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Gossip for MemoryGossip {
    async fn publish_subtree(&self, announcement: SubtreeAnnouncement) -> Result<(), StoreError> {
        self.subtrees.lock().await.push(announcement);
        Ok(())
    }

    async fn publish_block(&self, announcement: BlockAnnouncement) -> Result<(), StoreError> {
        self.blocks.lock().await.push(announcement);
        Ok(())
    }

    async fn publish_tx_meta(&self, update: TxMetaUpdate) -> Result<(), StoreError> {
        self.tx_meta.lock().await.push(update.clone());
        // No receivers is not an error: nobody is listening yet.
        let _ = self.tx_meta_tx.send(update);
        Ok(())
    }

    async fn publish_rejected_tx(&self, rejected: RejectedTx) -> Result<(), StoreError> {
        self.rejected.lock().await.push(rejected);
        Ok(())
    }

    fn subscribe_tx_meta(&self) -> broadcast::Receiver<TxMetaUpdate> {
        self.tx_meta_tx.subscribe()
    }
}

/// A [`SubtreeFetcher`] that always reports "not found". Useful for tests
/// whose codepath never expects a live fetch (e.g. a `move_up` where the
/// block turns out to reference only our own already-known subtrees).
pub struct NullSubtreeFetcher;

#[async_trait]
impl SubtreeFetcher for NullSubtreeFetcher {
    async fn fetch(&self, hash: Hash, _leaf_capacity: u64) -> Result<Subtree, StoreError> {
        Err(StoreError::not_found(format!("no subtree {hash}")))
    }

    async fn fetch_meta(&self, _hash: Hash) -> Result<Option<SubtreeMeta>, StoreError> {
        Ok(None)
    }
}
