//! C9: a sharded, bounded LRU cache of encoded `TxMeta`, read through to the
//! external meta store on a miss and refreshed by a `TxMeta` gossip
//! listener.
//!
//! Values live in a per-shard arena of fixed 4 KiB chunks rather than one
//! `Box` per entry, so the shard's memory footprint is bounded by
//! `capacity * 4 KiB` regardless of how many times entries turn over — the
//! same "shard-level lock, bounded footprint" tradeoff
//! `block-validator::sharded_map::ShardedTxMap` makes for positions, applied
//! here to cached bytes instead of a plain `usize`.

use std::{
    io::{Read, Write},
    sync::{Arc, Mutex},
};

use lru::LruCache;
use store_iface::{Gossip, MetaStore, StoreError};
use subtree_primitives::{
    serialization::{read_compact_size, write_compact_size, SerializationError},
    Hash, TxMeta,
};

/// The fixed chunk size the arena hands out; also the maximum encoded size
/// of a cacheable `TxMeta` (§C9 "max 4 KiB value").
const CHUNK_SIZE: usize = 4096;

/// A pool of fixed-size byte chunks, reused via a free-list as entries are
/// evicted from the LRU it backs.
struct ChunkArena {
    chunks: Vec<Box<[u8; CHUNK_SIZE]>>,
    free: Vec<usize>,
}

impl ChunkArena {
    fn new() -> Self {
        ChunkArena { chunks: Vec::new(), free: Vec::new() }
    }

    /// Stores `bytes` in a free (or freshly allocated) chunk. Returns
    /// `None` without allocating if `bytes` doesn't fit in one chunk.
    fn store(&mut self, bytes: &[u8]) -> Option<usize> {
        if bytes.len() > CHUNK_SIZE {
            return None;
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.chunks.push(Box::new([0u8; CHUNK_SIZE]));
                self.chunks.len() - 1
            }
        };
        self.chunks[index][..bytes.len()].copy_from_slice(bytes);
        Some(index)
    }

    fn read(&self, index: usize, len: u16) -> &[u8] {
        &self.chunks[index][..len as usize]
    }

    fn release(&mut self, index: usize) {
        self.free.push(index);
    }
}

#[derive(Clone, Copy)]
struct Slot {
    chunk: usize,
    len: u16,
}

struct Shard {
    arena: ChunkArena,
    entries: LruCache<Hash, Slot>,
}

/// The sharded bounded LRU itself, with no knowledge of the meta store or
/// gossip — just encode/decode plus eviction bookkeeping (§C9).
pub struct ShardedTxMetaCache {
    shards: Vec<Mutex<Shard>>,
}

impl ShardedTxMetaCache {
    pub fn new(shard_count: usize, capacity_per_shard: usize) -> Self {
        let shard_count = shard_count.max(1);
        let capacity = std::num::NonZeroUsize::new(capacity_per_shard.max(1))
            .expect("capacity_per_shard.max(1) is never zero");
        ShardedTxMetaCache {
            shards: (0..shard_count)
                .map(|_| Mutex::new(Shard { arena: ChunkArena::new(), entries: LruCache::new(capacity) }))
                .collect(),
        }
    }

    fn shard_for(&self, hash: &Hash) -> &Mutex<Shard> {
        let index = hash.as_bytes()[0] as usize % self.shards.len();
        &self.shards[index]
    }

    pub fn get(&self, hash: &Hash) -> Option<TxMeta> {
        let mut shard = self.shard_for(hash).lock().expect("tx-meta cache shard mutex poisoned");
        let slot = *shard.entries.get(hash)?;
        let bytes = shard.arena.read(slot.chunk, slot.len).to_vec();
        decode_tx_meta(&bytes[..]).ok()
    }

    /// Encodes and inserts `meta` for `hash`, evicting the shard's least
    /// recently used entry first if the shard is already at capacity.
    /// Metadata that doesn't fit in one 4 KiB chunk is silently skipped
    /// rather than cached truncated.
    pub fn insert(&self, hash: Hash, meta: &TxMeta) {
        let mut bytes = Vec::new();
        if encode_tx_meta(meta, &mut bytes).is_err() {
            return;
        }

        let mut shard = self.shard_for(&hash).lock().expect("tx-meta cache shard mutex poisoned");
        if !shard.entries.contains(&hash) && shard.entries.len() == shard.entries.cap().get() {
            if let Some((_, evicted)) = shard.entries.pop_lru() {
                shard.arena.release(evicted.chunk);
            }
        }

        let Some(chunk) = shard.arena.store(&bytes) else { return };
        let slot = Slot { chunk, len: bytes.len() as u16 };
        if let Some(previous) = shard.entries.put(hash, slot) {
            shard.arena.release(previous.chunk);
        }
    }

    pub fn invalidate(&self, hash: &Hash) {
        let mut shard = self.shard_for(hash).lock().expect("tx-meta cache shard mutex poisoned");
        if let Some(slot) = shard.entries.pop(hash) {
            shard.arena.release(slot.chunk);
        }
    }
}

fn encode_tx_meta<W: Write>(meta: &TxMeta, mut writer: W) -> Result<(), SerializationError> {
    writer.write_all(&meta.fee.to_le_bytes())?;
    writer.write_all(&meta.size.to_le_bytes())?;
    write_compact_size(&mut writer, meta.parent_tx_hashes.len() as u64)?;
    for parent in &meta.parent_tx_hashes {
        parent.write(&mut writer)?;
    }
    writer.write_all(&meta.lock_time.to_le_bytes())?;
    writer.write_all(&[meta.is_coinbase as u8])?;
    write_compact_size(&mut writer, meta.block_ids.len() as u64)?;
    for block_id in &meta.block_ids {
        writer.write_all(&block_id.to_le_bytes())?;
    }
    Ok(())
}

fn decode_tx_meta<R: Read>(mut reader: R) -> Result<TxMeta, SerializationError> {
    let fee = read_u64(&mut reader)?;
    let size = read_u64(&mut reader)?;

    let parent_count = read_compact_size(&mut reader)?;
    let mut parent_tx_hashes = Vec::with_capacity(parent_count as usize);
    for _ in 0..parent_count {
        parent_tx_hashes.push(Hash::read(&mut reader)?);
    }

    let lock_time = read_u32(&mut reader)?;

    let mut coinbase_byte = [0u8; 1];
    reader.read_exact(&mut coinbase_byte).map_err(SerializationError::Io)?;
    let is_coinbase = coinbase_byte[0] != 0;

    let mut meta = TxMeta::new(fee, size, parent_tx_hashes, lock_time, is_coinbase);

    let block_count = read_compact_size(&mut reader)?;
    let mut block_ids = Vec::with_capacity(block_count as usize);
    for _ in 0..block_count {
        block_ids.push(read_u32(&mut reader)?);
    }
    meta.block_ids = block_ids;

    Ok(meta)
}

fn read_u64<R: Read>(mut reader: R) -> Result<u64, SerializationError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).map_err(SerializationError::Io)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_u32<R: Read>(mut reader: R) -> Result<u32, SerializationError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(SerializationError::Io)?;
    Ok(u32::from_le_bytes(buf))
}

/// A read-through wrapper over [`ShardedTxMetaCache`] and the external meta
/// store, refreshed as updates arrive on the `TxMeta` gossip topic (§C9).
pub struct TxMetaCache {
    cache: ShardedTxMetaCache,
    meta_store: Arc<dyn MetaStore>,
}

impl TxMetaCache {
    pub fn new(meta_store: Arc<dyn MetaStore>, shard_count: usize, capacity_per_shard: usize) -> Arc<Self> {
        Arc::new(TxMetaCache { cache: ShardedTxMetaCache::new(shard_count, capacity_per_shard), meta_store })
    }

    /// Returns `hash`'s metadata, serving the cache on a hit and falling
    /// through to (then populating from) the external meta store on a miss.
    pub async fn get(&self, hash: Hash) -> Result<TxMeta, StoreError> {
        if let Some(meta) = self.cache.get(&hash) {
            return Ok(meta);
        }
        let meta = self.meta_store.get_meta(hash).await?;
        self.cache.insert(hash, &meta);
        Ok(meta)
    }

    /// Drops `hash` from the cache, forcing the next `get` to re-fetch it.
    pub fn invalidate(&self, hash: &Hash) {
        self.cache.invalidate(hash);
    }

    /// Spawns a task that drains `gossip`'s `TxMeta` topic for as long as
    /// `self` has at least one other owner, keeping the cache current with
    /// updates learned elsewhere on the network (§C9).
    pub fn spawn_gossip_listener(self: &Arc<Self>, gossip: Arc<dyn Gossip>) {
        let cache = self.clone();
        let mut updates = gossip.subscribe_tx_meta();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => cache.cache.insert(update.hash, &update.meta),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "tx-meta gossip listener lagged; cache may be stale");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        tracing::info!("tx-meta gossip channel closed, listener exiting");
                        return;
                    }
                }
            }
        });
    }
}
