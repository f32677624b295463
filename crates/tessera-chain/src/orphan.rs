//! Buffer for blocks whose parent is unknown.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tessera_consensus::{Block, BlockHash};
use tracing::debug;

#[derive(Debug)]
struct OrphanBlock {
    block: Arc<Block>,
    received_at: u64,
}

/// Bounded, TTL'd orphan block set. The least recently received block is
/// dropped when full.
#[derive(Debug)]
pub struct OrphanBlocks {
    cache: LruCache<BlockHash, OrphanBlock>,
    by_parent: HashMap<BlockHash, HashSet<BlockHash>>,
    ttl_secs: u64,
}

impl OrphanBlocks {
    pub fn new(max_blocks: usize, ttl_secs: u64) -> Self {
        let capacity = NonZeroUsize::new(max_blocks).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            by_parent: HashMap::new(),
            ttl_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.cache.contains(hash)
    }

    pub fn insert(&mut self, block: Arc<Block>, now: u64) {
        let hash = block.hash();
        let parent = block.header.previous_hash;
        let evicted = self.cache.push(
            hash,
            OrphanBlock {
                block,
                received_at: now,
            },
        );
        if let Some((old, entry)) = evicted {
            if old != hash {
                debug!(hash = %old, "Orphan block set full, dropped oldest");
                self.unlink(&old, &entry.block.header.previous_hash);
            }
        }
        self.by_parent.entry(parent).or_default().insert(hash);
    }

    /// Remove and return the buffered children of `parent`.
    pub fn take_children(&mut self, parent: &BlockHash) -> Vec<Arc<Block>> {
        let Some(children) = self.by_parent.remove(parent) else {
            return Vec::new();
        };
        let mut blocks: Vec<Arc<Block>> = children
            .into_iter()
            .filter_map(|hash| self.cache.pop(&hash).map(|o| o.block))
            .collect();
        blocks.sort_by_key(|b| (b.header.timestamp, b.hash()));
        blocks
    }

    /// Drop orphans older than the TTL and return how many were dropped.
    pub fn expire(&mut self, now: u64) -> usize {
        let expired: Vec<(BlockHash, BlockHash)> = self
            .cache
            .iter()
            .filter(|(_, o)| now.saturating_sub(o.received_at) >= self.ttl_secs)
            .map(|(hash, o)| (*hash, o.block.header.previous_hash))
            .collect();
        for (hash, parent) in &expired {
            self.cache.pop(hash);
            self.unlink(hash, parent);
        }
        expired.len()
    }

    fn unlink(&mut self, hash: &BlockHash, parent: &BlockHash) {
        if let Some(siblings) = self.by_parent.get_mut(parent) {
            siblings.remove(hash);
            if siblings.is_empty() {
                self.by_parent.remove(parent);
            }
        }
    }
}
