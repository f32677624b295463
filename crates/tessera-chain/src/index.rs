//! Index of every known block with its cumulative work.

use num_bigint::BigUint;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tessera_consensus::{work_for_bits, Block, BlockHash, BlockHeader};

/// Validation state of an indexed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Header and context-free body checks passed; never connected.
    HeaderValid,
    /// Fully validated against the state at its parent.
    Valid,
    /// Failed validation, or descends from a block that did.
    Invalid,
}

/// Indexed block.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub block: Arc<Block>,
    /// Work of this block and all its ancestors.
    pub cumulative_work: BigUint,
    /// Easiest target this block was allowed to declare.
    pub required_bits: u32,
    pub status: BlockStatus,
}

impl IndexEntry {
    pub fn header(&self) -> &BlockHeader {
        &self.block.header
    }

    pub fn height(&self) -> u32 {
        self.block.header.height
    }
}

/// Block tree keyed by hash.
#[derive(Debug, Default)]
pub struct BlockIndex {
    entries: HashMap<BlockHash, IndexEntry>,
    children: HashMap<BlockHash, Vec<BlockHash>>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&IndexEntry> {
        self.entries.get(hash)
    }

    pub fn status(&self, hash: &BlockHash) -> Option<BlockStatus> {
        self.entries.get(hash).map(|e| e.status)
    }

    pub fn set_status(&mut self, hash: &BlockHash, status: BlockStatus) {
        if let Some(entry) = self.entries.get_mut(hash) {
            entry.status = status;
        }
    }

    /// Index `block` under its parent. The parent must already be indexed
    /// unless `block` is a root.
    pub fn insert(&mut self, block: Arc<Block>, required_bits: u32, status: BlockStatus) -> &IndexEntry {
        let hash = block.hash();
        if self.entries.contains_key(&hash) {
            return &self.entries[&hash];
        }
        let parent = block.header.previous_hash;
        let parent_work = self
            .entries
            .get(&parent)
            .map(|p| p.cumulative_work.clone())
            .unwrap_or_default();
        let cumulative_work = parent_work + work_for_bits(block.header.difficulty_target);

        self.children.entry(parent).or_default().push(hash);
        self.entries.entry(hash).or_insert(IndexEntry {
            block,
            cumulative_work,
            required_bits,
            status,
        })
    }

    /// Ancestor of `hash` at `height`, walking parent links.
    pub fn ancestor(&self, hash: &BlockHash, height: u32) -> Option<&IndexEntry> {
        let mut entry = self.entries.get(hash)?;
        while entry.height() > height {
            entry = self.entries.get(&entry.header().previous_hash)?;
        }
        (entry.height() == height).then_some(entry)
    }

    /// Mark `hash` and every indexed descendant invalid. Returns the marked hashes.
    pub fn invalidate(&mut self, hash: &BlockHash) -> Vec<BlockHash> {
        let marked = self.descendants(hash);
        for id in &marked {
            self.set_status(id, BlockStatus::Invalid);
        }
        marked
    }

    /// Remove `hash` and every indexed descendant. Returns the removed hashes.
    pub fn remove_subtree(&mut self, hash: &BlockHash) -> Vec<BlockHash> {
        let removed = self.descendants(hash);
        for id in &removed {
            if let Some(entry) = self.entries.remove(id) {
                let parent = entry.header().previous_hash;
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.retain(|c| c != id);
                    if siblings.is_empty() {
                        self.children.remove(&parent);
                    }
                }
            }
            self.children.remove(id);
        }
        removed
    }

    /// `hash` followed by its indexed descendants, breadth first.
    fn descendants(&self, hash: &BlockHash) -> Vec<BlockHash> {
        let mut result = Vec::new();
        if !self.entries.contains_key(hash) {
            return result;
        }
        let mut queue = VecDeque::from([*hash]);
        while let Some(id) = queue.pop_front() {
            result.push(id);
            if let Some(children) = self.children.get(&id) {
                queue.extend(children.iter().copied());
            }
        }
        result
    }

    /// Hashes of indexed blocks at or below `height`.
    pub fn hashes_up_to(&self, height: u32) -> Vec<BlockHash> {
        self.entries
            .iter()
            .filter(|(_, e)| e.height() <= height)
            .map(|(hash, _)| *hash)
            .collect()
    }
}
