//! Test harness for integration tests.
//!
//! Provides a [`TestChain`] wrapping a [`ChainManager`] with a simulated
//! clock, and a [`TestStore`] whose block store lives in a temporary
//! directory.

use crate::generators::{self, BlockSpec, BLOCK_SPACING, GENESIS_TIME};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tessera_chain::{
    BlockOutcome, ChainConfig, ChainManager, ChainResult, Clock, ManualClock,
};
use tessera_consensus::{Block, Transaction};
use tessera_mempool::Admission;
use tessera_storage::{BlockStore, MemoryStorage};

/// File-backed store in a temporary directory that is removed on drop.
pub struct TestStore {
    storage: MemoryStorage,
    temp_dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage =
            MemoryStorage::open(temp_dir.path().join("store.json")).expect("Failed to open store");
        Self {
            storage,
            temp_dir,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().join("store.json")
    }

    /// Shared handle to the in-memory contents.
    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    pub fn block_store(&self) -> BlockStore {
        BlockStore::new(Arc::new(self.storage.clone()))
    }

    /// Flush to disk and reload, as after a restart.
    pub fn reopen(&mut self) {
        self.storage.flush().expect("Failed to flush store");
        self.storage = MemoryStorage::open(self.path()).expect("Failed to reopen store");
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain manager driven by a manual clock.
pub struct TestChain {
    pub manager: ChainManager,
    pub clock: Arc<ManualClock>,
    genesis: Block,
}

impl TestChain {
    /// In-memory regtest chain whose genesis pays seed 1.
    pub fn new() -> Self {
        Self::with_config(ChainConfig::default())
    }

    pub fn with_config(config: ChainConfig) -> Self {
        let genesis = generators::genesis(1);
        let manager = ChainManager::new(
            config,
            generators::block_validator(),
            generators::mempool(),
            genesis.clone(),
        )
        .expect("Genesis must be valid");
        Self::wrap(manager, genesis)
    }

    /// Regtest chain persisted to `store`, replaying whatever it holds.
    ///
    /// Replay runs a year after genesis so no stored block is in the future.
    pub fn durable(store: &TestStore, config: ChainConfig) -> ChainResult<Self> {
        let genesis = generators::genesis(1);
        let manager = ChainManager::recover(
            config,
            generators::block_validator(),
            generators::mempool(),
            genesis.clone(),
            store.block_store(),
            GENESIS_TIME + 365 * 24 * 3600,
        )?;
        Ok(Self::wrap(manager, genesis))
    }

    fn wrap(manager: ChainManager, genesis: Block) -> Self {
        let clock = Arc::new(ManualClock::new(GENESIS_TIME));
        let mut chain = Self {
            manager,
            clock,
            genesis,
        };
        chain.sync_clock();
        chain
    }

    pub fn genesis(&self) -> &Block {
        &self.genesis
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(secs);
    }

    /// Keep the clock at or after the tip so its blocks are never "future".
    fn sync_clock(&mut self) {
        let tip_time = self.manager.tip().timestamp;
        if self.clock.now() < tip_time {
            self.clock.set(tip_time);
        }
    }

    pub fn tip_block(&self) -> Block {
        self.manager
            .block(&self.manager.tip_hash())
            .map(|b| b.as_ref().clone())
            .expect("Tip is always indexed")
    }

    pub fn receive(&mut self, block: Block) -> ChainResult<BlockOutcome> {
        let outcome = self.manager.receive_block(block, self.clock.now());
        self.sync_clock();
        outcome
    }

    pub fn submit(&mut self, tx: Transaction) -> ChainResult<Admission> {
        self.manager.submit_transaction(tx, self.clock.now())
    }

    /// Mine `txs` on the tip, advancing the clock one block spacing.
    pub fn mine(&mut self, txs: Vec<Transaction>) -> ChainResult<BlockOutcome> {
        let block = BlockSpec::on(&self.tip_block().header).txs(txs).build();
        self.advance(BLOCK_SPACING);
        self.receive(block)
    }

    /// Mine a candidate assembled from the mempool.
    pub fn mine_pool(&mut self) -> ChainResult<BlockOutcome> {
        self.advance(BLOCK_SPACING);
        let timestamp = self.manager.tip().timestamp + BLOCK_SPACING;
        let block = self
            .manager
            .build_candidate(generators::address(9), timestamp, None)?;
        self.receive(block)
    }

    /// Mine `count` empty blocks.
    pub fn mine_empty(&mut self, count: usize) {
        for _ in 0..count {
            self.mine(Vec::new()).expect("Empty block must connect");
        }
    }
}

impl Default for TestChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestChain {
    type Target = ChainManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl std::ops::DerefMut for TestChain {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_consensus::COIN;

    #[test]
    fn test_chain_mines_blocks() {
        let mut chain = TestChain::new();
        chain.mine_empty(3);
        assert_eq!(chain.height(), 3);
        assert_eq!(chain.balance(&generators::address(9)), 3 * 12 * COIN);
        assert!(chain.now() >= chain.tip().timestamp);
    }

    #[test]
    fn test_store_survives_reopen() {
        let mut store = TestStore::new();
        let mut chain = TestChain::durable(&store, ChainConfig::default()).unwrap();
        chain.mine_empty(2);
        let tip = chain.tip();
        drop(chain);

        store.reopen();
        let chain = TestChain::durable(&store, ChainConfig::default()).unwrap();
        assert_eq!(chain.tip(), tip);
    }
}
