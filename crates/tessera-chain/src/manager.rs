//! Chain and fork manager.
//!
//! Owns the authoritative ledger: the UTXO set, the mempool, the block
//! index and the active chain. Every mutation goes through a
//! `&mut ChainManager`; the [`crate::ChainActor`] serializes callers onto a
//! single owner.
//!
//! Fork choice is most cumulative work, first seen wins ties. Switching
//! branches reverts the old branch to the fork point with stored undo data,
//! then connects the new branch one block at a time. If any new block fails
//! full validation the switch is rolled back and the failing block and its
//! descendants are marked invalid.

use crate::config::ChainConfig;
use crate::error::{ChainError, ChainResult, Disposition};
use crate::events::{ChainEvent, ReorgEvent};
use crate::index::{BlockIndex, BlockStatus, IndexEntry};
use crate::orphan::OrphanBlocks;
use num_bigint::BigUint;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tessera_consensus::{
    coinbase_reward, coinbase_transaction, Address, Amount, Block, BlockBuilder, BlockHash,
    BlockHeader, BlockValidator, ChainContext, ChainParams, DifficultyAdjustment, SigningKey,
    Transaction, TxId, Utxo,
};
use tessera_mempool::{Admission, Mempool, MempoolSnapshot};
use tessera_state::{ReservationTable, UtxoSet, UtxoSnapshot};
use tessera_storage::{BlockStore, TipRecord};
use tracing::{debug, error, info, instrument, warn};

/// Bytes kept free in a candidate block for the header and coinbase.
const CANDIDATE_RESERVED_BYTES: usize = 1024;

/// Result of handing a block to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Already indexed or buffered.
    AlreadyKnown,
    /// Parent unknown; buffered until it arrives.
    Orphaned,
    /// Connected on top of the previous tip.
    Extended { height: u32 },
    /// Valid header on a branch with no more work than the active chain.
    SideBranch { height: u32 },
    /// Its branch overtook the active chain.
    Reorganized(ReorgEvent),
}

/// Summary of the active tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: BlockHash,
    pub height: u32,
    pub timestamp: u64,
    pub cumulative_work: BigUint,
    pub total_issued: Amount,
}

/// Consistent read-only view of the ledger at one tip.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub tip: ChainTip,
    pub finalized_height: u32,
    pub utxos: UtxoSnapshot,
    pub mempool: MempoolSnapshot,
}

impl LedgerSnapshot {
    /// Confirmed balance of `address`.
    pub fn balance(&self, address: &Address) -> Amount {
        self.utxos
            .utxos_of(address)
            .iter()
            .map(|u| u.amount)
            .sum()
    }

    pub fn utxos_of(&self, address: &Address) -> Vec<Utxo> {
        self.utxos.utxos_of(address)
    }
}

/// Single writer over the ledger state.
pub struct ChainManager {
    config: ChainConfig,
    validator: BlockValidator,
    difficulty: DifficultyAdjustment,
    utxos: UtxoSet,
    mempool: Mempool,
    index: BlockIndex,
    /// Active chain, indexed by height.
    active: Vec<BlockHash>,
    orphans: OrphanBlocks,
    finalized_height: u32,
    store: Option<BlockStore>,
    halted: Option<String>,
    events: Vec<ChainEvent>,
}

impl ChainManager {
    /// In-memory chain starting at `genesis`.
    pub fn new(
        config: ChainConfig,
        validator: BlockValidator,
        mempool: Mempool,
        genesis: Block,
    ) -> ChainResult<Self> {
        let mut utxos = UtxoSet::new();
        validator.validate_genesis(&genesis, &utxos)?;
        let hash = genesis.hash();
        if let Some(expected) = config.checkpoint_at(0) {
            if expected != hash {
                return Err(ChainError::CheckpointMismatch {
                    height: 0,
                    expected,
                    got: hash,
                });
            }
        }
        utxos
            .apply_block(&genesis)
            .map_err(|e| ChainError::LedgerInconsistency(format!("genesis apply failed: {e}")))?;

        let mut index = BlockIndex::new();
        let bits = genesis.header.difficulty_target;
        index.insert(Arc::new(genesis), bits, BlockStatus::Valid);

        let difficulty = DifficultyAdjustment::new(validator.params());
        let orphans = OrphanBlocks::new(config.max_orphan_blocks, config.orphan_block_ttl_secs);
        info!(%hash, network = %validator.params().network, "Chain initialised at genesis");

        Ok(Self {
            config,
            validator,
            difficulty,
            utxos,
            mempool,
            index,
            active: vec![hash],
            orphans,
            finalized_height: 0,
            store: None,
            halted: None,
            events: Vec::new(),
        })
    }

    /// Chain backed by `store`, replaying any persisted main chain.
    ///
    /// An empty store is initialised with `genesis`. Replayed state must
    /// reproduce the persisted tip hash, UTXO digest and issuance exactly.
    pub fn recover(
        config: ChainConfig,
        validator: BlockValidator,
        mempool: Mempool,
        genesis: Block,
        store: BlockStore,
        now: u64,
    ) -> ChainResult<Self> {
        let mut manager = Self::new(config, validator, mempool, genesis)?;

        let Some(record) = store.tip()? else {
            manager.store = Some(store);
            let genesis = manager.tip_block()?;
            manager.persist(&[genesis], None)?;
            info!("Initialised empty store with genesis");
            return Ok(manager);
        };

        let blocks = store.main_chain()?;
        let genesis_hash = manager.tip_hash();
        match blocks.first() {
            Some(first) if first.hash() == genesis_hash => {}
            _ => {
                return Err(ChainError::LedgerInconsistency(
                    "stored chain does not start at the configured genesis".into(),
                ))
            }
        }

        for block in blocks.into_iter().skip(1) {
            let height = block.height();
            match manager.receive_block(block, now) {
                Ok(BlockOutcome::Extended { .. }) => {}
                Ok(other) => {
                    return Err(ChainError::LedgerInconsistency(format!(
                        "stored block at height {height} did not extend the chain: {other:?}"
                    )))
                }
                Err(err) => {
                    return Err(ChainError::LedgerInconsistency(format!(
                        "stored block at height {height} failed replay: {err}"
                    )))
                }
            }
        }

        let tip = manager.tip();
        if tip.hash != record.hash
            || tip.height != record.height
            || tip.total_issued != record.total_issued
            || manager.utxos.snapshot_digest() != record.utxo_digest
        {
            return Err(ChainError::LedgerInconsistency(format!(
                "replayed tip {} at height {} does not match stored tip {} at height {}",
                tip.hash, tip.height, record.hash, record.height
            )));
        }

        manager.store = Some(store);
        manager.events.clear();
        info!(height = tip.height, hash = %tip.hash, "Recovered chain from storage");
        Ok(manager)
    }

    pub fn params(&self) -> &ChainParams {
        self.validator.params()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn height(&self) -> u32 {
        (self.active.len() - 1) as u32
    }

    pub fn tip_hash(&self) -> BlockHash {
        self.active[self.active.len() - 1]
    }

    pub fn tip(&self) -> ChainTip {
        let hash = self.tip_hash();
        let (timestamp, cumulative_work) = self
            .index
            .get(&hash)
            .map(|e| (e.header().timestamp, e.cumulative_work.clone()))
            .unwrap_or_default();
        ChainTip {
            hash,
            height: self.height(),
            timestamp,
            cumulative_work,
            total_issued: self.utxos.total_issued(),
        }
    }

    pub fn finalized_height(&self) -> u32 {
        self.finalized_height
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn block(&self, hash: &BlockHash) -> Option<Arc<Block>> {
        self.index.get(hash).map(|e| Arc::clone(&e.block))
    }

    /// Active-chain block at `height`.
    pub fn block_at(&self, height: u32) -> Option<Arc<Block>> {
        self.active
            .get(height as usize)
            .and_then(|hash| self.block(hash))
    }

    pub fn block_status(&self, hash: &BlockHash) -> Option<BlockStatus> {
        self.index.status(hash)
    }

    pub fn orphan_block_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.utxos.balance(address)
    }

    pub fn utxos_of(&self, address: &Address) -> Vec<Utxo> {
        self.utxos.utxos_of(address)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            tip: self.tip(),
            finalized_height: self.finalized_height,
            utxos: self.utxos.snapshot(),
            mempool: self.mempool.snapshot(),
        }
    }

    /// Drain events published since the last call.
    pub fn take_events(&mut self) -> Vec<ChainEvent> {
        std::mem::take(&mut self.events)
    }

    /// Validate `block` and attach it to the block tree, switching branches
    /// when it carries more work than the active chain. Buffered orphans
    /// that descend from it are processed afterwards.
    #[instrument(skip_all, fields(height = block.height(), hash = %block.hash()))]
    pub fn receive_block(&mut self, block: Block, now: u64) -> ChainResult<BlockOutcome> {
        self.ensure_running()?;
        let block = Arc::new(block);
        let hash = block.hash();
        let result = self.process_block(block, now);
        let outcome = self.guard(result)?;
        if !matches!(outcome, BlockOutcome::AlreadyKnown | BlockOutcome::Orphaned) {
            self.connect_orphans(hash, now);
        }
        Ok(outcome)
    }

    /// Submit a transaction to the mempool.
    #[instrument(skip_all, fields(txid = %tx.txid))]
    pub fn submit_transaction(&mut self, tx: Transaction, now: u64) -> ChainResult<Admission> {
        self.ensure_running()?;
        Ok(self.mempool.submit(tx, &mut self.utxos, now)?)
    }

    /// Sweep expired reservations, pending transactions and orphan blocks.
    pub fn evict_expired(&mut self, now: u64) -> ChainResult<Vec<TxId>> {
        self.ensure_running()?;
        let evicted = self.mempool.evict_expired(&mut self.utxos, now);
        let orphans = self.orphans.expire(now);
        if orphans > 0 {
            debug!(orphans, "Expired orphan blocks");
        }
        Ok(evicted)
    }

    /// Raise the finalized height. Undo data at or below it is discarded
    /// and no reorganization may cross it afterwards.
    pub fn set_finalized_height(&mut self, height: u32) -> ChainResult<()> {
        self.ensure_running()?;
        let tip = self.height();
        if height < self.finalized_height || height > tip {
            return Err(ChainError::InvalidFinality {
                requested: height,
                finalized: self.finalized_height,
                tip,
            });
        }
        self.finalize(height);
        Ok(())
    }

    /// Mine a block on the tip from the best pending transactions.
    ///
    /// Solves proof of work on the CPU, so only practical at easy targets.
    pub fn build_candidate(
        &self,
        reward_address: Address,
        timestamp: u64,
        miner: Option<SigningKey>,
    ) -> ChainResult<Block> {
        let (parent, ctx) = self.chain_context(&self.tip_hash(), timestamp)?;
        let height = parent.height + 1;
        let params = self.params();

        let budget = params.max_block_bytes.saturating_sub(CANDIDATE_RESERVED_BYTES);
        let mut txs = self.mempool.select_for_block(budget);
        txs.truncate(params.max_block_txs.saturating_sub(1));
        let fees = txs.iter().fold(0u64, |acc, tx| acc.saturating_add(tx.fee));

        let reward = coinbase_reward(params, height);
        let coinbase =
            coinbase_transaction(height, reward_address, reward.saturating_add(fees), timestamp);
        let mut builder = BlockBuilder::on_top_of(&parent)
            .timestamp(timestamp)
            .bits(ctx.required_bits)
            .transaction(coinbase)
            .transactions(txs);
        if let Some(key) = miner {
            builder = builder.miner(key);
        }
        let block = builder.build();
        debug!(height, txs = block.transactions.len(), fees, "Built candidate block");
        Ok(block)
    }

    fn process_block(&mut self, block: Arc<Block>, now: u64) -> ChainResult<BlockOutcome> {
        let hash = block.hash();
        match self.index.status(&hash) {
            Some(BlockStatus::Invalid) => return Err(ChainError::KnownInvalid(hash)),
            Some(_) => return Ok(BlockOutcome::AlreadyKnown),
            None if self.orphans.contains(&hash) => return Ok(BlockOutcome::AlreadyKnown),
            None => {}
        }

        self.validator.validate_context_free(&block)?;

        let parent_hash = block.header.previous_hash;
        match self.index.status(&parent_hash) {
            None => {
                debug!(parent = %parent_hash, "Parent unknown, buffering orphan block");
                self.orphans.insert(block, now);
                return Ok(BlockOutcome::Orphaned);
            }
            Some(BlockStatus::Invalid) => {
                let bits = block.header.difficulty_target;
                self.index.insert(block, bits, BlockStatus::Invalid);
                return Err(ChainError::KnownInvalid(parent_hash));
            }
            Some(_) => {}
        }

        let height = block.height();
        if let Some(expected) = self.config.checkpoint_at(height) {
            if expected != hash {
                return Err(ChainError::CheckpointMismatch {
                    height,
                    expected,
                    got: hash,
                });
            }
        }
        if parent_hash != self.tip_hash() {
            let fork_height = self.fork_height(&parent_hash)?;
            if height <= self.finalized_height || fork_height < self.finalized_height {
                return Err(ChainError::BelowFinality {
                    height,
                    finalized: self.finalized_height,
                });
            }
        }

        let (parent, ctx) = self.chain_context(&parent_hash, now)?;
        self.validator.validate_header(&block.header, &parent, &ctx)?;

        let tip_work = self.tip().cumulative_work;
        let work = self
            .index
            .insert(Arc::clone(&block), ctx.required_bits, BlockStatus::HeaderValid)
            .cumulative_work
            .clone();

        if parent_hash == self.tip_hash() {
            self.extend(&block, now)?;
            return Ok(BlockOutcome::Extended { height });
        }
        if work > tip_work {
            let event = self.reorganize(hash, now)?;
            return Ok(BlockOutcome::Reorganized(event));
        }
        debug!(tip_height = self.height(), "Block stored on side branch");
        Ok(BlockOutcome::SideBranch { height })
    }

    /// Process buffered descendants of `parent`, depth first.
    fn connect_orphans(&mut self, parent: BlockHash, now: u64) {
        let mut pending = vec![parent];
        while let Some(parent) = pending.pop() {
            for child in self.orphans.take_children(&parent) {
                let hash = child.hash();
                let result = self.process_block(child, now);
                match self.guard(result) {
                    Ok(outcome) => {
                        debug!(%hash, ?outcome, "Processed orphan block");
                        pending.push(hash);
                    }
                    Err(err) => {
                        warn!(%hash, %err, "Orphan block rejected");
                        if self.is_halted() {
                            return;
                        }
                    }
                }
            }
        }
    }

    fn extend(&mut self, block: &Arc<Block>, now: u64) -> ChainResult<()> {
        let hash = block.hash();
        let previous_height = self.height();
        if let Err(err) = self.connect(block, now) {
            let invalid = self.index.invalidate(&hash);
            warn!(%hash, invalidated = invalid.len(), %err, "Block failed full validation");
            return Err(err);
        }

        let conflicts = self
            .mempool
            .remove_confirmed(&block.transactions, &mut self.utxos, now);
        self.apply_checkpoints(std::slice::from_ref(block));
        info!(
            height = block.height(),
            %hash,
            txs = block.transactions.len(),
            conflicts = conflicts.len(),
            "Chain extended"
        );
        self.events.push(ChainEvent::BlockConnected {
            hash,
            height: block.height(),
        });
        self.persist(std::slice::from_ref(block), Some(previous_height))
    }

    /// Fully validate `block` against the tip and apply it.
    fn connect(&mut self, block: &Block, now: u64) -> ChainResult<()> {
        let (parent, ctx) = self.chain_context(&self.tip_hash(), now)?;
        self.validator.validate_block(block, &parent, &ctx, &self.utxos)?;
        self.utxos
            .apply_block(block)
            .map_err(|e| ChainError::LedgerInconsistency(format!("apply of validated block failed: {e}")))?;
        let hash = block.hash();
        self.active.push(hash);
        self.index.set_status(&hash, BlockStatus::Valid);
        Ok(())
    }

    fn disconnect_tip(&mut self) -> ChainResult<Arc<Block>> {
        let block = self.tip_block()?;
        self.utxos
            .revert_block(&block)
            .map_err(|e| ChainError::LedgerInconsistency(format!("revert of block {} failed: {e}", block.hash())))?;
        self.active.pop();
        Ok(block)
    }

    fn reorganize(&mut self, new_tip: BlockHash, now: u64) -> ChainResult<ReorgEvent> {
        let (fork_height, branch) = self.branch_to(&new_tip)?;
        if fork_height < self.finalized_height {
            return Err(ChainError::BelowFinality {
                height: fork_height + 1,
                finalized: self.finalized_height,
            });
        }
        let old_tip = self.tip_hash();
        let old_height = self.height();
        info!(
            fork_height,
            old_height,
            new_height = fork_height + branch.len() as u32,
            "Reorganizing to heavier branch"
        );

        let reservations = self.utxos.reservations().clone();
        let mut disconnected = Vec::new();
        while self.height() > fork_height {
            disconnected.push(self.disconnect_tip()?);
        }

        let mut connected: Vec<Arc<Block>> = Vec::with_capacity(branch.len());
        for block in &branch {
            if let Err(err) = self.connect(block, now) {
                let bad = block.hash();
                self.rollback(&connected, &disconnected, reservations, now)?;
                let invalid = self.index.invalidate(&bad);
                warn!(
                    %bad,
                    invalidated = invalid.len(),
                    %err,
                    "Reorganization aborted, restored previous branch"
                );
                return Err(err);
            }
            connected.push(Arc::clone(block));
        }

        for block in &connected {
            self.mempool
                .remove_confirmed(&block.transactions, &mut self.utxos, now);
        }
        let rebroadcast = self.readmit_abandoned(&disconnected, &connected, now);
        self.apply_checkpoints(&connected);

        let event = ReorgEvent {
            fork_height,
            depth: disconnected.len() as u32,
            connected: connected.len() as u32,
            old_tip,
            new_tip,
            rebroadcast,
        };
        info!(
            depth = event.depth,
            connected = event.connected,
            rebroadcast = event.rebroadcast.len(),
            %new_tip,
            "Reorganization complete"
        );
        self.events.push(ChainEvent::Reorganized(event.clone()));
        self.persist(&connected, Some(old_height))?;
        Ok(event)
    }

    /// Undo a partially applied branch switch. The pool is untouched until a
    /// switch completes, so the reservations taken before it are put back
    /// whole.
    fn rollback(
        &mut self,
        connected: &[Arc<Block>],
        disconnected: &[Arc<Block>],
        reservations: ReservationTable,
        now: u64,
    ) -> ChainResult<()> {
        for _ in connected {
            self.disconnect_tip()?;
        }
        for block in disconnected.iter().rev() {
            self.utxos.apply_block(block).map_err(|e| {
                ChainError::LedgerInconsistency(format!("restoring block {} failed: {e}", block.hash()))
            })?;
            self.active.push(block.hash());
        }
        self.utxos.restore_reservations(reservations);

        let dropped = self.mempool.revalidate(&mut self.utxos, now);
        if !dropped.is_empty() {
            warn!(dropped = dropped.len(), "Pending transactions dropped after aborted reorganization");
        }
        Ok(())
    }

    /// Return transactions from the abandoned branch to the pool. Returns
    /// those that were re-admitted and survived revalidation.
    fn readmit_abandoned(
        &mut self,
        disconnected: &[Arc<Block>],
        connected: &[Arc<Block>],
        now: u64,
    ) -> Vec<TxId> {
        let confirmed: HashSet<TxId> = connected.iter().flat_map(|b| b.txids()).collect();
        let mut rebroadcast = Vec::new();
        // Oldest block first so chained spends see their parents.
        for tx in disconnected
            .iter()
            .rev()
            .flat_map(|b| b.transactions.iter())
            .filter(|tx| !tx.is_coinbase() && !confirmed.contains(&tx.txid))
        {
            let txid = tx.txid;
            match self.mempool.submit(tx.clone(), &mut self.utxos, now) {
                Ok(Admission::Orphaned { .. }) => {}
                Ok(_) => rebroadcast.push(txid),
                Err(err) => debug!(%txid, %err, "Abandoned transaction not re-admitted"),
            }
        }

        let dropped = self.mempool.revalidate(&mut self.utxos, now);
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "Pending transactions invalidated by reorganization");
        }
        rebroadcast.retain(|txid| self.mempool.contains(txid));
        rebroadcast
    }

    /// Height of the active-chain ancestor of `hash`.
    fn fork_height(&self, hash: &BlockHash) -> ChainResult<u32> {
        let mut cursor = *hash;
        loop {
            let entry = self.entry(&cursor)?;
            if self.is_active(&cursor, entry.height()) {
                return Ok(entry.height());
            }
            cursor = entry.header().previous_hash;
        }
    }

    /// Fork height and the blocks from just above it to `tip`, ascending.
    fn branch_to(&self, tip: &BlockHash) -> ChainResult<(u32, Vec<Arc<Block>>)> {
        let mut branch = Vec::new();
        let mut cursor = *tip;
        loop {
            let entry = self.entry(&cursor)?;
            if self.is_active(&cursor, entry.height()) {
                branch.reverse();
                return Ok((entry.height(), branch));
            }
            branch.push(Arc::clone(&entry.block));
            cursor = entry.header().previous_hash;
        }
    }

    fn is_active(&self, hash: &BlockHash, height: u32) -> bool {
        self.active.get(height as usize) == Some(hash)
    }

    fn entry(&self, hash: &BlockHash) -> ChainResult<&IndexEntry> {
        self.index
            .get(hash)
            .ok_or_else(|| ChainError::LedgerInconsistency(format!("block {hash} missing from index")))
    }

    fn tip_block(&self) -> ChainResult<Arc<Block>> {
        Ok(Arc::clone(&self.entry(&self.tip_hash())?.block))
    }

    /// Parent header and validation context for a child of `parent_hash`.
    fn chain_context(&self, parent_hash: &BlockHash, now: u64) -> ChainResult<(BlockHeader, ChainContext)> {
        let parent = self.entry(parent_hash)?;
        let span = self.params().median_time_span;

        let mut recent_timestamps = Vec::with_capacity(span);
        let mut cursor = Some(parent);
        while let Some(entry) = cursor {
            if recent_timestamps.len() == span {
                break;
            }
            recent_timestamps.push(entry.header().timestamp);
            cursor = self.index.get(&entry.header().previous_hash);
        }
        recent_timestamps.reverse();

        let next_height = parent.height() + 1;
        let window_start = self
            .difficulty
            .retarget_window_start(next_height)
            .and_then(|h| self.index.ancestor(parent_hash, h))
            .map(|e| e.header().timestamp);
        let required_bits = self.difficulty.next_bits(
            next_height,
            parent.required_bits,
            parent.header().timestamp,
            window_start,
        );

        Ok((
            parent.header().clone(),
            ChainContext {
                recent_timestamps,
                required_bits,
                now,
            },
        ))
    }

    fn apply_checkpoints(&mut self, connected: &[Arc<Block>]) {
        let reached = connected
            .iter()
            .filter(|b| self.config.checkpoint_at(b.height()) == Some(b.hash()))
            .map(|b| b.height())
            .max();
        if let Some(height) = reached {
            info!(height, "Checkpoint reached");
            self.finalize(height);
        }
    }

    fn finalize(&mut self, height: u32) {
        if height <= self.finalized_height {
            return;
        }
        self.finalized_height = height;
        let pruned_undo = self.utxos.prune_undo(height);

        let stale: Vec<BlockHash> = self
            .index
            .hashes_up_to(height)
            .into_iter()
            .filter(|hash| {
                self.index
                    .get(hash)
                    .is_some_and(|e| !self.is_active(hash, e.height()))
            })
            .collect();
        let mut pruned_blocks = 0;
        for hash in stale {
            pruned_blocks += self.index.remove_subtree(&hash).len();
        }
        info!(finalized = height, pruned_undo, pruned_blocks, "Finalized height advanced");
    }

    /// Write connected blocks and the new tip, retrying transient failures
    /// with exponential backoff.
    fn persist(&self, connected: &[Arc<Block>], previous_height: Option<u32>) -> ChainResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let tip = TipRecord {
            hash: self.tip_hash(),
            height: self.height(),
            utxo_digest: self.utxos.snapshot_digest(),
            total_issued: self.utxos.total_issued(),
        };

        let attempts = self.config.storage_retry_attempts.max(1);
        let mut delay = self.config.storage_retry_backoff_ms;
        let mut attempt = 1;
        loop {
            match store.commit(connected.iter().map(|b| b.as_ref()), previous_height, &tip) {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts && err.is_transient() => {
                    warn!(attempt, attempts, %err, "Persisting tip failed, retrying");
                    std::thread::sleep(Duration::from_millis(delay));
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempt, height = tip.height, %err, "Persisting tip failed");
                    return Err(err.into());
                }
            }
        }
    }

    fn ensure_running(&self) -> ChainResult<()> {
        match &self.halted {
            Some(reason) => Err(ChainError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    /// Halt on errors that leave authoritative state untrustworthy.
    fn guard<T>(&mut self, result: ChainResult<T>) -> ChainResult<T> {
        if let Err(err) = &result {
            if err.disposition() == Disposition::Halt && self.halted.is_none() {
                let reason = err.to_string();
                error!(%reason, "Chain halted");
                self.events.push(ChainEvent::Halted {
                    reason: reason.clone(),
                });
                self.halted = Some(reason);
            }
        }
        result
    }
}
