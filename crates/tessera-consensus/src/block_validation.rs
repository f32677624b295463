//! Block validation.
//!
//! Check order for a block extending `prev`:
//!
//! 1. header version
//! 2. parent hash and height
//! 3. timestamp against median-time-past and the future drift limit
//! 4. merkle root
//! 5. declared target and proof of work
//! 6. size and transaction count
//! 7. coinbase count, position and reward
//! 8. transactions: context-free stages in parallel, then stateful stages
//!    sequentially against an overlay holding the effects of earlier
//!    transactions in the block
//! 9. miner signature

use crate::chain_params::ChainParams;
use crate::crypto::verify_signature;
use crate::difficulty::{check_proof_of_work, meets_required, median_time_past};
use crate::emission::coinbase_reward;
use crate::error::{ConsensusError, ConsensusResult, SignatureError};
use crate::ledger_view::LedgerView;
use crate::merkle::merkle_root;
use crate::tx_validation::{TransactionValidator, ValidationContext};
use crate::types::{Address, Amount, Block, BlockHash, BlockHeader, Transaction, TxId, Utxo, UtxoRef};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Chain-derived inputs for validating one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainContext {
    /// Timestamps of the most recent ancestors, parent last.
    pub recent_timestamps: Vec<u64>,
    /// Easiest target the block may declare.
    pub required_bits: u32,
    /// Local wall-clock time.
    pub now: u64,
}

/// Accounting for a block that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    pub hash: BlockHash,
    pub height: u32,
    pub reward: Amount,
    pub total_fees: Amount,
    pub coinbase_amount: Amount,
}

/// Ledger view with the effects of already-validated block transactions
/// layered over a base view.
pub struct BlockOverlay<'a> {
    base: &'a dyn LedgerView,
    height: u32,
    created: HashMap<UtxoRef, Utxo>,
    spent: HashMap<UtxoRef, (TxId, Option<Utxo>)>,
    nonces: HashMap<Address, u64>,
}

impl<'a> BlockOverlay<'a> {
    pub fn new(base: &'a dyn LedgerView, height: u32) -> Self {
        Self {
            base,
            height,
            created: HashMap::new(),
            spent: HashMap::new(),
            nonces: HashMap::new(),
        }
    }

    /// Record the effects of `tx`. The caller has already validated it.
    pub fn apply(&mut self, tx: &Transaction) {
        for input in &tx.inputs {
            let from_base = match self.created.remove(input) {
                Some(_) => None,
                None => self.base.utxo(input),
            };
            self.spent.insert(*input, (tx.txid, from_base));
        }
        for utxo in tx.created_utxos(self.height) {
            self.created.insert(utxo.utxo_ref(), utxo);
        }
        if !tx.is_coinbase() {
            let entry = self.nonces.entry(tx.sender.clone()).or_insert(tx.nonce);
            *entry = (*entry).max(tx.nonce);
        }
    }
}

impl LedgerView for BlockOverlay<'_> {
    fn utxo(&self, utxo_ref: &UtxoRef) -> Option<Utxo> {
        if self.spent.contains_key(utxo_ref) {
            return None;
        }
        self.created
            .get(utxo_ref)
            .cloned()
            .or_else(|| self.base.utxo(utxo_ref))
    }

    fn spent_by(&self, utxo_ref: &UtxoRef) -> Option<TxId> {
        self.spent
            .get(utxo_ref)
            .map(|(txid, _)| *txid)
            .or_else(|| self.base.spent_by(utxo_ref))
    }

    fn confirmed_nonce(&self, sender: &Address) -> Option<u64> {
        self.nonces
            .get(sender)
            .copied()
            .max(self.base.confirmed_nonce(sender))
    }

    fn balance(&self, address: &Address) -> Amount {
        let spent: Amount = self
            .spent
            .values()
            .filter_map(|(_, utxo)| utxo.as_ref())
            .filter(|u| &u.owner == address)
            .map(|u| u.amount)
            .sum();
        let created: Amount = self
            .created
            .values()
            .filter(|u| &u.owner == address)
            .map(|u| u.amount)
            .sum();
        (self.base.balance(address) + created).saturating_sub(spent)
    }
}

/// Full block validator.
#[derive(Debug, Clone)]
pub struct BlockValidator {
    params: ChainParams,
    tx_validator: TransactionValidator,
}

impl BlockValidator {
    pub fn new(params: ChainParams, tx_validator: TransactionValidator) -> Self {
        Self {
            params,
            tx_validator,
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn tx_validator(&self) -> &TransactionValidator {
        &self.tx_validator
    }

    /// Validate a block extending `prev` against `view`, the state at `prev`.
    #[instrument(skip_all, fields(height = block.height(), hash = %block.hash()))]
    pub fn validate_block(
        &self,
        block: &Block,
        prev: &BlockHeader,
        ctx: &ChainContext,
        view: &dyn LedgerView,
    ) -> ConsensusResult<BlockSummary> {
        let header = &block.header;
        self.check_version(header)?;
        check_parent(header, prev)?;
        self.check_timestamp(header, ctx)?;
        check_merkle(block)?;
        check_work(header, ctx.required_bits)?;
        self.check_limits(block)?;
        let summary = self.check_coinbase(block)?;
        self.check_transactions(block, view)?;
        self.check_signature(block)?;

        debug!(
            txs = block.transactions.len(),
            fees = summary.total_fees,
            "Block valid"
        );
        Ok(summary)
    }

    /// Header checks that need only the parent and chain context.
    pub fn validate_header(
        &self,
        header: &BlockHeader,
        prev: &BlockHeader,
        ctx: &ChainContext,
    ) -> ConsensusResult<()> {
        self.check_version(header)?;
        check_parent(header, prev)?;
        self.check_timestamp(header, ctx)?;
        check_work(header, ctx.required_bits)
    }

    /// Body checks that need no ledger state.
    pub fn validate_context_free(&self, block: &Block) -> ConsensusResult<BlockSummary> {
        check_merkle(block)?;
        self.check_limits(block)?;
        let summary = self.check_coinbase(block)?;
        self.check_transactions_stateless(block)?;
        self.check_signature(block)?;
        Ok(summary)
    }

    /// Validate the configured genesis block.
    ///
    /// Genesis has no parent, so parent, median-time and signature rules do
    /// not apply.
    pub fn validate_genesis(&self, block: &Block, view: &dyn LedgerView) -> ConsensusResult<BlockSummary> {
        let header = &block.header;
        self.check_version(header)?;
        if header.height != 0 {
            return Err(ConsensusError::InvalidHeight {
                got: header.height,
                expected: 0,
            });
        }
        check_merkle(block)?;
        check_work(header, self.params.pow_limit_bits)?;
        self.check_limits(block)?;
        let summary = self.check_coinbase(block)?;
        self.check_transactions(block, view)?;
        Ok(summary)
    }

    fn check_version(&self, header: &BlockHeader) -> ConsensusResult<()> {
        if !self.params.allowed_versions.contains(&header.version) {
            return Err(ConsensusError::InvalidVersion(header.version));
        }
        Ok(())
    }

    fn check_timestamp(&self, header: &BlockHeader, ctx: &ChainContext) -> ConsensusResult<()> {
        if !ctx.recent_timestamps.is_empty() {
            let median = median_time_past(&ctx.recent_timestamps);
            if header.timestamp <= median {
                return Err(ConsensusError::TimestampTooOld {
                    timestamp: header.timestamp,
                    median,
                });
            }
        }
        let limit = ctx.now.saturating_add(self.params.max_future_drift_secs);
        if header.timestamp > limit {
            return Err(ConsensusError::TimestampTooNew {
                timestamp: header.timestamp,
                limit,
            });
        }
        Ok(())
    }

    fn check_limits(&self, block: &Block) -> ConsensusResult<()> {
        let count = block.transactions.len();
        if count > self.params.max_block_txs {
            return Err(ConsensusError::TooManyTransactions {
                count,
                max: self.params.max_block_txs,
            });
        }
        let size = block.size();
        if size > self.params.max_block_bytes {
            return Err(ConsensusError::BlockTooLarge {
                size,
                max: self.params.max_block_bytes,
            });
        }
        Ok(())
    }

    fn check_coinbase(&self, block: &Block) -> ConsensusResult<BlockSummary> {
        let height = block.height();
        let coinbases = block.transactions.iter().filter(|tx| tx.is_coinbase()).count();
        match coinbases {
            0 => return Err(ConsensusError::MissingCoinbase),
            1 => {}
            n => return Err(ConsensusError::MultipleCoinbase(n)),
        }
        let coinbase = &block.transactions[0];
        if !coinbase.is_coinbase() {
            return Err(ConsensusError::CoinbaseNotFirst);
        }

        let reward = coinbase_reward(&self.params, height);
        let total_fees = block.total_fees().unwrap_or(Amount::MAX);
        let allowed = reward
            .saturating_add(total_fees)
            .saturating_add(self.params.coinbase_tolerance);
        let claimed = coinbase.output_total().unwrap_or(Amount::MAX);

        if claimed > allowed {
            warn!(
                height,
                claimed,
                allowed,
                reward,
                total_fees,
                "Coinbase exceeds reward plus fees, potential inflation attack"
            );
            return Err(ConsensusError::RewardExceeded {
                height,
                claimed,
                allowed,
            });
        }

        Ok(BlockSummary {
            hash: block.hash(),
            height,
            reward,
            total_fees,
            coinbase_amount: claimed,
        })
    }

    fn check_transactions_stateless(&self, block: &Block) -> ConsensusResult<()> {
        let ctx = ValidationContext::block(block.header.timestamp);
        let failure = block
            .transactions
            .par_iter()
            .enumerate()
            .filter_map(|(index, tx)| {
                self.tx_validator
                    .check_stateless(tx, &ctx)
                    .err()
                    .map(|e| (index, e))
            })
            .min_by_key(|(index, _)| *index);

        match failure {
            Some((index, source)) => Err(ConsensusError::Transaction {
                index,
                txid: block.transactions[index].txid,
                source,
            }),
            None => Ok(()),
        }
    }

    fn check_transactions(&self, block: &Block, view: &dyn LedgerView) -> ConsensusResult<()> {
        self.check_transactions_stateless(block)?;

        let ctx = ValidationContext::block(block.header.timestamp);
        let mut overlay = BlockOverlay::new(view, block.height());
        for (index, tx) in block.transactions.iter().enumerate() {
            self.tx_validator
                .check_stateful(tx, &overlay, &ctx)
                .map_err(|source| ConsensusError::Transaction {
                    index,
                    txid: tx.txid,
                    source,
                })?;
            overlay.apply(tx);
        }
        Ok(())
    }

    fn check_signature(&self, block: &Block) -> ConsensusResult<()> {
        if block.signature.is_empty() {
            if self.params.require_block_signature {
                return Err(ConsensusError::BlockSignature(SignatureError::Missing));
            }
            return Ok(());
        }
        verify_signature(
            &block.header.miner_pubkey,
            block.hash().as_bytes(),
            &block.signature,
        )
        .map_err(ConsensusError::BlockSignature)
    }
}

fn check_parent(header: &BlockHeader, prev: &BlockHeader) -> ConsensusResult<()> {
    if header.previous_hash != prev.hash() {
        return Err(ConsensusError::UnknownParent(header.previous_hash.to_hex()));
    }
    let expected = prev.height + 1;
    if header.height != expected {
        return Err(ConsensusError::InvalidHeight {
            got: header.height,
            expected,
        });
    }
    Ok(())
}

fn check_merkle(block: &Block) -> ConsensusResult<()> {
    let computed = merkle_root(&block.txids());
    if computed != block.header.merkle_root {
        return Err(ConsensusError::MerkleMismatch {
            header: hex::encode(block.header.merkle_root),
            computed: hex::encode(computed),
        });
    }
    Ok(())
}

fn check_work(header: &BlockHeader, required_bits: u32) -> ConsensusResult<()> {
    if !meets_required(header.difficulty_target, required_bits) {
        return Err(ConsensusError::InvalidDifficulty {
            got: header.difficulty_target,
            required: required_bits,
        });
    }
    if !check_proof_of_work(header) {
        return Err(ConsensusError::InsufficientWork {
            bits: header.difficulty_target,
        });
    }
    Ok(())
}
