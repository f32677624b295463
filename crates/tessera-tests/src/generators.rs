//! Test data generators for integration tests.
//!
//! Deterministic keys and addresses, signed transfers and mined blocks on
//! regtest parameters.

use std::sync::atomic::{AtomicU64, Ordering};
use tessera_consensus::{
    coinbase_reward, coinbase_transaction, derive_address, genesis_block, public_key_bytes,
    Address, Amount, Block, BlockBuilder, BlockHeader, BlockValidator, ChainParams, SigningKey,
    Transaction, TransactionBuilder, TransactionValidator, TxId, Utxo, UtxoRef, ValidationConfig,
};
use tessera_mempool::{Mempool, MempoolConfig};

/// Global counter for unique ID generation
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Timestamp of every test genesis block.
pub const GENESIS_TIME: u64 = 1_700_000_000;

/// Target block spacing used by the generators.
pub const BLOCK_SPACING: u64 = 120;

/// Regtest address prefix.
pub const PREFIX: &str = "tTSR";

/// Signing key derived from a one-byte seed. Seed 0 is not a valid key.
pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed.max(1); 32]).expect("non-zero scalar is a valid key")
}

/// Address of `signing_key(seed)`.
pub fn address(seed: u8) -> Address {
    derive_address(&public_key_bytes(&signing_key(seed)), PREFIX)
}

/// Transaction id no other generator call returns.
pub fn unique_txid() -> TxId {
    let counter = ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut id = [0u8; 32];
    id[0] = 0xAA;
    id[1..9].copy_from_slice(&counter.to_be_bytes());
    TxId(id)
}

/// Synthetic confirmed output owned by `owner`, for UTXO-set-level tests.
pub fn synthetic_utxo(owner: u8, amount: Amount) -> Utxo {
    Utxo {
        txid: unique_txid(),
        output_index: 0,
        owner: address(owner),
        amount,
        created_height: 0,
    }
}

pub fn regtest_params() -> ChainParams {
    ChainParams::regtest()
}

pub fn tx_validator() -> TransactionValidator {
    TransactionValidator::new(ValidationConfig::default(), PREFIX)
}

pub fn block_validator() -> BlockValidator {
    BlockValidator::new(regtest_params(), tx_validator())
}

pub fn mempool() -> Mempool {
    Mempool::new(MempoolConfig::default(), tx_validator())
}

/// Regtest genesis paying its reward to `owner`.
pub fn genesis(owner: u8) -> Block {
    genesis_block(&regtest_params(), address(owner), GENESIS_TIME)
}

/// Spend `inputs` from `from`, paying `amount` to `to` and the rest minus
/// `fee` back to `from`.
pub fn transfer(
    from: u8,
    inputs: &[UtxoRef],
    input_total: Amount,
    to: u8,
    amount: Amount,
    fee: Amount,
    nonce: u64,
) -> Transaction {
    let mut builder = TransactionBuilder::new()
        .output(address(to), amount)
        .fee(fee)
        .nonce(nonce)
        .timestamp(GENESIS_TIME);
    for input in inputs {
        builder = builder.input(*input);
    }
    let change = input_total - amount - fee;
    if change > 0 {
        builder = builder.output(address(from), change);
    }
    builder.sign(&signing_key(from), PREFIX)
}

/// Spend a single output entirely to `to`.
pub fn pay_all(from: u8, utxo: &Utxo, to: u8, fee: Amount, nonce: u64) -> Transaction {
    transfer(from, &[utxo.utxo_ref()], utxo.amount, to, utxo.amount - fee, fee, nonce)
}

/// Builder for a block on top of `parent`.
#[derive(Debug, Clone)]
pub struct BlockSpec {
    parent: BlockHeader,
    txs: Vec<Transaction>,
    miner: u8,
    timestamp: u64,
    bits: u32,
    coinbase_amount: Option<Amount>,
}

impl BlockSpec {
    pub fn on(parent: &BlockHeader) -> Self {
        Self {
            parent: parent.clone(),
            txs: Vec::new(),
            miner: 9,
            timestamp: parent.timestamp + BLOCK_SPACING,
            bits: parent.difficulty_target,
            coinbase_amount: None,
        }
    }

    pub fn txs(mut self, txs: Vec<Transaction>) -> Self {
        self.txs = txs;
        self
    }

    pub fn miner(mut self, seed: u8) -> Self {
        self.miner = seed;
        self
    }

    /// Shift the timestamp so sibling blocks get distinct hashes.
    pub fn offset(mut self, secs: u64) -> Self {
        self.timestamp += secs;
        self
    }

    pub fn bits(mut self, bits: u32) -> Self {
        self.bits = bits;
        self
    }

    /// Claim exactly `amount` in the coinbase instead of reward plus fees.
    pub fn coinbase_amount(mut self, amount: Amount) -> Self {
        self.coinbase_amount = Some(amount);
        self
    }

    pub fn build(self) -> Block {
        let height = self.parent.height + 1;
        let fees: Amount = self.txs.iter().map(|tx| tx.fee).sum();
        let amount = self
            .coinbase_amount
            .unwrap_or_else(|| coinbase_reward(&regtest_params(), height) + fees);
        BlockBuilder::on_top_of(&self.parent)
            .timestamp(self.timestamp)
            .bits(self.bits)
            .transaction(coinbase_transaction(height, address(self.miner), amount, self.timestamp))
            .transactions(self.txs)
            .build()
    }
}

/// Empty block on `parent`.
pub fn next_block(parent: &Block) -> Block {
    BlockSpec::on(&parent.header).build()
}

/// `len` empty blocks descending from `parent`. `offset` separates branches.
pub fn branch(parent: &Block, len: usize, offset: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(len);
    for _ in 0..len {
        let tip = blocks.last().unwrap_or(parent);
        let block = BlockSpec::on(&tip.header).offset(offset).build();
        blocks.push(block);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_consensus::{check_proof_of_work, validate_address, COIN};

    #[test]
    fn test_unique_ids() {
        assert_ne!(unique_txid(), unique_txid());
    }

    #[test]
    fn test_addresses_valid() {
        for seed in [0u8, 1, 2, 255] {
            assert!(validate_address(&address(seed), PREFIX).is_ok());
        }
        assert_eq!(address(0), address(1));
    }

    #[test]
    fn test_branch_links() {
        let g = genesis(1);
        let blocks = branch(&g, 3, 0);
        assert_eq!(blocks[0].header.previous_hash, g.hash());
        assert_eq!(blocks[2].header.previous_hash, blocks[1].hash());
        assert_eq!(blocks[2].height(), 3);
        assert!(blocks.iter().all(|b| check_proof_of_work(&b.header)));

        let other = branch(&g, 1, 7);
        assert_ne!(other[0].hash(), blocks[0].hash());
    }

    #[test]
    fn test_transfer_change() {
        let utxo = synthetic_utxo(1, 10 * COIN);
        let tx = transfer(1, &[utxo.utxo_ref()], utxo.amount, 2, 3 * COIN, 1_000, 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[1].amount, 7 * COIN - 1_000);
        assert_eq!(tx.output_total(), Some(10 * COIN - 1_000));
    }
}
