//! Transaction and block construction.
//!
//! Used by wallets and miners that sit outside the ledger core, by genesis
//! creation, and by tests.

use crate::address::derive_address;
use crate::chain_params::ChainParams;
use crate::crypto::{public_key_bytes, sign, SigningKey};
use crate::difficulty::{check_proof_of_work, nbits_to_target};
use crate::emission::coinbase_reward;
use crate::merkle::merkle_root;
use crate::types::{
    Address, Amount, Block, BlockHash, BlockHeader, Transaction, TxId, TxOutput, TxType, UtxoRef,
};
use num_traits::Zero;

/// Builder for signed transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    tx_type: TxType,
    inputs: Vec<UtxoRef>,
    outputs: Vec<TxOutput>,
    fee: Amount,
    nonce: u64,
    timestamp: u64,
    rbf_enabled: bool,
    replaces_txid: Option<TxId>,
    payload: Vec<u8>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tx_type(mut self, tx_type: TxType) -> Self {
        self.tx_type = tx_type;
        self
    }

    pub fn input(mut self, utxo_ref: UtxoRef) -> Self {
        self.inputs.push(utxo_ref);
        self
    }

    pub fn output(mut self, address: Address, amount: Amount) -> Self {
        self.outputs.push(TxOutput::new(address, amount));
        self
    }

    pub fn fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn rbf(mut self, enabled: bool) -> Self {
        self.rbf_enabled = enabled;
        self
    }

    /// Replace a pending transaction; implies `rbf_enabled`.
    pub fn replaces(mut self, txid: TxId) -> Self {
        self.rbf_enabled = true;
        self.replaces_txid = Some(txid);
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Fill in sender and key from `key`, seal the txid and sign it.
    pub fn sign(self, key: &SigningKey, address_prefix: &str) -> Transaction {
        let public_key = public_key_bytes(key);
        let mut tx = Transaction {
            txid: TxId::ZERO,
            tx_type: self.tx_type,
            sender: derive_address(&public_key, address_prefix),
            inputs: self.inputs,
            outputs: self.outputs,
            fee: self.fee,
            nonce: self.nonce,
            timestamp: self.timestamp,
            public_key,
            signature: Vec::new(),
            rbf_enabled: self.rbf_enabled,
            replaces_txid: self.replaces_txid,
            payload: self.payload,
        }
        .seal();
        sign_transaction(&mut tx, key);
        tx
    }
}

/// Sign the transaction's txid in place.
pub fn sign_transaction(tx: &mut Transaction, key: &SigningKey) {
    tx.signature = sign(key, tx.txid.as_bytes());
}

/// Coinbase paying `amount` to `address` at `height`.
///
/// The nonce carries the height so coinbase txids are unique per height.
pub fn coinbase_transaction(
    height: u32,
    address: Address,
    amount: Amount,
    timestamp: u64,
) -> Transaction {
    Transaction {
        txid: TxId::ZERO,
        tx_type: TxType::Coinbase,
        sender: address.clone(),
        inputs: Vec::new(),
        outputs: vec![TxOutput::new(address, amount)],
        fee: 0,
        nonce: u64::from(height),
        timestamp,
        public_key: Vec::new(),
        signature: Vec::new(),
        rbf_enabled: false,
        replaces_txid: None,
        payload: Vec::new(),
    }
    .seal()
}

/// Builder for mined blocks.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    version: u32,
    height: u32,
    previous_hash: BlockHash,
    timestamp: u64,
    bits: u32,
    miner: Option<SigningKey>,
    transactions: Vec<Transaction>,
}

impl BlockBuilder {
    pub fn new(height: u32, previous_hash: BlockHash, bits: u32) -> Self {
        Self {
            version: 1,
            height,
            previous_hash,
            timestamp: 0,
            bits,
            miner: None,
            transactions: Vec::new(),
        }
    }

    /// Child of `parent`, inheriting its target.
    pub fn on_top_of(parent: &BlockHeader) -> Self {
        Self::new(parent.height + 1, parent.hash(), parent.difficulty_target)
            .timestamp(parent.timestamp + 1)
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn bits(mut self, bits: u32) -> Self {
        self.bits = bits;
        self
    }

    /// Sign the block with this key and record its public key in the header.
    pub fn miner(mut self, key: SigningKey) -> Self {
        self.miner = Some(key);
        self
    }

    pub fn transaction(mut self, tx: Transaction) -> Self {
        self.transactions.push(tx);
        self
    }

    pub fn transactions(mut self, txs: impl IntoIterator<Item = Transaction>) -> Self {
        self.transactions.extend(txs);
        self
    }

    /// Compute the merkle root, search for a nonce and sign.
    pub fn build(self) -> Block {
        let txids: Vec<TxId> = self.transactions.iter().map(|tx| tx.txid).collect();
        let mut header = BlockHeader {
            version: self.version,
            height: self.height,
            previous_hash: self.previous_hash,
            merkle_root: merkle_root(&txids),
            timestamp: self.timestamp,
            difficulty_target: self.bits,
            nonce: 0,
            miner_pubkey: self.miner.as_ref().map(public_key_bytes).unwrap_or_default(),
        };
        solve(&mut header, u64::MAX);

        let signature = match &self.miner {
            Some(key) => sign(key, header.hash().as_bytes()),
            None => Vec::new(),
        };

        Block {
            header,
            signature,
            transactions: self.transactions,
        }
    }
}

/// Search nonces until the header meets its target.
///
/// Returns false if no nonce within `max_attempts` qualifies or the target
/// is zero.
pub fn solve(header: &mut BlockHeader, max_attempts: u64) -> bool {
    if nbits_to_target(header.difficulty_target).is_zero() {
        return false;
    }
    for _ in 0..max_attempts {
        if check_proof_of_work(header) {
            return true;
        }
        header.nonce = header.nonce.wrapping_add(1);
    }
    false
}

/// Genesis block paying the height-0 reward to `reward_address`.
pub fn genesis_block(params: &ChainParams, reward_address: Address, timestamp: u64) -> Block {
    let coinbase = coinbase_transaction(0, reward_address, coinbase_reward(params, 0), timestamp);
    BlockBuilder::new(0, BlockHash::ZERO, params.genesis_bits)
        .version(params.allowed_versions.first().copied().unwrap_or(1))
        .timestamp(timestamp)
        .transaction(coinbase)
        .build()
}
