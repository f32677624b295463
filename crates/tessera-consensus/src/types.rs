//! Ledger data model: transactions, outputs, blocks.

use crate::codec::ByteWriter;
use crate::crypto::{sha256, sha256d};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in base units.
pub type Amount = u64;

/// Base units per coin.
pub const COIN: Amount = 100_000_000;

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "hex::serde")] pub [u8; 32]);

        impl $name {
            /// All-zero id.
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let mut out = [0u8; 32];
                hex::decode_to_slice(s, &mut out)?;
                Ok(Self(out))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..16])
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

hash_id!(
    /// Transaction identifier: SHA-256 of the canonical encoding.
    TxId
);

hash_id!(
    /// Block identifier: double SHA-256 of the header encoding.
    BlockHash
);

/// Account address string (`prefix + hex(payload ++ checksum)`).
///
/// Construction does not validate; see [`crate::address::validate_address`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

/// Reference to a transaction output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtxoRef {
    pub txid: TxId,
    pub index: u32,
}

impl UtxoRef {
    pub fn new(txid: TxId, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

impl fmt::Debug for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", &self.txid.to_hex()[..16], self.index)
    }
}

/// An unspent output as held by the UTXO set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: TxId,
    pub output_index: u32,
    pub owner: Address,
    pub amount: Amount,
    pub created_height: u32,
}

impl Utxo {
    pub fn utxo_ref(&self) -> UtxoRef {
        UtxoRef::new(self.txid, self.output_index)
    }

    /// Fixed-width encoding used by state digests.
    pub fn encode(&self, w: &mut ByteWriter) {
        w.put_hash(self.txid.as_bytes())
            .put_u32(self.output_index)
            .put_str(self.owner.as_str())
            .put_u64(self.amount)
            .put_u32(self.created_height);
    }
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub amount: Amount,
}

impl TxOutput {
    pub fn new(address: Address, amount: Amount) -> Self {
        Self { address, amount }
    }
}

/// Transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    #[default]
    Normal,
    /// Reward-minting transaction, one per block.
    Coinbase,
    /// Executed by the external contract VM.
    Contract,
    /// Executed by the external governance module.
    Governance,
}

impl TxType {
    fn code(self) -> u8 {
        match self {
            TxType::Normal => 0,
            TxType::Coinbase => 1,
            TxType::Contract => 2,
            TxType::Governance => 3,
        }
    }

    /// Types whose semantics are decided outside the ledger core.
    pub fn is_delegated(self) -> bool {
        matches!(self, TxType::Contract | TxType::Governance)
    }
}

/// A signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: TxId,
    pub tx_type: TxType,
    /// Declared sender; must match the hash of `public_key`.
    pub sender: Address,
    pub inputs: Vec<UtxoRef>,
    pub outputs: Vec<TxOutput>,
    pub fee: Amount,
    pub nonce: u64,
    /// Unix seconds.
    pub timestamp: u64,
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    pub rbf_enabled: bool,
    pub replaces_txid: Option<TxId>,
    /// Call data for contract and governance transactions.
    #[serde(with = "hex::serde", default)]
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Canonical encoding of every field except `txid` and `signature`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(
            128 + self.inputs.len() * 36 + self.outputs.len() * 64 + self.payload.len(),
        );
        w.put_u8(self.tx_type.code()).put_str(self.sender.as_str());

        w.put_u32(self.inputs.len() as u32);
        for input in &self.inputs {
            w.put_hash(input.txid.as_bytes()).put_u32(input.index);
        }

        w.put_u32(self.outputs.len() as u32);
        for output in &self.outputs {
            w.put_str(output.address.as_str()).put_u64(output.amount);
        }

        w.put_u64(self.fee)
            .put_u64(self.nonce)
            .put_u64(self.timestamp)
            .put_bytes(&self.public_key)
            .put_bool(self.rbf_enabled);

        match &self.replaces_txid {
            Some(id) => w.put_u8(1).put_hash(id.as_bytes()),
            None => w.put_u8(0),
        };

        w.put_bytes(&self.payload);
        w.finish()
    }

    /// Hash of the canonical encoding.
    pub fn compute_txid(&self) -> TxId {
        TxId(sha256(&self.canonical_bytes()))
    }

    /// Set `txid` from the current contents.
    pub fn seal(mut self) -> Self {
        self.txid = self.compute_txid();
        self
    }

    /// Size used for limits and fee rates.
    pub fn size(&self) -> usize {
        self.canonical_bytes().len() + self.signature.len()
    }

    /// Fee per byte.
    pub fn fee_rate(&self) -> f64 {
        let size = self.size();
        if size == 0 {
            0.0
        } else {
            self.fee as f64 / size as f64
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx_type == TxType::Coinbase
    }

    /// Sum of output amounts, `None` on overflow.
    pub fn output_total(&self) -> Option<Amount> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
    }

    /// Reference to output `index` of this transaction.
    pub fn output_ref(&self, index: u32) -> UtxoRef {
        UtxoRef::new(self.txid, index)
    }

    /// Outputs as UTXOs created at `height`.
    pub fn created_utxos(&self, height: u32) -> impl Iterator<Item = Utxo> + '_ {
        self.outputs.iter().enumerate().map(move |(i, out)| Utxo {
            txid: self.txid,
            output_index: i as u32,
            owner: out.address.clone(),
            amount: out.amount,
            created_height: height,
        })
    }
}

/// Block header. `block_hash` covers every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub height: u32,
    pub previous_hash: BlockHash,
    #[serde(with = "hex::serde")]
    pub merkle_root: [u8; 32],
    /// Unix seconds.
    pub timestamp: u64,
    /// Compact target (nBits).
    pub difficulty_target: u32,
    pub nonce: u64,
    #[serde(with = "hex::serde")]
    pub miner_pubkey: Vec<u8>,
}

impl BlockHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(128);
        w.put_u32(self.version)
            .put_u32(self.height)
            .put_hash(self.previous_hash.as_bytes())
            .put_hash(&self.merkle_root)
            .put_u64(self.timestamp)
            .put_u32(self.difficulty_target)
            .put_u64(self.nonce)
            .put_bytes(&self.miner_pubkey);
        w.finish()
    }

    pub fn hash(&self) -> BlockHash {
        BlockHash(sha256d(&self.encode()))
    }
}

/// A full block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// Miner signature over the block hash; may be empty.
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    /// First coinbase transaction, if any.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.is_coinbase())
    }

    pub fn txids(&self) -> Vec<TxId> {
        self.transactions.iter().map(|tx| tx.txid).collect()
    }

    /// Serialized size: header, signature and all transactions.
    pub fn size(&self) -> usize {
        self.header.encode().len()
            + self.signature.len()
            + self.transactions.iter().map(Transaction::size).sum::<usize>()
    }

    /// Sum of declared fees of non-coinbase transactions.
    pub fn total_fees(&self) -> Option<Amount> {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .try_fold(0u64, |acc, tx| acc.checked_add(tx.fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            txid: TxId::ZERO,
            tx_type: TxType::Normal,
            sender: Address::new("TSRabc"),
            inputs: vec![UtxoRef::new(TxId([1; 32]), 0)],
            outputs: vec![TxOutput::new(Address::new("TSRdef"), 5 * COIN)],
            fee: 1000,
            nonce: 1,
            timestamp: 1_700_000_000,
            public_key: vec![2; 33],
            signature: vec![],
            rbf_enabled: false,
            replaces_txid: None,
            payload: vec![],
        }
        .seal()
    }

    #[test]
    fn test_txid_ignores_signature() {
        let tx = sample_tx();
        let mut signed = tx.clone();
        signed.signature = vec![9; 64];
        assert_eq!(tx.compute_txid(), signed.compute_txid());
        assert_eq!(signed.size(), tx.size() + 64);
    }

    #[test]
    fn test_txid_covers_fields() {
        let tx = sample_tx();
        let mut changed = tx.clone();
        changed.fee += 1;
        assert_ne!(tx.compute_txid(), changed.compute_txid());

        let mut changed = tx.clone();
        changed.rbf_enabled = true;
        assert_ne!(tx.compute_txid(), changed.compute_txid());

        let mut changed = tx.clone();
        changed.replaces_txid = Some(TxId([3; 32]));
        assert_ne!(tx.compute_txid(), changed.compute_txid());
    }

    #[test]
    fn test_output_total_overflow() {
        let mut tx = sample_tx();
        tx.outputs.push(TxOutput::new(Address::new("x"), u64::MAX));
        assert_eq!(tx.output_total(), None);
    }

    #[test]
    fn test_created_utxos() {
        let tx = sample_tx();
        let utxos: Vec<_> = tx.created_utxos(7).collect();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].utxo_ref(), tx.output_ref(0));
        assert_eq!(utxos[0].created_height, 7);
        assert_eq!(utxos[0].amount, 5 * COIN);
    }

    #[test]
    fn test_id_hex_roundtrip_and_json() {
        let id = TxId([0xab; 32]);
        assert_eq!(TxId::from_hex(&id.to_hex()).unwrap(), id);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
    }

    #[test]
    fn test_header_hash_changes_with_nonce() {
        let header = BlockHeader {
            version: 1,
            height: 0,
            previous_hash: BlockHash::ZERO,
            merkle_root: [0; 32],
            timestamp: 0,
            difficulty_target: 0x207fffff,
            nonce: 0,
            miner_pubkey: vec![],
        };
        let mut other = header.clone();
        other.nonce = 1;
        assert_ne!(header.hash(), other.hash());
    }
}
