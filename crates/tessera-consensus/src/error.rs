//! Error types for transaction and block validation.

use crate::types::{TxId, TxType, UtxoRef};
use thiserror::Error;

/// Outcome of a failed signature check.
///
/// Absent, forged and undecodable signatures are separate outcomes and
/// must never be folded into a boolean.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature or public key is absent.
    #[error("Missing signature or public key")]
    Missing,

    /// Well-formed signature that does not verify under the key.
    #[error("Signature verification failed")]
    Invalid,

    /// Key or signature bytes could not be decoded by the crypto backend.
    #[error("Cryptographic operation failed: {0}")]
    CryptoFailure(String),
}

/// Reasons an address string is malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Address does not start with the network prefix.
    #[error("expected prefix {expected}")]
    WrongPrefix { expected: String },

    /// Body has the wrong number of characters.
    #[error("expected {expected} hex characters, got {got}")]
    WrongLength { expected: usize, got: usize },

    /// Body is not lowercase hex.
    #[error("body is not lowercase hex")]
    NotHex,

    /// Checksum does not match the payload.
    #[error("checksum mismatch")]
    BadChecksum,
}

/// Transaction validation errors.
///
/// Variants are listed in pipeline order.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Serialized transaction exceeds the size limit.
    #[error("Transaction too large: {size} bytes, max {max} bytes")]
    TooLarge { size: usize, max: usize },

    /// Too many inputs.
    #[error("Too many inputs: {count}, max {max}")]
    TooManyInputs { count: usize, max: usize },

    /// Too many outputs.
    #[error("Too many outputs: {count}, max {max}")]
    TooManyOutputs { count: usize, max: usize },

    /// Transaction has no inputs.
    #[error("Transaction has no inputs")]
    NoInputs,

    /// Transaction has no outputs.
    #[error("Transaction has no outputs")]
    NoOutputs,

    /// Output with zero amount.
    #[error("Output {index} has zero amount")]
    ZeroOutput { index: usize },

    /// Same input referenced twice.
    #[error("Duplicate input {0}")]
    DuplicateInput(UtxoRef),

    /// Coinbase-specific structural violation.
    #[error("Malformed coinbase: {0}")]
    MalformedCoinbase(&'static str),

    /// Payload present on a transaction type that does not carry one, or too big.
    #[error("Invalid payload for {tx_type:?}: {reason}")]
    InvalidPayload { tx_type: TxType, reason: String },

    /// `replaces_txid` set without opting into replace-by-fee.
    #[error("replaces_txid set without rbf_enabled")]
    ReplacementNotEnabled,

    /// Output amounts overflow.
    #[error("Amount overflow")]
    AmountOverflow,

    /// Timestamp too far in the future.
    #[error("Transaction timestamp {timestamp} is after {limit}")]
    TimestampInFuture { timestamp: u64, limit: u64 },

    /// Fee below the absolute floor.
    #[error("Fee too low: {fee}, minimum {min}")]
    FeeBelowFloor { fee: u64, min: u64 },

    /// Malformed address.
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress {
        address: String,
        reason: AddressError,
    },

    /// Declared txid does not match contents.
    #[error("Transaction id mismatch: declared {declared}, computed {computed}")]
    TxIdMismatch { declared: TxId, computed: TxId },

    /// Public key does not hash to the declared sender.
    #[error("Public key does not match sender {sender}")]
    SenderMismatch { sender: String },

    /// Signature check failed.
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    /// Input is neither confirmed nor created by a pending transaction.
    #[error("Missing input {0}")]
    MissingInput(UtxoRef),

    /// Input has already been consumed by a confirmed transaction.
    #[error("Double spend: input {0} already spent")]
    DoubleSpend(UtxoRef),

    /// Input is reserved by another pending transaction.
    #[error("Input {utxo} already reserved by pending transaction {holder}")]
    InputReserved { utxo: UtxoRef, holder: TxId },

    /// Input belongs to someone other than the sender.
    #[error("Input {utxo} not owned by sender")]
    InputNotOwned { utxo: UtxoRef },

    /// Inputs do not equal outputs plus fee.
    #[error("Value imbalance: inputs {inputs}, outputs {outputs}, fee {fee}")]
    ValueImbalance { inputs: u64, outputs: u64, fee: u64 },

    /// Fee rate below the admission minimum.
    #[error("Fee rate {rate:.3} below minimum {min:.3}")]
    FeeRateTooLow { rate: f64, min: f64 },

    /// Nonce not above the sender's last nonce.
    #[error("Nonce {nonce} not above last nonce {last} for sender")]
    NonceTooLow { nonce: u64, last: u64 },

    /// No contract executor configured for contract or governance transactions.
    #[error("No executor available for {0:?} transactions")]
    ExecutorUnavailable(TxType),

    /// External executor reverted the transaction.
    #[error("Contract execution reverted: {0}")]
    ContractReverted(String),
}

/// Block validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    /// Header version not allowed.
    #[error("Invalid block version {0}")]
    InvalidVersion(u32),

    /// Parent does not match; the block may be an orphan.
    #[error("Unknown parent {0}")]
    UnknownParent(String),

    /// Height is not parent height + 1.
    #[error("Invalid height: got {got}, expected {expected}")]
    InvalidHeight { got: u32, expected: u32 },

    /// Timestamp not above median time past.
    #[error("Timestamp {timestamp} not above median time past {median}")]
    TimestampTooOld { timestamp: u64, median: u64 },

    /// Timestamp too far ahead of local time.
    #[error("Timestamp {timestamp} beyond allowed drift limit {limit}")]
    TimestampTooNew { timestamp: u64, limit: u64 },

    /// Merkle root mismatch.
    #[error("Merkle root mismatch: header {header}, computed {computed}")]
    MerkleMismatch { header: String, computed: String },

    /// Header hash does not meet its declared target.
    #[error("Insufficient proof of work for target {bits:#010x}")]
    InsufficientWork { bits: u32 },

    /// Declared target easier than required.
    #[error("Invalid difficulty: got {got:#010x}, required {required:#010x}")]
    InvalidDifficulty { got: u32, required: u32 },

    /// Block too large.
    #[error("Block too large: {size} bytes, max {max} bytes")]
    BlockTooLarge { size: usize, max: usize },

    /// Too many transactions.
    #[error("Too many transactions: {count}, max {max}")]
    TooManyTransactions { count: usize, max: usize },

    /// No coinbase transaction.
    #[error("Block has no coinbase transaction")]
    MissingCoinbase,

    /// More than one coinbase.
    #[error("Block has {0} coinbase transactions")]
    MultipleCoinbase(usize),

    /// Coinbase is not the first transaction.
    #[error("Coinbase must be the first transaction")]
    CoinbaseNotFirst,

    /// Coinbase claims more than reward + fees.
    #[error("Coinbase at height {height} claims {claimed}, allowed {allowed}")]
    RewardExceeded {
        height: u32,
        claimed: u64,
        allowed: u64,
    },

    /// A transaction failed validation.
    #[error("Transaction {txid} at index {index}: {source}")]
    Transaction {
        index: usize,
        txid: TxId,
        #[source]
        source: ValidationError,
    },

    /// Block signature failure.
    #[error("Block signature: {0}")]
    BlockSignature(SignatureError),
}

impl ConsensusError {
    /// Whether the error means the block's parent is simply not known yet.
    pub fn is_orphan(&self) -> bool {
        matches!(self, ConsensusError::UnknownParent(_))
    }
}

/// Result type for transaction validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
