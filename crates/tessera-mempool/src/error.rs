//! Error types for the mempool.

use tessera_consensus::{Amount, TxId, ValidationError};
use tessera_state::StateError;
use thiserror::Error;

/// Mempool errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MempoolError {
    /// Transaction already pooled or parked as an orphan.
    #[error("Transaction already in mempool: {0}")]
    AlreadyExists(TxId),

    /// Coinbase transactions only enter through blocks.
    #[error("Coinbase transactions are not accepted into the mempool")]
    CoinbaseNotAllowed,

    /// Transaction failed validation.
    #[error("Transaction validation failed: {0}")]
    Invalid(#[from] ValidationError),

    /// `replaces_txid` names a transaction that is not pooled.
    #[error("Replacement target not in mempool: {0}")]
    ReplacementNotFound(TxId),

    /// Replacement conflicts with more than one pooled transaction.
    #[error("Replacement conflicts with {0} pooled transactions")]
    AmbiguousReplacement(usize),

    /// Replacement does not pay enough over the original.
    #[error("Replacement fee {fee} below required {required}")]
    ReplacementFeeTooLow { fee: Amount, required: Amount },

    /// Pool is at capacity and the transaction would be the first evicted.
    #[error("Mempool full: fee rate {fee_rate:.3} does not beat lowest pooled rate {lowest:.3}")]
    PoolFull { fee_rate: f64, lowest: f64 },

    /// Reservation table rejected the inputs.
    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
