//! Error types for the chain manager.

use tessera_consensus::{BlockHash, ConsensusError};
use tessera_mempool::MempoolError;
use tessera_storage::StorageError;
use thiserror::Error;

/// What the caller should do with a failed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Drop the item; the sender did nothing provably wrong.
    Reject,
    /// Drop the item and report the sending peer as suspect.
    RejectAndPenalize,
    /// Authoritative state can no longer be trusted; stop mutating.
    Halt,
}

/// Chain manager errors.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Block failed consensus validation.
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// Transaction refused by the mempool.
    #[error("Mempool error: {0}")]
    Mempool(#[from] MempoolError),

    /// Block was previously found invalid, or descends from one that was.
    #[error("Block {0} is known to be invalid")]
    KnownInvalid(BlockHash),

    /// Block contradicts a configured checkpoint.
    #[error("Checkpoint mismatch at height {height}: expected {expected}, got {got}")]
    CheckpointMismatch {
        height: u32,
        expected: BlockHash,
        got: BlockHash,
    },

    /// Competing block or reorganization at or below the finalized height.
    #[error("Block at height {height} forks below finalized height {finalized}")]
    BelowFinality { height: u32, finalized: u32 },

    /// Requested finalized height outside `[finalized, tip]`.
    #[error("Cannot finalize height {requested}: finalized {finalized}, tip {tip}")]
    InvalidFinality {
        requested: u32,
        finalized: u32,
        tip: u32,
    },

    /// Persisting committed state failed after all retries.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// In-memory state disagrees with itself or with persisted state.
    #[error("Ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    /// Chain halted by an earlier fatal error.
    #[error("Chain halted: {0}")]
    Halted(String),

    /// The chain actor has stopped.
    #[error("Chain actor unavailable")]
    ActorUnavailable,
}

impl ChainError {
    pub fn disposition(&self) -> Disposition {
        match self {
            // Clock skew on either side is not proof of misbehaviour.
            ChainError::Consensus(ConsensusError::TimestampTooNew { .. }) => Disposition::Reject,
            ChainError::Consensus(_)
            | ChainError::KnownInvalid(_)
            | ChainError::CheckpointMismatch { .. } => Disposition::RejectAndPenalize,
            ChainError::Mempool(_)
            | ChainError::BelowFinality { .. }
            | ChainError::InvalidFinality { .. }
            | ChainError::ActorUnavailable => Disposition::Reject,
            ChainError::Storage(_) | ChainError::LedgerInconsistency(_) | ChainError::Halted(_) => {
                Disposition::Halt
            }
        }
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
