//! Error types for the UTXO set.

use tessera_consensus::{BlockHash, TxId, UtxoRef};
use thiserror::Error;

/// UTXO set errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Output is not in the confirmed set.
    #[error("UTXO not found: {0}")]
    UtxoNotFound(UtxoRef),

    /// Output key already exists.
    #[error("Duplicate UTXO: {0}")]
    DuplicateUtxo(UtxoRef),

    /// Output is soft-locked by another pending transaction.
    #[error("UTXO {utxo} already reserved by {holder}")]
    ReservationConflict { utxo: UtxoRef, holder: TxId },

    /// Block was already applied.
    #[error("Block {0} already applied")]
    AlreadyApplied(BlockHash),

    /// Block does not build on the current state.
    #[error("Block parent {got} does not match state tip {expected}")]
    ParentMismatch { expected: BlockHash, got: BlockHash },

    /// Only the most recently applied block can be reverted.
    #[error("Block {0} is not the most recently applied block")]
    NotTip(BlockHash),

    /// Undo data was pruned.
    #[error("No undo data for block {0}")]
    MissingUndo(BlockHash),

    /// Issuance accounting overflowed or went negative.
    #[error("Issuance accounting overflow at height {0}")]
    SupplyOverflow(u32),
}

/// Result type for UTXO set operations.
pub type StateResult<T> = Result<T, StateError>;
