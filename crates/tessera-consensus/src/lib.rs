//! # tessera-consensus
//!
//! Consensus rules and data model for the Tessera ledger.
//!
//! This crate provides:
//! - Transaction, block and UTXO types with their canonical encodings
//! - Address derivation and checksum validation
//! - Emission schedule and coinbase reward limits
//! - Compact-target proof of work and difficulty retargeting
//! - The transaction validation pipeline
//! - Block validation over a read-only [`LedgerView`]
//!
//! ## Emission
//!
//! The block reward starts at 12 coins and halves every `halving_interval`
//! blocks, floored at `min_reward`. Cumulative issuance never exceeds
//! `max_supply`; the block that would cross it is truncated.
//!
//! ## Difficulty
//!
//! Every `difficulty_interval` blocks the target is rescaled by the observed
//! window timespan over the expected one, clamped to `max_adjustment_factor`
//! in either direction and capped at the proof-of-work limit.

mod address;
pub mod block_validation;
pub mod builder;
mod chain_params;
mod codec;
pub mod crypto;
mod difficulty;
mod emission;
mod error;
mod ledger_view;
mod merkle;
pub mod tx_validation;
mod types;

pub use address::{derive_address, validate_address, CHECKSUM_LEN, PAYLOAD_LEN};
pub use block_validation::{BlockOverlay, BlockSummary, BlockValidator, ChainContext};
pub use builder::{
    coinbase_transaction, genesis_block, sign_transaction, solve, BlockBuilder, TransactionBuilder,
};
pub use chain_params::{ChainParams, MAX_FUTURE_DRIFT_SECS, MEDIAN_TIME_SPAN, REGTEST_POW_LIMIT_BITS};
pub use codec::ByteWriter;
pub use crypto::{public_key_bytes, sha256, sha256d, SigningKey};
pub use difficulty::{
    check_proof_of_work, meets_required, median_time_past, nbits_to_target, target_to_nbits,
    work_for_bits, DifficultyAdjustment,
};
pub use emission::{coinbase_reward, cumulative_issuance, scheduled_reward};
pub use error::{
    AddressError, ConsensusError, ConsensusResult, SignatureError, ValidationError,
    ValidationResult,
};
pub use ledger_view::{ContractExecutor, ExecutionOutcome, LedgerView};
pub use merkle::merkle_root;
pub use tx_validation::{
    NoncePolicy, TransactionValidator, ValidatedTx, ValidationConfig, ValidationContext,
};
pub use types::{
    Address, Amount, Block, BlockHash, BlockHeader, Transaction, TxId, TxOutput, TxType, Utxo,
    UtxoRef, COIN,
};
