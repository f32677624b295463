//! # tessera-chain
//!
//! Chain and fork management for the Tessera ledger.
//!
//! This crate provides:
//! - A block index with cumulative work and validation status
//! - Most-work fork choice with atomic reorganization and rollback
//! - Checkpoints and a finalized height below which no fork is accepted
//! - A bounded orphan block buffer
//! - Crash-consistent persistence through [`tessera_storage::BlockStore`]
//! - A single-writer actor with snapshot reads and an event stream
//!
//! ## Error dispositions
//!
//! Every [`ChainError`] maps to a [`Disposition`]. Storage failures and
//! ledger inconsistencies halt the chain; once halted, every mutation
//! returns [`ChainError::Halted`].

mod actor;
mod clock;
mod config;
mod error;
mod events;
mod index;
mod manager;
mod orphan;

pub use actor::{ChainActor, ChainHandle, SubmitResponse};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChainConfig, Checkpoint};
pub use error::{ChainError, ChainResult, Disposition};
pub use events::{ChainEvent, ReorgEvent};
pub use index::{BlockIndex, BlockStatus, IndexEntry};
pub use manager::{BlockOutcome, ChainManager, ChainTip, LedgerSnapshot};
pub use orphan::OrphanBlocks;
