//! Chain events for external observers.

use serde::Serialize;
use tessera_consensus::{BlockHash, TxId};

/// Details of a completed reorganization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReorgEvent {
    /// Height of the common ancestor.
    pub fork_height: u32,
    /// Blocks disconnected from the old branch.
    pub depth: u32,
    /// Blocks connected from the new branch.
    pub connected: u32,
    pub old_tip: BlockHash,
    pub new_tip: BlockHash,
    /// Abandoned transactions re-admitted to the mempool that peers should
    /// hear about again.
    pub rebroadcast: Vec<TxId>,
}

/// Event published by the chain manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    /// A block extended the active chain.
    BlockConnected { hash: BlockHash, height: u32 },
    /// The active chain switched branches.
    Reorganized(ReorgEvent),
    /// A fatal error stopped further mutation.
    Halted { reason: String },
}
