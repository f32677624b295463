//! # tessera-state
//!
//! UTXO state management for the Tessera ledger.
//!
//! This crate provides:
//! - The confirmed UTXO set with atomic block apply and revert
//! - Per-block undo records for reorganization
//! - Pending-spend reservations with TTL expiry for the mempool
//! - Copy-on-write snapshots and an order-independent state digest
//!
//! ## Architecture
//!
//! `UtxoSet` is owned by a single writer (the chain manager). Readers take a
//! `UtxoSnapshot`, which shares structure with the live set through persistent
//! maps, so publishing one after every block costs O(1).

mod error;
mod reservation;
mod snapshot;
mod utxo;

pub use error::{StateError, StateResult};
pub use reservation::{Reservation, ReservationTable};
pub use snapshot::UtxoSnapshot;
pub use utxo::{UndoData, UtxoSet};
