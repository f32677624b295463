//! # tessera-tests
//!
//! Integration tests for the Tessera ledger.
//!
//! This crate provides:
//! - Generators for deterministic keys, signed transfers and mined blocks
//! - A chain harness driven by a simulated clock
//! - Property-based tests for conservation, supply, fee ordering and reorgs
//! - End-to-end consensus scenarios

pub mod generators;
pub mod harness;


#[cfg(test)]
mod scenario_tests;


pub use generators::*;
pub use harness::*;
