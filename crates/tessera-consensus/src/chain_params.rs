//! Network consensus parameters.
//!
//! Static per network; loaded once from configuration.
//! - `ChainParams::default()` / `ChainParams::mainnet()`
//! - `ChainParams::testnet()`
//! - `ChainParams::regtest()` for local development and tests (trivial PoW,
//!   short halving interval)

use crate::types::{Amount, COIN};
use serde::{Deserialize, Serialize};

/// Maximum allowed distance of a block timestamp ahead of local time.
pub const MAX_FUTURE_DRIFT_SECS: u64 = 7200;

/// Number of ancestors used for median-time-past.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Easiest compact target: roughly every other hash qualifies.
pub const REGTEST_POW_LIMIT_BITS: u32 = 0x207f_ffff;

/// Consensus parameters for one network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    /// Network name.
    pub network: String,
    /// Address prefix for this network.
    pub address_prefix: String,
    /// Reward at height 0.
    pub initial_reward: Amount,
    /// Blocks between reward halvings.
    pub halving_interval: u32,
    /// Hard cap on total issuance.
    pub max_supply: Amount,
    /// Rewards below this are paid as zero.
    pub min_reward: Amount,
    /// Allowed excess of the coinbase over reward + fees.
    pub coinbase_tolerance: Amount,
    /// Target seconds between blocks.
    pub target_block_time_secs: u64,
    /// Blocks between difficulty retargets.
    pub difficulty_interval: u32,
    /// Retarget clamp: the timespan is kept within `[expected / f, expected * f]`.
    pub max_adjustment_factor: u64,
    /// Easiest allowed target (compact form).
    pub pow_limit_bits: u32,
    /// Target of the genesis block.
    pub genesis_bits: u32,
    /// Accepted header versions.
    pub allowed_versions: Vec<u32>,
    /// Block timestamp drift limit.
    pub max_future_drift_secs: u64,
    /// Median-time-past window.
    pub median_time_span: usize,
    /// Maximum serialized block size.
    pub max_block_bytes: usize,
    /// Maximum transactions per block.
    pub max_block_txs: usize,
    /// Reject blocks without a miner signature.
    pub require_block_signature: bool,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ChainParams {
    pub fn mainnet() -> Self {
        Self {
            network: "mainnet".to_string(),
            address_prefix: "TSR".to_string(),
            initial_reward: 12 * COIN,
            halving_interval: 262_800,
            max_supply: 121_000_000 * COIN,
            min_reward: 1,
            coinbase_tolerance: 0,
            target_block_time_secs: 120,
            difficulty_interval: 144,
            max_adjustment_factor: 4,
            pow_limit_bits: 0x1f00_ffff,
            genesis_bits: 0x1f00_ffff,
            allowed_versions: vec![1],
            max_future_drift_secs: MAX_FUTURE_DRIFT_SECS,
            median_time_span: MEDIAN_TIME_SPAN,
            max_block_bytes: 2 * 1024 * 1024,
            max_block_txs: 10_000,
            require_block_signature: true,
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: "testnet".to_string(),
            address_prefix: "tTSR".to_string(),
            pow_limit_bits: REGTEST_POW_LIMIT_BITS,
            genesis_bits: 0x1f7f_ffff,
            require_block_signature: false,
            ..Self::mainnet()
        }
    }

    pub fn regtest() -> Self {
        Self {
            network: "regtest".to_string(),
            address_prefix: "tTSR".to_string(),
            halving_interval: 150,
            difficulty_interval: 2016,
            pow_limit_bits: REGTEST_POW_LIMIT_BITS,
            genesis_bits: REGTEST_POW_LIMIT_BITS,
            require_block_signature: false,
            ..Self::mainnet()
        }
    }

    /// Parameters for a network name, falling back to mainnet.
    pub fn for_network(network: &str) -> Self {
        match network {
            "testnet" => Self::testnet(),
            "regtest" => Self::regtest(),
            _ => Self::mainnet(),
        }
    }
}
