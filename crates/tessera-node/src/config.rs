//! Node configuration.

use crate::Args;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tessera_chain::ChainConfig;
use tessera_consensus::{
    derive_address, genesis_block, validate_address, Address, Block, ChainParams,
    ValidationConfig,
};
use tessera_mempool::MempoolConfig;

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name.
    pub node_name: String,
    /// Network (mainnet, testnet, regtest).
    pub network: String,
    /// Data directory.
    pub data_dir: PathBuf,
    /// Seconds between reservation and orphan expiry sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub genesis: GenesisConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub mempool: MempoolConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub mining: MiningConfig,
}

fn default_sweep_interval() -> u64 {
    30
}

/// Genesis block parameters. Every node on a network must agree on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Unix timestamp of the genesis block.
    pub timestamp: u64,
    /// Recipient of the genesis reward. Defaults to an unspendable address.
    pub reward_address: Option<String>,
    /// Compact target; defaults to the network's genesis target.
    pub bits: Option<u32>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            timestamp: 1_700_000_000,
            reward_address: None,
            bits: None,
        }
    }
}

/// Built-in CPU miner, for regtest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub enabled: bool,
    pub reward_address: Option<String>,
    /// Seconds between mined blocks.
    pub interval_secs: u64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reward_address: None,
            interval_secs: 10,
        }
    }
}

impl NodeConfig {
    /// Load configuration from file and CLI args.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default_for_network(&args.network)
        };

        if let Some(ref data_dir) = args.data_dir {
            config.data_dir = data_dir.clone();
        }
        config.network = args.network.clone();
        if args.mine {
            config.mining.enabled = true;
        }
        if let Some(ref addr) = args.mining_address {
            config.mining.reward_address = Some(addr.clone());
        }

        Ok(config)
    }

    /// Create default config for a network.
    pub fn default_for_network(network: &str) -> Self {
        let data_dir = match network {
            "mainnet" => PathBuf::from(".tessera"),
            other => PathBuf::from(format!(".tessera-{other}")),
        };

        Self {
            node_name: "tessera-node".to_string(),
            network: network.to_string(),
            data_dir,
            sweep_interval_secs: default_sweep_interval(),
            genesis: GenesisConfig::default(),
            chain: ChainConfig::default(),
            mempool: MempoolConfig::default(),
            validation: ValidationConfig::default(),
            mining: MiningConfig::default(),
        }
    }

    pub fn params(&self) -> ChainParams {
        ChainParams::for_network(&self.network)
    }

    /// File backing the block store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    /// Build the genesis block. Proof of work is searched from nonce zero,
    /// so every node derives the same block.
    pub fn genesis_block(&self) -> Result<Block> {
        let mut params = self.params();
        if let Some(bits) = self.genesis.bits {
            params.genesis_bits = bits;
        }
        let reward_address = match &self.genesis.reward_address {
            Some(raw) => parse_address(raw, &params.address_prefix)
                .context("Invalid genesis reward address")?,
            None => derive_address(&[0u8; 33], &params.address_prefix),
        };
        Ok(genesis_block(&params, reward_address, self.genesis.timestamp))
    }

    /// Validated mining reward address, when mining is enabled.
    pub fn mining_address(&self) -> Result<Option<Address>> {
        if !self.mining.enabled {
            return Ok(None);
        }
        let Some(raw) = &self.mining.reward_address else {
            bail!("Mining enabled without a reward address");
        };
        let address = parse_address(raw, &self.params().address_prefix)
            .context("Invalid mining reward address")?;
        Ok(Some(address))
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn parse_address(raw: &str, prefix: &str) -> Result<Address> {
    let address = Address::new(raw);
    validate_address(&address, prefix).with_context(|| format!("{raw} is not a {prefix} address"))?;
    Ok(address)
}
