//! Chain manager configuration.

use serde::{Deserialize, Serialize};
use tessera_consensus::BlockHash;

/// Pinned block hash at a height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: BlockHash,
}

/// Chain manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Maximum blocks buffered while their parent is unknown.
    pub max_orphan_blocks: usize,
    /// Orphan blocks older than this are dropped by the expiry sweep.
    pub orphan_block_ttl_secs: u64,
    /// Persistence attempts before halting.
    pub storage_retry_attempts: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub storage_retry_backoff_ms: u64,
    pub checkpoints: Vec<Checkpoint>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_orphan_blocks: 256,
            orphan_block_ttl_secs: 3600,
            storage_retry_attempts: 3,
            storage_retry_backoff_ms: 50,
            checkpoints: Vec::new(),
        }
    }
}

impl ChainConfig {
    /// Checkpointed hash at `height`, if any.
    pub fn checkpoint_at(&self, height: u32) -> Option<BlockHash> {
        self.checkpoints
            .iter()
            .find(|c| c.height == height)
            .map(|c| c.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoints_from_toml() {
        let hash = BlockHash([0xab; 32]);
        let raw = format!(
            "max_orphan_blocks = 8\n\n[[checkpoints]]\nheight = 10\nhash = \"{}\"\n",
            hash.to_hex()
        );
        let config: ChainConfig = toml::from_str(&raw).unwrap();
        assert_eq!(config.max_orphan_blocks, 8);
        assert_eq!(config.storage_retry_attempts, 3);
        assert_eq!(config.checkpoint_at(10), Some(hash));
        assert_eq!(config.checkpoint_at(11), None);
    }
}
