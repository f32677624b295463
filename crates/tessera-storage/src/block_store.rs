//! Block and tip persistence on top of a [`Storage`] backend.
//!
//! Layout:
//! - `Blocks`: block hash -> JSON block
//! - `HeightIndex`: big-endian height -> block hash, main chain only
//! - `Metadata`: `tip` -> JSON [`TipRecord`]

use crate::{ColumnFamily, Storage, StorageError, StorageResult, WriteBatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_consensus::{Amount, Block, BlockHash};
use tracing::debug;

const TIP_KEY: &[u8] = b"tip";

/// Lookup key for a stored block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    /// Main chain block at this height.
    Height(u32),
    Hash(BlockHash),
}

impl From<u32> for BlockId {
    fn from(height: u32) -> Self {
        BlockId::Height(height)
    }
}

impl From<BlockHash> for BlockId {
    fn from(hash: BlockHash) -> Self {
        BlockId::Hash(hash)
    }
}

/// Persisted summary of the active tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipRecord {
    pub hash: BlockHash,
    pub height: u32,
    /// UTXO set digest after applying the tip.
    #[serde(with = "hex::serde")]
    pub utxo_digest: [u8; 32],
    pub total_issued: Amount,
}

/// Block store.
#[derive(Clone)]
pub struct BlockStore {
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore").finish_non_exhaustive()
    }
}

fn height_key(height: u32) -> [u8; 4] {
    height.to_be_bytes()
}

impl BlockStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn get_block(&self, id: impl Into<BlockId>) -> StorageResult<Option<Block>> {
        let hash = match id.into() {
            BlockId::Hash(hash) => hash,
            BlockId::Height(height) => match self.hash_at(height)? {
                Some(hash) => hash,
                None => return Ok(None),
            },
        };
        match self.storage.get(ColumnFamily::Blocks, hash.as_bytes())? {
            Some(raw) => {
                let block: Block = serde_json::from_slice(&raw)
                    .map_err(|e| StorageError::Deserialization(e.to_string()))?;
                if block.hash() != hash {
                    return Err(StorageError::Corruption(format!(
                        "block stored under {hash} hashes to {}",
                        block.hash()
                    )));
                }
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &BlockHash) -> StorageResult<bool> {
        self.storage.contains(ColumnFamily::Blocks, hash.as_bytes())
    }

    /// Main chain hash at `height`.
    pub fn hash_at(&self, height: u32) -> StorageResult<Option<BlockHash>> {
        match self.storage.get(ColumnFamily::HeightIndex, &height_key(height))? {
            Some(raw) => {
                let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
                    StorageError::Corruption(format!("height index entry {height} is {} bytes", raw.len()))
                })?;
                Ok(Some(BlockHash(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Store a block body without touching the main chain index.
    pub fn put_block(&self, block: &Block) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        Self::stage_block(&mut batch, block)?;
        self.storage.write_batch(batch)
    }

    fn stage_block(batch: &mut WriteBatch, block: &Block) -> StorageResult<()> {
        let raw = serde_json::to_vec(block).map_err(|e| StorageError::Serialization(e.to_string()))?;
        batch.put(ColumnFamily::Blocks, block.hash().as_bytes().to_vec(), raw);
        Ok(())
    }

    pub fn tip(&self) -> StorageResult<Option<TipRecord>> {
        match self.storage.get(ColumnFamily::Metadata, TIP_KEY)? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| StorageError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Atomically record a new tip.
    ///
    /// Stores the `connected` blocks, points the height index at them,
    /// drops index entries above the new tip up to `previous_height`, and
    /// writes the tip record. Returns once the backend has made the batch
    /// durable.
    pub fn commit<'a>(
        &self,
        connected: impl IntoIterator<Item = &'a Block>,
        previous_height: Option<u32>,
        tip: &TipRecord,
    ) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        let mut count = 0usize;
        for block in connected {
            count += 1;
            Self::stage_block(&mut batch, block)?;
            batch.put(
                ColumnFamily::HeightIndex,
                height_key(block.height()).to_vec(),
                block.hash().as_bytes().to_vec(),
            );
        }
        if let Some(previous) = previous_height {
            for height in tip.height.saturating_add(1)..=previous {
                batch.delete(ColumnFamily::HeightIndex, height_key(height).to_vec());
            }
        }
        let raw = serde_json::to_vec(tip).map_err(|e| StorageError::Serialization(e.to_string()))?;
        batch.put(ColumnFamily::Metadata, TIP_KEY.to_vec(), raw);

        self.storage.write_batch(batch)?;
        debug!(height = tip.height, hash = %tip.hash, connected = count, "Tip persisted");
        Ok(())
    }

    /// Main chain blocks from genesis to the recorded tip.
    pub fn main_chain(&self) -> StorageResult<Vec<Block>> {
        let Some(tip) = self.tip()? else {
            return Ok(Vec::new());
        };
        let mut blocks = Vec::with_capacity(tip.height as usize + 1);
        for height in 0..=tip.height {
            let block = self
                .get_block(height)?
                .ok_or_else(|| StorageError::Corruption(format!("main chain block {height} missing")))?;
            blocks.push(block);
        }
        if blocks.last().map(Block::hash) != Some(tip.hash) {
            return Err(StorageError::Corruption(
                "height index does not end at the recorded tip".to_string(),
            ));
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use tessera_consensus::{
        coinbase_transaction, genesis_block, Address, BlockBuilder, ChainParams, COIN,
    };

    fn chain(len: u32) -> Vec<Block> {
        let miner = Address::new("tTSRminer");
        let mut blocks = vec![genesis_block(&ChainParams::regtest(), miner.clone(), 1_000)];
        for h in 1..len {
            let parent = &blocks[h as usize - 1];
            let ts = parent.header.timestamp + 120;
            let block = BlockBuilder::on_top_of(&parent.header)
                .timestamp(ts)
                .transaction(coinbase_transaction(h, miner.clone(), 12 * COIN, ts))
                .build();
            blocks.push(block);
        }
        blocks
    }

    fn record(block: &Block) -> TipRecord {
        TipRecord {
            hash: block.hash(),
            height: block.height(),
            utxo_digest: [7; 32],
            total_issued: 0,
        }
    }

    fn store() -> (BlockStore, MemoryStorage) {
        let backend = MemoryStorage::new();
        (BlockStore::new(Arc::new(backend.clone())), backend)
    }

    #[test]
    fn test_get_block_by_height_and_hash() {
        let (store, _) = store();
        let blocks = chain(3);
        store.commit(&blocks, None, &record(&blocks[2])).unwrap();

        assert_eq!(store.get_block(1u32).unwrap().as_ref(), Some(&blocks[1]));
        assert_eq!(store.get_block(blocks[2].hash()).unwrap().as_ref(), Some(&blocks[2]));
        assert_eq!(store.get_block(3u32).unwrap(), None);
        assert_eq!(store.tip().unwrap(), Some(record(&blocks[2])));
        assert_eq!(store.main_chain().unwrap(), blocks);
    }

    #[test]
    fn test_put_block_does_not_index() {
        let (store, _) = store();
        let blocks = chain(1);
        store.put_block(&blocks[0]).unwrap();
        assert!(store.has_block(&blocks[0].hash()).unwrap());
        assert_eq!(store.get_block(0u32).unwrap(), None);
        assert!(store.main_chain().unwrap().is_empty());
    }

    #[test]
    fn test_commit_rewinds_height_index() {
        let (store, _) = store();
        let blocks = chain(4);
        store.commit(&blocks, None, &record(&blocks[3])).unwrap();

        store.commit(&blocks[..0], Some(3), &record(&blocks[1])).unwrap();
        assert_eq!(store.hash_at(2).unwrap(), None);
        assert_eq!(store.hash_at(3).unwrap(), None);
        assert_eq!(store.main_chain().unwrap(), blocks[..2].to_vec());
        // Bodies stay available by hash.
        assert!(store.get_block(blocks[3].hash()).unwrap().is_some());
    }

    #[test]
    fn test_committed_tip_survives_restart_without_flush() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        let blocks = chain(3);
        {
            let store = BlockStore::new(Arc::new(MemoryStorage::open(&path).unwrap()));
            store.commit(&blocks, None, &record(&blocks[2])).unwrap();
        }

        let store = BlockStore::new(Arc::new(MemoryStorage::open(&path).unwrap()));
        assert_eq!(store.tip().unwrap(), Some(record(&blocks[2])));
        assert_eq!(store.main_chain().unwrap(), blocks);
    }

    #[test]
    fn test_failed_commit_is_atomic() {
        let (store, backend) = store();
        let blocks = chain(2);
        backend.fail_next_writes(1);
        assert!(store.commit(&blocks, None, &record(&blocks[1])).is_err());
        assert_eq!(store.tip().unwrap(), None);
        assert!(!store.has_block(&blocks[0].hash()).unwrap());
    }

    #[test]
    fn test_detects_corrupt_body() {
        let (store, backend) = store();
        let blocks = chain(2);
        store.commit(&blocks, None, &record(&blocks[1])).unwrap();
        let other = serde_json::to_vec(&blocks[0]).unwrap();
        backend
            .put(ColumnFamily::Blocks, blocks[1].hash().as_bytes(), &other)
            .unwrap();
        assert!(matches!(
            store.get_block(1u32),
            Err(StorageError::Corruption(_))
        ));
    }
}
