//! # tessera-storage
//!
//! Storage collaborator for the Tessera ledger.
//!
//! This crate provides:
//! - The [`Storage`] key-value abstraction with atomic batch writes
//! - An in-memory backend with optional file persistence
//! - A [`BlockStore`] holding block bodies, the main chain index and the
//!   persisted tip record used for startup reconciliation
//!
//! ## Column Families
//!
//! - `Blocks`: block bodies indexed by block hash
//! - `HeightIndex`: main chain hashes indexed by height
//! - `Metadata`: tip record

mod batch;
mod block_store;
mod error;
mod memory;

pub use batch::{BatchOperation, OperationKind, WriteBatch};
pub use block_store::{BlockId, BlockStore, TipRecord};
pub use error::{StorageError, StorageResult};
pub use memory::{ColumnFamily, MemoryStorage};

/// Storage trait for abstracting database operations.
pub trait Storage: Send + Sync {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()>;

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()>;

    fn contains(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// Execute a batch of writes atomically.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Iterate a column family in key order.
    fn iter(&self, cf: ColumnFamily) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>>;
}
