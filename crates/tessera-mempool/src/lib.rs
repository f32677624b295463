//! # tessera-mempool
//!
//! Transaction pool for the Tessera ledger.
//!
//! This crate provides:
//! - Fee-rate ordered storage with exact tiebreaks
//! - Input reservations held in the UTXO set while a transaction is pending
//! - Replace-by-fee with descendant eviction
//! - An orphan sub-pool for transactions whose parents have not arrived
//! - Pressure-based fee floors and capacity eviction
//! - Dependency-aware block template selection

mod error;
mod ordering;
mod orphan;
mod pool;
mod view;

pub use error::{MempoolError, MempoolResult};
pub use ordering::FeeOrdering;
pub use orphan::OrphanPool;
pub use pool::{
    Admission, Mempool, MempoolConfig, MempoolSnapshot, MempoolStats, PooledTransaction,
};
pub use view::PoolView;

/// Default maximum mempool size in bytes.
pub const DEFAULT_MAX_BYTES: usize = 32 * 1024 * 1024; // 32 MiB

/// Default maximum number of transactions.
pub const DEFAULT_MAX_TXS: usize = 50_000;

/// Default input reservation lifetime in seconds.
pub const DEFAULT_RESERVATION_TTL_SECS: u64 = 300;

/// Default minimum fee increase for replace-by-fee.
pub const DEFAULT_RBF_MIN_FEE_INCREMENT: u64 = 1_000;

/// Default maximum number of orphan transactions.
pub const DEFAULT_MAX_ORPHANS: usize = 100;

/// Default orphan lifetime in seconds.
pub const DEFAULT_ORPHAN_TTL_SECS: u64 = 600;
