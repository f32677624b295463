//! Node assembly: storage, chain actor and background tasks.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tessera_chain::{
    ChainActor, ChainError, ChainEvent, ChainHandle, ChainManager, Clock, SystemClock,
};
use tessera_consensus::{Address, BlockValidator, TransactionValidator};
use tessera_mempool::Mempool;
use tessera_storage::{BlockStore, MemoryStorage};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Running node.
pub struct Node {
    storage: MemoryStorage,
    handle: ChainHandle,
    actor: JoinHandle<ChainManager>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Open storage, recover the chain and start background tasks.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).context("Failed to create data directory")?;

        let store_path = config.store_path();
        info!("Opening block store at {:?}", store_path);
        let storage = MemoryStorage::open(&store_path).context("Failed to open block store")?;
        let store = BlockStore::new(Arc::new(storage.clone()));

        let params = config.params();
        let tx_validator =
            TransactionValidator::new(config.validation.clone(), params.address_prefix.clone());
        let mempool = Mempool::new(config.mempool.clone(), tx_validator.clone());
        let validator = BlockValidator::new(params, tx_validator);
        let genesis = config.genesis_block()?;
        info!(hash = %genesis.hash(), "Genesis block");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let manager = ChainManager::recover(
            config.chain.clone(),
            validator,
            mempool,
            genesis,
            store,
            clock.now(),
        )
        .context("Failed to recover chain state")?;
        storage.flush().context("Failed to flush block store")?;

        let tip = manager.tip();
        info!(height = tip.height, hash = %tip.hash, "Chain ready");

        let (handle, actor) = ChainActor::spawn(manager, clock);
        let mut tasks = vec![
            spawn_sweeper(
                handle.clone(),
                storage.clone(),
                Duration::from_secs(config.sweep_interval_secs.max(1)),
            ),
            spawn_event_logger(handle.subscribe()),
        ];
        if let Some(address) = config.mining_address()? {
            info!(%address, "Built-in miner enabled");
            tasks.push(spawn_miner(
                handle.clone(),
                address,
                Duration::from_secs(config.mining.interval_secs.max(1)),
            ));
        }

        Ok(Self {
            storage,
            handle,
            actor,
            tasks,
        })
    }

    pub fn handle(&self) -> &ChainHandle {
        &self.handle
    }

    /// Stop background tasks, wait for the actor to drain and flush storage.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down node...");
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }

        drop(self.handle);
        let manager = self.actor.await.context("Chain actor panicked")?;
        if let Some(reason) = manager.halt_reason() {
            warn!(%reason, "Chain was halted");
        }

        self.storage.flush().context("Failed to flush block store")?;
        info!(height = manager.height(), "Node shutdown complete");
        Ok(())
    }
}

/// Periodic reservation and orphan expiry, followed by a store flush that
/// folds the write-ahead log into the dump.
fn spawn_sweeper(handle: ChainHandle, storage: MemoryStorage, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;
        loop {
            interval.tick().await;
            match handle.evict_expired().await {
                Ok(evicted) if !evicted.is_empty() => {
                    info!(evicted = evicted.len(), "Expired pending transactions");
                }
                Ok(_) => {}
                Err(ChainError::ActorUnavailable) => break,
                Err(e) => warn!("Expiry sweep failed: {}", e),
            }
            if let Err(e) = storage.flush() {
                warn!("Error flushing block store: {}", e);
            }

            let snapshot = handle.snapshot();
            debug!(
                height = snapshot.tip.height,
                finalized = snapshot.finalized_height,
                mempool_txs = snapshot.mempool.stats.tx_count,
                "Node status"
            );
        }
    })
}

fn spawn_event_logger(mut events: broadcast::Receiver<ChainEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ChainEvent::Reorganized(event)) => info!(
                    fork_height = event.fork_height,
                    depth = event.depth,
                    new_tip = %event.new_tip,
                    rebroadcast = event.rebroadcast.len(),
                    "Chain reorganized"
                ),
                Ok(ChainEvent::Halted { reason }) => warn!(%reason, "Chain halted"),
                Ok(ChainEvent::BlockConnected { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "Event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_miner(handle: ChainHandle, address: Address, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let block = match handle.build_candidate(address.clone(), None).await {
                Ok(block) => block,
                Err(ChainError::ActorUnavailable) => break,
                Err(e) => {
                    warn!("Failed to build candidate: {}", e);
                    continue;
                }
            };
            let height = block.height();
            let hash = block.hash();
            if handle.submit_block(block, None).await.is_accepted() {
                info!(height, %hash, "Mined block");
            }
        }
    })
}
