//! Single-writer actor around [`ChainManager`].
//!
//! Mutations are sent as commands over a bounded mailbox and applied one at
//! a time on a dedicated blocking thread. After each command the actor
//! publishes a fresh [`LedgerSnapshot`] and forwards chain events, so reads
//! through a [`ChainHandle`] never wait on the writer.

use crate::clock::Clock;
use crate::error::{ChainError, ChainResult, Disposition};
use crate::events::ChainEvent;
use crate::manager::{BlockOutcome, ChainManager, ChainTip, LedgerSnapshot};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tessera_consensus::{Address, Amount, Block, SigningKey, Transaction, TxId, Utxo};
use tessera_mempool::{Admission, MempoolSnapshot};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 1024;
const EVENT_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<ChainResult<T>>;

enum Command {
    SubmitBlock {
        block: Block,
        reply: Reply<BlockOutcome>,
    },
    SubmitTransaction {
        tx: Transaction,
        reply: Reply<Admission>,
    },
    SetFinalizedHeight {
        height: u32,
        reply: Reply<()>,
    },
    EvictExpired {
        reply: Reply<Vec<TxId>>,
    },
    BuildCandidate {
        reward_address: Address,
        miner: Option<SigningKey>,
        reply: Reply<Block>,
    },
}

/// Answer returned to the network layer for a submitted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitResponse {
    /// Accepted. After a reorganization `rebroadcast` lists abandoned
    /// transactions returned to the pool.
    Accepted { rebroadcast: Vec<TxId> },
    Rejected { reason: String, penalize: bool },
}

impl SubmitResponse {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitResponse::Accepted { .. })
    }
}

/// Owner of the chain manager.
pub struct ChainActor {
    manager: ChainManager,
    clock: Arc<dyn Clock>,
    commands: mpsc::Receiver<Command>,
    snapshot: Arc<RwLock<Arc<LedgerSnapshot>>>,
    events: broadcast::Sender<ChainEvent>,
}

impl ChainActor {
    /// Start the actor. The returned task yields the manager back once every
    /// handle has been dropped.
    pub fn spawn(manager: ChainManager, clock: Arc<dyn Clock>) -> (ChainHandle, JoinHandle<ChainManager>) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let snapshot = Arc::new(RwLock::new(Arc::new(manager.snapshot())));

        let handle = ChainHandle {
            commands: command_tx,
            snapshot: Arc::clone(&snapshot),
            events: events.clone(),
        };
        let actor = ChainActor {
            manager,
            clock,
            commands,
            snapshot,
            events,
        };
        let task = tokio::task::spawn_blocking(move || actor.run());
        (handle, task)
    }

    fn run(mut self) -> ChainManager {
        info!(height = self.manager.height(), "Chain actor started");
        while let Some(command) = self.commands.blocking_recv() {
            self.dispatch(command);
            self.publish();
        }
        info!(height = self.manager.height(), "Chain actor stopped");
        self.manager
    }

    fn dispatch(&mut self, command: Command) {
        let now = self.clock.now();
        // A dropped reply receiver means the caller gave up; the mutation
        // still stands.
        match command {
            Command::SubmitBlock { block, reply } => {
                let _ = reply.send(self.manager.receive_block(block, now));
            }
            Command::SubmitTransaction { tx, reply } => {
                let _ = reply.send(self.manager.submit_transaction(tx, now));
            }
            Command::SetFinalizedHeight { height, reply } => {
                let _ = reply.send(self.manager.set_finalized_height(height));
            }
            Command::EvictExpired { reply } => {
                let _ = reply.send(self.manager.evict_expired(now));
            }
            Command::BuildCandidate {
                reward_address,
                miner,
                reply,
            } => {
                let _ = reply.send(self.manager.build_candidate(reward_address, now, miner));
            }
        }
    }

    fn publish(&mut self) {
        *self.snapshot.write() = Arc::new(self.manager.snapshot());
        for event in self.manager.take_events() {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}

/// Cloneable client of the chain actor.
#[derive(Clone)]
pub struct ChainHandle {
    commands: mpsc::Sender<Command>,
    snapshot: Arc<RwLock<Arc<LedgerSnapshot>>>,
    events: broadcast::Sender<ChainEvent>,
}

impl ChainHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> ChainResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ChainError::ActorUnavailable)?;
        response.await.map_err(|_| ChainError::ActorUnavailable)?
    }

    /// Hand a block to the chain manager.
    pub async fn process_block(&self, block: Block) -> ChainResult<BlockOutcome> {
        self.request(|reply| Command::SubmitBlock { block, reply }).await
    }

    /// Hand a transaction to the mempool.
    pub async fn process_transaction(&self, tx: Transaction) -> ChainResult<Admission> {
        self.request(|reply| Command::SubmitTransaction { tx, reply })
            .await
    }

    /// Submit a block received from `peer`.
    pub async fn submit_block(&self, block: Block, peer: Option<&str>) -> SubmitResponse {
        let hash = block.hash();
        let height = block.height();
        match self.process_block(block).await {
            Ok(BlockOutcome::Reorganized(event)) => SubmitResponse::Accepted {
                rebroadcast: event.rebroadcast,
            },
            Ok(outcome) => {
                debug!(%hash, height, ?outcome, "Block accepted");
                SubmitResponse::Accepted {
                    rebroadcast: Vec::new(),
                }
            }
            Err(err) => {
                let disposition = err.disposition();
                warn!(%hash, height, peer, %err, ?disposition, "Block rejected");
                rejected(err, disposition)
            }
        }
    }

    /// Submit a transaction received from `peer`.
    pub async fn submit_transaction(&self, tx: Transaction, peer: Option<&str>) -> SubmitResponse {
        let txid = tx.txid;
        let sender = tx.sender.clone();
        match self.process_transaction(tx).await {
            Ok(admission) => {
                debug!(%txid, ?admission, "Transaction accepted");
                SubmitResponse::Accepted {
                    rebroadcast: Vec::new(),
                }
            }
            Err(err) => {
                let disposition = err.disposition();
                warn!(%txid, %sender, peer, %err, "Transaction rejected");
                rejected(err, disposition)
            }
        }
    }

    pub async fn set_finalized_height(&self, height: u32) -> ChainResult<()> {
        self.request(|reply| Command::SetFinalizedHeight { height, reply })
            .await
    }

    /// Run the expiry sweep. Returns evicted transactions.
    pub async fn evict_expired(&self) -> ChainResult<Vec<TxId>> {
        self.request(|reply| Command::EvictExpired { reply }).await
    }

    /// Mine a block on the current tip at the actor's clock time.
    pub async fn build_candidate(
        &self,
        reward_address: Address,
        miner: Option<SigningKey>,
    ) -> ChainResult<Block> {
        self.request(|reply| Command::BuildCandidate {
            reward_address,
            miner,
            reply,
        })
        .await
    }

    /// Most recently published ledger state.
    pub fn snapshot(&self) -> Arc<LedgerSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn get_balance(&self, address: &Address) -> Amount {
        self.snapshot().balance(address)
    }

    pub fn get_utxos(&self, address: &Address) -> Vec<Utxo> {
        self.snapshot().utxos_of(address)
    }

    pub fn current_tip(&self) -> ChainTip {
        self.snapshot().tip.clone()
    }

    pub fn mempool_snapshot(&self) -> MempoolSnapshot {
        self.snapshot().mempool.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }
}

fn rejected(err: ChainError, disposition: Disposition) -> SubmitResponse {
    SubmitResponse::Rejected {
        reason: err.to_string(),
        penalize: disposition == Disposition::RejectAndPenalize,
    }
}
