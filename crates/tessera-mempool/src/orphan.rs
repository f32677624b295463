//! Orphan transaction sub-pool.
//!
//! Holds transactions whose inputs are not yet visible, keyed by the first
//! missing input. Bounded in count; the oldest entry is dropped to make room.

use std::collections::{BTreeSet, HashMap};
use tessera_consensus::{Transaction, TxId, UtxoRef};
use tracing::debug;

#[derive(Debug, Clone)]
struct OrphanEntry {
    tx: Transaction,
    missing: UtxoRef,
    received_at: u64,
}

/// Bounded, TTL'd set of orphan transactions.
#[derive(Debug, Clone)]
pub struct OrphanPool {
    max_orphans: usize,
    ttl_secs: u64,
    entries: HashMap<TxId, OrphanEntry>,
    by_missing: HashMap<UtxoRef, BTreeSet<TxId>>,
}

impl OrphanPool {
    pub fn new(max_orphans: usize, ttl_secs: u64) -> Self {
        Self {
            max_orphans,
            ttl_secs,
            entries: HashMap::new(),
            by_missing: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.entries.contains_key(txid)
    }

    /// Park `tx` until `missing` appears. Returns the orphan dropped to make
    /// room, if any.
    pub fn insert(&mut self, tx: Transaction, missing: UtxoRef, now: u64) -> Option<TxId> {
        if self.max_orphans == 0 {
            return Some(tx.txid);
        }
        let mut dropped = None;
        if self.entries.len() >= self.max_orphans && !self.entries.contains_key(&tx.txid) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(id, e)| (e.received_at, **id))
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                self.remove(&id);
                debug!(txid = %id, "Dropped oldest orphan transaction");
                dropped = Some(id);
            }
        }
        let txid = tx.txid;
        self.remove(&txid);
        self.by_missing.entry(missing).or_default().insert(txid);
        self.entries.insert(
            txid,
            OrphanEntry {
                tx,
                missing,
                received_at: now,
            },
        );
        dropped
    }

    pub fn remove(&mut self, txid: &TxId) -> Option<Transaction> {
        let entry = self.entries.remove(txid)?;
        if let Some(waiting) = self.by_missing.get_mut(&entry.missing) {
            waiting.remove(txid);
            if waiting.is_empty() {
                self.by_missing.remove(&entry.missing);
            }
        }
        Some(entry.tx)
    }

    /// Remove and return the orphans waiting on `utxo_ref`.
    pub fn take_waiting_on(&mut self, utxo_ref: &UtxoRef) -> Vec<Transaction> {
        let ids = self.by_missing.remove(utxo_ref).unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|e| e.tx))
            .collect()
    }

    /// Remove and return orphans whose missing input satisfies `resolved`,
    /// oldest first.
    pub fn take_resolved(&mut self, resolved: impl Fn(&UtxoRef) -> bool) -> Vec<Transaction> {
        let mut ready: Vec<(u64, TxId)> = self
            .entries
            .iter()
            .filter(|(_, e)| resolved(&e.missing))
            .map(|(id, e)| (e.received_at, *id))
            .collect();
        ready.sort_unstable();
        ready
            .into_iter()
            .filter_map(|(_, id)| self.remove(&id))
            .collect()
    }

    /// Drop orphans older than the TTL and return their ids.
    pub fn expire(&mut self, now: u64) -> Vec<TxId> {
        let expired: Vec<TxId> = self
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_sub(e.received_at) >= self.ttl_secs)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orphan(id: u8) -> Transaction {
        Transaction {
            txid: TxId([id; 32]),
            tx_type: Default::default(),
            sender: tessera_consensus::Address::new("tTSRx"),
            inputs: vec![],
            outputs: vec![],
            fee: 0,
            nonce: 0,
            timestamp: 0,
            public_key: vec![],
            signature: vec![],
            rbf_enabled: false,
            replaces_txid: None,
            payload: vec![],
        }
    }

    fn missing(n: u8) -> UtxoRef {
        UtxoRef::new(TxId([n; 32]), 0)
    }

    #[test]
    fn test_take_waiting_on() {
        let mut pool = OrphanPool::new(10, 600);
        pool.insert(orphan(1), missing(50), 0);
        pool.insert(orphan(2), missing(50), 1);
        pool.insert(orphan(3), missing(51), 2);

        let woken = pool.take_waiting_on(&missing(50));
        assert_eq!(woken.len(), 2);
        assert_eq!(pool.len(), 1);
        assert!(pool.take_waiting_on(&missing(50)).is_empty());
    }

    #[test]
    fn test_bounded_drops_oldest() {
        let mut pool = OrphanPool::new(2, 600);
        pool.insert(orphan(1), missing(50), 10);
        pool.insert(orphan(2), missing(51), 20);
        let dropped = pool.insert(orphan(3), missing(52), 30);
        assert_eq!(dropped, Some(TxId([1; 32])));
        assert!(!pool.contains(&TxId([1; 32])));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_expire() {
        let mut pool = OrphanPool::new(10, 600);
        pool.insert(orphan(1), missing(50), 0);
        pool.insert(orphan(2), missing(51), 500);
        assert_eq!(pool.expire(600), vec![TxId([1; 32])]);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_take_resolved_oldest_first() {
        let mut pool = OrphanPool::new(10, 600);
        pool.insert(orphan(1), missing(50), 5);
        pool.insert(orphan(2), missing(51), 1);
        pool.insert(orphan(3), missing(52), 3);
        let taken: Vec<u8> = pool
            .take_resolved(|r| r.txid.0[0] != 52)
            .into_iter()
            .map(|tx| tx.txid.0[0])
            .collect();
        assert_eq!(taken, vec![2, 1]);
        assert_eq!(pool.len(), 1);
    }
}
