//! Pending-spend reservations.
//!
//! The mempool soft-locks the inputs of every admitted transaction so a
//! second pool transaction cannot claim them. Entries expire after a TTL so
//! abandoned transactions do not pin outputs forever.

use crate::{StateError, StateResult};
use std::collections::{BTreeSet, HashMap};
use tessera_consensus::{TxId, UtxoRef};

/// A soft lock on one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub holder: TxId,
    /// Unix seconds after which the lock no longer binds.
    pub expires_at: u64,
}

impl Reservation {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Reservation table keyed by output.
#[derive(Debug, Clone, Default)]
pub struct ReservationTable {
    entries: HashMap<UtxoRef, Reservation>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `utxo_ref` for `holder` until `now + ttl_secs`.
    ///
    /// Re-reserving by the same holder refreshes the expiry. An expired
    /// lock held by someone else is taken over.
    pub fn reserve(
        &mut self,
        utxo_ref: UtxoRef,
        holder: TxId,
        now: u64,
        ttl_secs: u64,
    ) -> StateResult<()> {
        if let Some(existing) = self.entries.get(&utxo_ref) {
            if existing.holder != holder && !existing.is_expired(now) {
                return Err(StateError::ReservationConflict {
                    utxo: utxo_ref,
                    holder: existing.holder,
                });
            }
        }
        self.entries.insert(
            utxo_ref,
            Reservation {
                holder,
                expires_at: now.saturating_add(ttl_secs),
            },
        );
        Ok(())
    }

    /// Release the lock if `holder` owns it. Returns whether anything was released.
    pub fn release(&mut self, utxo_ref: &UtxoRef, holder: &TxId) -> bool {
        match self.entries.get(utxo_ref) {
            Some(r) if &r.holder == holder => {
                self.entries.remove(utxo_ref);
                true
            }
            _ => false,
        }
    }

    /// Drop the lock regardless of holder, used once the output is spent.
    pub fn clear(&mut self, utxo_ref: &UtxoRef) -> Option<Reservation> {
        self.entries.remove(utxo_ref)
    }

    pub fn get(&self, utxo_ref: &UtxoRef) -> Option<&Reservation> {
        self.entries.get(utxo_ref)
    }

    /// Remove expired entries and return their distinct holders.
    pub fn expire(&mut self, now: u64) -> Vec<TxId> {
        let mut holders = BTreeSet::new();
        self.entries.retain(|_, r| {
            if r.is_expired(now) {
                holders.insert(r.holder);
                false
            } else {
                true
            }
        });
        holders.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: u8) -> UtxoRef {
        UtxoRef::new(TxId([n; 32]), 0)
    }

    fn holder(n: u8) -> TxId {
        TxId([n; 32])
    }

    #[test]
    fn test_conflict_with_other_holder() {
        let mut table = ReservationTable::new();
        table.reserve(r(1), holder(10), 100, 300).unwrap();
        assert_eq!(
            table.reserve(r(1), holder(11), 200, 300),
            Err(StateError::ReservationConflict {
                utxo: r(1),
                holder: holder(10)
            })
        );
    }

    #[test]
    fn test_same_holder_refreshes() {
        let mut table = ReservationTable::new();
        table.reserve(r(1), holder(10), 100, 300).unwrap();
        table.reserve(r(1), holder(10), 200, 300).unwrap();
        assert_eq!(table.get(&r(1)).unwrap().expires_at, 500);
    }

    #[test]
    fn test_expired_lock_can_be_taken_over() {
        let mut table = ReservationTable::new();
        table.reserve(r(1), holder(10), 100, 300).unwrap();
        table.reserve(r(1), holder(11), 400, 300).unwrap();
        assert_eq!(table.get(&r(1)).unwrap().holder, holder(11));
    }

    #[test]
    fn test_release_only_by_holder() {
        let mut table = ReservationTable::new();
        table.reserve(r(1), holder(10), 100, 300).unwrap();
        assert!(!table.release(&r(1), &holder(11)));
        assert!(table.release(&r(1), &holder(10)));
        assert!(!table.release(&r(1), &holder(10)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_expire_returns_distinct_holders() {
        let mut table = ReservationTable::new();
        table.reserve(r(1), holder(10), 0, 100).unwrap();
        table.reserve(r(2), holder(10), 0, 100).unwrap();
        table.reserve(r(3), holder(11), 0, 500).unwrap();

        assert!(table.expire(99).is_empty());
        assert_eq!(table.expire(100), vec![holder(10)]);
        assert_eq!(table.len(), 1);
    }
}
