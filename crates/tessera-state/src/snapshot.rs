//! Point-in-time views of the UTXO set.

use im::{HashMap, OrdSet};
use sha2::{Digest, Sha256};
use tessera_consensus::{Address, Amount, ByteWriter, LedgerView, TxId, Utxo, UtxoRef};

pub(crate) type EntryMap = HashMap<UtxoRef, Utxo>;
pub(crate) type OwnerIndex = HashMap<Address, OrdSet<UtxoRef>>;
pub(crate) type NonceMap = HashMap<Address, u64>;
pub(crate) type SpentIndex = HashMap<UtxoRef, TxId>;

/// Immutable copy of the confirmed set.
///
/// The maps are persistent: a snapshot shares structure with the live set,
/// and later writes copy only the nodes they touch. Taking one is O(1) and
/// readers never block the writer.
#[derive(Debug, Clone, Default)]
pub struct UtxoSnapshot {
    pub(crate) entries: EntryMap,
    pub(crate) by_owner: OwnerIndex,
    pub(crate) nonces: NonceMap,
    pub(crate) spent: SpentIndex,
    pub(crate) height: Option<u32>,
    pub(crate) total_issued: Amount,
}

impl UtxoSnapshot {
    /// Height of the last applied block.
    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn total_issued(&self) -> Amount {
        self.total_issued
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unspent outputs owned by `address`, in key order.
    pub fn utxos_of(&self, address: &Address) -> Vec<Utxo> {
        owned_utxos(&self.entries, &self.by_owner, address)
    }

    pub fn digest(&self) -> [u8; 32] {
        digest_entries(&self.entries)
    }
}

impl LedgerView for UtxoSnapshot {
    fn utxo(&self, utxo_ref: &UtxoRef) -> Option<Utxo> {
        self.entries.get(utxo_ref).cloned()
    }

    fn spent_by(&self, utxo_ref: &UtxoRef) -> Option<TxId> {
        self.spent.get(utxo_ref).copied()
    }

    fn confirmed_nonce(&self, sender: &Address) -> Option<u64> {
        self.nonces.get(sender).copied()
    }

    fn balance(&self, address: &Address) -> Amount {
        owned_balance(&self.entries, &self.by_owner, address)
    }
}

pub(crate) fn owned_utxos(entries: &EntryMap, by_owner: &OwnerIndex, address: &Address) -> Vec<Utxo> {
    by_owner
        .get(address)
        .map(|refs| refs.iter().filter_map(|r| entries.get(r).cloned()).collect())
        .unwrap_or_default()
}

pub(crate) fn owned_balance(entries: &EntryMap, by_owner: &OwnerIndex, address: &Address) -> Amount {
    by_owner
        .get(address)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| entries.get(r))
                .map(|u| u.amount)
                .sum()
        })
        .unwrap_or(0)
}

/// SHA-256 over all entries in key order.
///
/// Independent of insertion history: two sets holding the same outputs
/// produce the same digest.
pub(crate) fn digest_entries(entries: &EntryMap) -> [u8; 32] {
    let mut keys: Vec<&UtxoRef> = entries.keys().collect();
    keys.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update((keys.len() as u64).to_be_bytes());
    let mut w = ByteWriter::with_capacity(128);
    for key in keys {
        if let Some(utxo) = entries.get(key) {
            utxo.encode(&mut w);
        }
    }
    hasher.update(w.finish());
    hasher.finalize().into()
}
