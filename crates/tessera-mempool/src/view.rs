//! Ledger view combining confirmed state with pooled transactions.

use crate::pool::Mempool;
use std::collections::HashSet;
use tessera_consensus::{Address, Amount, LedgerView, TxId, Utxo, UtxoRef};
use tessera_state::UtxoSet;

/// Confirmed state plus pending outputs, reservations and nonces.
///
/// Transactions in `hidden` are treated as absent; admission uses this to
/// validate a replacement as if the transactions it evicts were gone.
pub struct PoolView<'a> {
    utxos: &'a UtxoSet,
    pool: &'a Mempool,
    hidden: HashSet<TxId>,
}

impl<'a> PoolView<'a> {
    pub fn new(utxos: &'a UtxoSet, pool: &'a Mempool) -> Self {
        Self::hiding(utxos, pool, HashSet::new())
    }

    pub fn hiding(utxos: &'a UtxoSet, pool: &'a Mempool, hidden: HashSet<TxId>) -> Self {
        Self {
            utxos,
            pool,
            hidden,
        }
    }

    fn visible(&self, txid: &TxId) -> bool {
        !self.hidden.contains(txid) && self.pool.contains(txid)
    }
}

impl LedgerView for PoolView<'_> {
    fn utxo(&self, utxo_ref: &UtxoRef) -> Option<Utxo> {
        LedgerView::utxo(self.utxos, utxo_ref)
    }

    fn spent_by(&self, utxo_ref: &UtxoRef) -> Option<TxId> {
        LedgerView::spent_by(self.utxos, utxo_ref)
    }

    fn confirmed_nonce(&self, sender: &Address) -> Option<u64> {
        self.utxos.confirmed_nonce(sender)
    }

    fn balance(&self, address: &Address) -> Amount {
        self.utxos.balance(address)
    }

    fn pending_output(&self, utxo_ref: &UtxoRef) -> Option<Utxo> {
        let creator = self.pool.creator_of(utxo_ref)?;
        if !self.visible(&creator.tx.txid) {
            return None;
        }
        let height = self.utxos.height().map_or(0, |h| h + 1);
        creator
            .tx
            .created_utxos(height)
            .find(|u| u.output_index == utxo_ref.index)
    }

    fn reserved_by(&self, utxo_ref: &UtxoRef) -> Option<TxId> {
        self.utxos
            .reserved_by(utxo_ref)
            .filter(|holder| self.visible(holder))
    }

    fn pending_nonce(&self, sender: &Address) -> Option<u64> {
        self.pool.pending_nonce(sender, &self.hidden)
    }
}
