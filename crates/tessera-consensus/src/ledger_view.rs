//! Read-only ledger interface and the external executor seam.

use crate::types::{Address, Amount, Transaction, TxId, Utxo, UtxoRef};

/// Narrow read-only view of ledger state.
///
/// Validators and peripheral modules see the ledger only through this
/// trait. The pending methods default to "nothing pending", which is the
/// right answer for block validation.
pub trait LedgerView {
    /// Confirmed unspent output.
    fn utxo(&self, utxo_ref: &UtxoRef) -> Option<Utxo>;

    /// Confirmed transaction that consumed `utxo_ref`, if any.
    fn spent_by(&self, utxo_ref: &UtxoRef) -> Option<TxId>;

    /// Highest nonce of a confirmed transaction from `sender`.
    fn confirmed_nonce(&self, sender: &Address) -> Option<u64>;

    /// Confirmed balance of `address`.
    fn balance(&self, address: &Address) -> Amount;

    /// Output created by a pending (pooled) transaction.
    fn pending_output(&self, _utxo_ref: &UtxoRef) -> Option<Utxo> {
        None
    }

    /// Pending transaction holding a reservation on `utxo_ref`.
    fn reserved_by(&self, _utxo_ref: &UtxoRef) -> Option<TxId> {
        None
    }

    /// Highest nonce among pending transactions from `sender`.
    fn pending_nonce(&self, _sender: &Address) -> Option<u64> {
        None
    }
}

impl<T: LedgerView + ?Sized> LedgerView for &T {
    fn utxo(&self, utxo_ref: &UtxoRef) -> Option<Utxo> {
        (**self).utxo(utxo_ref)
    }

    fn spent_by(&self, utxo_ref: &UtxoRef) -> Option<TxId> {
        (**self).spent_by(utxo_ref)
    }

    fn confirmed_nonce(&self, sender: &Address) -> Option<u64> {
        (**self).confirmed_nonce(sender)
    }

    fn balance(&self, address: &Address) -> Amount {
        (**self).balance(address)
    }

    fn pending_output(&self, utxo_ref: &UtxoRef) -> Option<Utxo> {
        (**self).pending_output(utxo_ref)
    }

    fn reserved_by(&self, utxo_ref: &UtxoRef) -> Option<TxId> {
        (**self).reserved_by(utxo_ref)
    }

    fn pending_nonce(&self, sender: &Address) -> Option<u64> {
        (**self).pending_nonce(sender)
    }
}

/// Verdict of the external contract or governance executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Opaque state diff; the ledger core does not interpret it.
    pub state_diff: Vec<u8>,
    pub gas_used: u64,
    /// Revert reason when `success` is false.
    pub reason: Option<String>,
}

impl ExecutionOutcome {
    pub fn accepted(gas_used: u64) -> Self {
        Self {
            success: true,
            gas_used,
            ..Default::default()
        }
    }

    pub fn reverted(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// External VM / governance collaborator.
pub trait ContractExecutor: Send + Sync {
    fn execute(&self, tx: &Transaction, view: &dyn LedgerView) -> ExecutionOutcome;
}
