//! Confirmed UTXO set.
//!
//! Blocks are applied as all-or-nothing batches: the full change set is
//! computed against the current state first and nothing is touched unless
//! every input resolves. Each applied block leaves an undo record so the
//! chain manager can unwind to a fork point.
//!
//! Undo records, the spent index and the applied-block set only cover
//! blocks above the finalized height. `prune_undo` drops all three together,
//! so their size is bounded by the reorganizable window, not chain history.

use crate::reservation::ReservationTable;
use crate::snapshot::{
    digest_entries, owned_balance, owned_utxos, EntryMap, NonceMap, OwnerIndex, SpentIndex,
    UtxoSnapshot,
};
use crate::{StateError, StateResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use tessera_consensus::{
    Address, Amount, Block, BlockHash, LedgerView, TxId, Utxo, UtxoRef,
};
use tracing::{debug, instrument};

/// Inverse of one applied block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoData {
    pub block_hash: BlockHash,
    pub height: u32,
    /// Previously confirmed outputs the block consumed.
    pub restored: Vec<Utxo>,
    /// Outputs the block left in the set.
    pub created: Vec<UtxoRef>,
    /// Every output the block marked spent, including ones it created.
    pub spent_refs: Vec<UtxoRef>,
    /// Sender nonces as they were before the block.
    pub previous_nonces: Vec<(Address, Option<u64>)>,
    pub previous_height: Option<u32>,
    pub previous_issued: Amount,
}

/// Effects of a block, computed without mutating the set.
struct ChangeSet {
    consumed: Vec<Utxo>,
    created: BTreeMap<UtxoRef, Utxo>,
    spent: Vec<(UtxoRef, TxId)>,
    nonces: BTreeMap<Address, u64>,
    total_issued: Amount,
}

/// The authoritative unspent-output state.
#[derive(Debug, Clone, Default)]
pub struct UtxoSet {
    entries: EntryMap,
    by_owner: OwnerIndex,
    nonces: NonceMap,
    spent: SpentIndex,
    reservations: ReservationTable,
    total_issued: Amount,
    height: Option<u32>,
    tip: Option<BlockHash>,
    undo: HashMap<BlockHash, UndoData>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Height of the last applied block, `None` before genesis.
    pub fn height(&self) -> Option<u32> {
        self.height
    }

    /// Hash of the last applied block.
    pub fn tip(&self) -> Option<BlockHash> {
        self.tip
    }

    /// Net coinbase issuance of all applied blocks.
    pub fn total_issued(&self) -> Amount {
        self.total_issued
    }

    /// Sum of all unspent amounts. Equals `total_issued` for any state
    /// reached through `apply_block` and `revert_block`.
    pub fn total_value(&self) -> Amount {
        self.entries
            .values()
            .fold(0, |acc: Amount, u| acc.saturating_add(u.amount))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, utxo_ref: &UtxoRef) -> bool {
        self.entries.contains_key(utxo_ref)
    }

    /// Whether `hash` is applied and still revertible, or is the tip.
    pub fn is_applied(&self, hash: &BlockHash) -> bool {
        self.tip == Some(*hash) || self.undo.contains_key(hash)
    }

    /// Size of the spent index. Only spends above the finalized height are
    /// kept.
    pub fn spent_len(&self) -> usize {
        self.spent.len()
    }

    /// Number of blocks that can still be reverted.
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn undo_data(&self, hash: &BlockHash) -> Option<&UndoData> {
        self.undo.get(hash)
    }

    pub fn get(&self, utxo_ref: &UtxoRef) -> StateResult<&Utxo> {
        self.entries
            .get(utxo_ref)
            .ok_or(StateError::UtxoNotFound(*utxo_ref))
    }

    /// Insert a single output outside block accounting.
    pub fn add(&mut self, utxo: Utxo) -> StateResult<()> {
        let key = utxo.utxo_ref();
        if self.entries.contains_key(&key) {
            return Err(StateError::DuplicateUtxo(key));
        }
        self.insert_entry(utxo);
        Ok(())
    }

    /// Remove a single output outside block accounting. A missing output is
    /// an error the caller must handle.
    pub fn remove(&mut self, utxo_ref: &UtxoRef) -> StateResult<Utxo> {
        self.remove_entry(utxo_ref)
            .ok_or(StateError::UtxoNotFound(*utxo_ref))
    }

    pub fn balance(&self, address: &Address) -> Amount {
        owned_balance(&self.entries, &self.by_owner, address)
    }

    pub fn utxos_of(&self, address: &Address) -> Vec<Utxo> {
        owned_utxos(&self.entries, &self.by_owner, address)
    }

    pub fn confirmed_nonce(&self, sender: &Address) -> Option<u64> {
        self.nonces.get(sender).copied()
    }

    /// Apply a block atomically.
    #[instrument(skip_all, fields(height = block.height(), hash = %block.hash()))]
    pub fn apply_block(&mut self, block: &Block) -> StateResult<()> {
        let hash = block.hash();
        if self.is_applied(&hash) {
            return Err(StateError::AlreadyApplied(hash));
        }
        if let Some(tip) = self.tip() {
            if block.header.previous_hash != tip {
                return Err(StateError::ParentMismatch {
                    expected: tip,
                    got: block.header.previous_hash,
                });
            }
        }

        let change = self.compute_change(block)?;

        let mut undo = UndoData {
            block_hash: hash,
            height: block.height(),
            restored: Vec::with_capacity(change.consumed.len()),
            created: Vec::with_capacity(change.created.len()),
            spent_refs: Vec::with_capacity(change.spent.len()),
            previous_nonces: Vec::with_capacity(change.nonces.len()),
            previous_height: self.height,
            previous_issued: self.total_issued,
        };

        for utxo in change.consumed {
            self.remove_entry(&utxo.utxo_ref());
            undo.restored.push(utxo);
        }
        for (utxo_ref, txid) in change.spent {
            self.spent.insert(utxo_ref, txid);
            self.reservations.clear(&utxo_ref);
            undo.spent_refs.push(utxo_ref);
        }
        for (utxo_ref, utxo) in change.created {
            self.insert_entry(utxo);
            undo.created.push(utxo_ref);
        }
        for (sender, nonce) in change.nonces {
            let previous = self.nonces.get(&sender).copied();
            self.nonces.insert(sender.clone(), previous.map_or(nonce, |p| p.max(nonce)));
            undo.previous_nonces.push((sender, previous));
        }

        self.total_issued = change.total_issued;
        self.height = Some(block.height());
        self.tip = Some(hash);

        debug!(
            consumed = undo.restored.len(),
            created = undo.created.len(),
            total_issued = self.total_issued,
            "Applied block to UTXO set"
        );
        self.undo.insert(hash, undo);
        Ok(())
    }

    /// Revert the most recently applied block.
    ///
    /// Reservations the block cleared are not handed back: their holders
    /// left the pool on confirmation and must be re-admitted to reserve
    /// again.
    #[instrument(skip_all, fields(height = block.height(), hash = %block.hash()))]
    pub fn revert_block(&mut self, block: &Block) -> StateResult<()> {
        let hash = block.hash();
        if self.tip() != Some(hash) {
            return Err(StateError::NotTip(hash));
        }
        let undo = self
            .undo
            .remove(&hash)
            .ok_or(StateError::MissingUndo(hash))?;

        for utxo_ref in &undo.created {
            self.remove_entry(utxo_ref);
        }
        for utxo in undo.restored {
            self.insert_entry(utxo);
        }
        for utxo_ref in &undo.spent_refs {
            self.spent.remove(utxo_ref);
        }
        for (sender, previous) in undo.previous_nonces.into_iter().rev() {
            match previous {
                Some(nonce) => self.nonces.insert(sender, nonce),
                None => self.nonces.remove(&sender),
            };
        }

        self.total_issued = undo.previous_issued;
        self.height = undo.previous_height;
        self.tip = undo.previous_height.map(|_| block.header.previous_hash);

        debug!(total_issued = self.total_issued, "Reverted block from UTXO set");
        Ok(())
    }

    /// Drop undo records for blocks at or below `height`, along with the
    /// spent-index entries they recorded. Such blocks can no longer be
    /// reverted. A later spend of a pruned output reports it as missing.
    pub fn prune_undo(&mut self, height: u32) -> usize {
        let finalized: Vec<BlockHash> = self
            .undo
            .values()
            .filter(|u| u.height <= height)
            .map(|u| u.block_hash)
            .collect();
        for hash in &finalized {
            if let Some(undo) = self.undo.remove(hash) {
                for utxo_ref in &undo.spent_refs {
                    self.spent.remove(utxo_ref);
                }
            }
        }
        finalized.len()
    }

    /// Soft-lock `utxo_ref` for a pending transaction.
    pub fn reserve_pending(
        &mut self,
        utxo_ref: UtxoRef,
        holder: TxId,
        now: u64,
        ttl_secs: u64,
    ) -> StateResult<()> {
        self.reservations.reserve(utxo_ref, holder, now, ttl_secs)
    }

    pub fn release_pending(&mut self, utxo_ref: &UtxoRef, holder: &TxId) -> bool {
        self.reservations.release(utxo_ref, holder)
    }

    /// Pending transaction currently holding `utxo_ref`.
    pub fn reserved_by(&self, utxo_ref: &UtxoRef) -> Option<TxId> {
        self.reservations.get(utxo_ref).map(|r| r.holder)
    }

    /// Drop expired reservations and return their holders.
    pub fn expire_reservations(&mut self, now: u64) -> Vec<TxId> {
        self.reservations.expire(now)
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Current reservation table, for callers that must put it back after
    /// an abandoned batch of applies and reverts.
    pub fn reservations(&self) -> &ReservationTable {
        &self.reservations
    }

    pub fn restore_reservations(&mut self, table: ReservationTable) {
        self.reservations = table;
    }

    /// Immutable copy of the confirmed state.
    pub fn snapshot(&self) -> UtxoSnapshot {
        UtxoSnapshot {
            entries: self.entries.clone(),
            by_owner: self.by_owner.clone(),
            nonces: self.nonces.clone(),
            spent: self.spent.clone(),
            height: self.height,
            total_issued: self.total_issued,
        }
    }

    /// Canonical hash of the confirmed entries.
    pub fn snapshot_digest(&self) -> [u8; 32] {
        digest_entries(&self.entries)
    }

    fn compute_change(&self, block: &Block) -> StateResult<ChangeSet> {
        let height = block.height();
        let mut consumed = Vec::new();
        let mut consumed_refs = HashSet::new();
        let mut created: BTreeMap<UtxoRef, Utxo> = BTreeMap::new();
        let mut spent = Vec::new();
        let mut nonces: BTreeMap<Address, u64> = BTreeMap::new();
        let mut minted: Amount = 0;

        for tx in &block.transactions {
            for input in &tx.inputs {
                if created.remove(input).is_none() {
                    match self.entries.get(input) {
                        Some(utxo) if consumed_refs.insert(*input) => consumed.push(utxo.clone()),
                        _ => return Err(StateError::UtxoNotFound(*input)),
                    }
                }
                spent.push((*input, tx.txid));
            }

            for utxo in tx.created_utxos(height) {
                let key = utxo.utxo_ref();
                if self.entries.contains_key(&key)
                    || self.spent.contains_key(&key)
                    || created.contains_key(&key)
                {
                    return Err(StateError::DuplicateUtxo(key));
                }
                created.insert(key, utxo);
            }

            if tx.is_coinbase() {
                minted = tx
                    .output_total()
                    .and_then(|total| minted.checked_add(total))
                    .ok_or(StateError::SupplyOverflow(height))?;
            } else {
                let entry = nonces.entry(tx.sender.clone()).or_insert(tx.nonce);
                *entry = (*entry).max(tx.nonce);
            }
        }

        let fees = block
            .total_fees()
            .ok_or(StateError::SupplyOverflow(height))?;
        let total_issued = self
            .total_issued
            .checked_add(minted)
            .and_then(|t| t.checked_sub(fees))
            .ok_or(StateError::SupplyOverflow(height))?;

        Ok(ChangeSet {
            consumed,
            created,
            spent,
            nonces,
            total_issued,
        })
    }

    fn insert_entry(&mut self, utxo: Utxo) {
        let key = utxo.utxo_ref();
        self.by_owner
            .entry(utxo.owner.clone())
            .or_insert_with(Default::default)
            .insert(key);
        self.entries.insert(key, utxo);
    }

    fn remove_entry(&mut self, utxo_ref: &UtxoRef) -> Option<Utxo> {
        let utxo = self.entries.remove(utxo_ref)?;
        if let Some(refs) = self.by_owner.get_mut(&utxo.owner) {
            refs.remove(utxo_ref);
            if refs.is_empty() {
                self.by_owner.remove(&utxo.owner);
            }
        }
        Some(utxo)
    }
}

/// Confirmed state only. Reservations are a pool concern and are exposed by
/// the mempool's own view, so block validation never sees them.
impl LedgerView for UtxoSet {
    fn utxo(&self, utxo_ref: &UtxoRef) -> Option<Utxo> {
        self.entries.get(utxo_ref).cloned()
    }

    fn spent_by(&self, utxo_ref: &UtxoRef) -> Option<TxId> {
        self.spent.get(utxo_ref).copied()
    }

    fn confirmed_nonce(&self, sender: &Address) -> Option<u64> {
        UtxoSet::confirmed_nonce(self, sender)
    }

    fn balance(&self, address: &Address) -> Amount {
        UtxoSet::balance(self, address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_consensus::{
        coinbase_transaction, derive_address, genesis_block, public_key_bytes, BlockBuilder,
        ChainParams, SigningKey, Transaction, TransactionBuilder, COIN,
    };

    const T0: u64 = 1_700_000_000;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    fn addr(seed: u8) -> Address {
        derive_address(&public_key_bytes(&key(seed)), "tTSR")
    }

    fn genesis() -> Block {
        genesis_block(&ChainParams::regtest(), addr(1), T0)
    }

    fn transfer(input: UtxoRef, from: u8, to: u8, amount: Amount, fee: Amount, nonce: u64) -> Transaction {
        TransactionBuilder::new()
            .input(input)
            .output(addr(to), amount - fee)
            .fee(fee)
            .nonce(nonce)
            .timestamp(T0)
            .sign(&key(from), "tTSR")
    }

    fn block_on(parent: &Block, txs: Vec<Transaction>) -> Block {
        let height = parent.height() + 1;
        let fees: Amount = txs.iter().map(|tx| tx.fee).sum();
        let ts = parent.header.timestamp + 120;
        BlockBuilder::on_top_of(&parent.header)
            .timestamp(ts)
            .transaction(coinbase_transaction(height, addr(9), 12 * COIN + fees, ts))
            .transactions(txs)
            .build()
    }

    fn genesis_state() -> (UtxoSet, Block) {
        let genesis = genesis();
        let mut set = UtxoSet::new();
        set.apply_block(&genesis).unwrap();
        (set, genesis)
    }

    #[test]
    fn test_apply_genesis() {
        let (set, genesis) = genesis_state();
        assert_eq!(set.height(), Some(0));
        assert_eq!(set.tip(), Some(genesis.hash()));
        assert_eq!(set.balance(&addr(1)), 12 * COIN);
        assert_eq!(set.total_issued(), 12 * COIN);
        assert_eq!(set.total_value(), set.total_issued());
    }

    #[test]
    fn test_apply_transfer_updates_balances_and_nonce() {
        let (mut set, genesis) = genesis_state();
        let input = genesis.transactions[0].output_ref(0);
        let tx = transfer(input, 1, 2, 12 * COIN, 5_000, 1);
        let block = block_on(&genesis, vec![tx.clone()]);
        set.apply_block(&block).unwrap();

        assert_eq!(set.balance(&addr(1)), 0);
        assert_eq!(set.balance(&addr(2)), 12 * COIN - 5_000);
        assert_eq!(set.balance(&addr(9)), 12 * COIN + 5_000);
        assert_eq!(set.confirmed_nonce(&addr(1)), Some(1));
        assert_eq!(set.spent_by(&input), Some(tx.txid));
        assert_eq!(set.total_issued(), 24 * COIN);
        assert_eq!(set.total_value(), set.total_issued());
    }

    #[test]
    fn test_reapply_rejected() {
        let (mut set, genesis) = genesis_state();
        assert_eq!(
            set.apply_block(&genesis),
            Err(StateError::AlreadyApplied(genesis.hash()))
        );
    }

    #[test]
    fn test_missing_input_leaves_state_untouched() {
        let (mut set, genesis) = genesis_state();
        let digest = set.snapshot_digest();
        let bogus = UtxoRef::new(TxId([7; 32]), 0);
        let block = block_on(&genesis, vec![transfer(bogus, 1, 2, COIN, 1_000, 1)]);

        assert_eq!(set.apply_block(&block), Err(StateError::UtxoNotFound(bogus)));
        assert_eq!(set.snapshot_digest(), digest);
        assert_eq!(set.height(), Some(0));
        assert_eq!(set.total_issued(), 12 * COIN);
    }

    #[test]
    fn test_in_block_double_spend_rejected() {
        let (mut set, genesis) = genesis_state();
        let input = genesis.transactions[0].output_ref(0);
        let a = transfer(input, 1, 2, 12 * COIN, 1_000, 1);
        let b = transfer(input, 1, 3, 12 * COIN, 2_000, 2);
        let block = block_on(&genesis, vec![a, b]);

        assert_eq!(set.apply_block(&block), Err(StateError::UtxoNotFound(input)));
        assert_eq!(set.balance(&addr(1)), 12 * COIN);
    }

    #[test]
    fn test_chained_spend_in_one_block() {
        let (mut set, genesis) = genesis_state();
        let a = transfer(genesis.transactions[0].output_ref(0), 1, 2, 12 * COIN, 1_000, 1);
        let b = transfer(a.output_ref(0), 2, 3, 12 * COIN - 1_000, 1_000, 1);
        let block = block_on(&genesis, vec![a.clone(), b]);
        set.apply_block(&block).unwrap();

        assert!(!set.contains(&a.output_ref(0)));
        assert_eq!(set.balance(&addr(3)), 12 * COIN - 2_000);
        assert_eq!(set.total_value(), set.total_issued());
    }

    #[test]
    fn test_parent_mismatch() {
        let (mut set, genesis) = genesis_state();
        let b1 = block_on(&genesis, vec![]);
        let b2 = block_on(&b1, vec![]);
        assert_eq!(
            set.apply_block(&b2),
            Err(StateError::ParentMismatch {
                expected: genesis.hash(),
                got: b1.hash()
            })
        );
    }

    #[test]
    fn test_revert_round_trip() {
        let (mut set, genesis) = genesis_state();
        let before = set.snapshot_digest();
        let tx = transfer(genesis.transactions[0].output_ref(0), 1, 2, 12 * COIN, 1_000, 1);
        let block = block_on(&genesis, vec![tx]);

        set.apply_block(&block).unwrap();
        let after = set.snapshot_digest();
        set.revert_block(&block).unwrap();

        assert_eq!(set.snapshot_digest(), before);
        assert_eq!(set.confirmed_nonce(&addr(1)), None);
        assert_eq!(set.total_issued(), 12 * COIN);
        assert_eq!(set.height(), Some(0));
        assert_eq!(set.spent_by(&genesis.transactions[0].output_ref(0)), None);

        set.apply_block(&block).unwrap();
        assert_eq!(set.snapshot_digest(), after);
    }

    #[test]
    fn test_revert_requires_tip() {
        let (mut set, genesis) = genesis_state();
        let b1 = block_on(&genesis, vec![]);
        set.apply_block(&b1).unwrap();
        assert_eq!(
            set.revert_block(&genesis),
            Err(StateError::NotTip(genesis.hash()))
        );
    }

    #[test]
    fn test_pruned_undo_cannot_revert() {
        let (mut set, genesis) = genesis_state();
        let b1 = block_on(&genesis, vec![]);
        set.apply_block(&b1).unwrap();
        assert_eq!(set.prune_undo(1), 2);
        assert_eq!(set.revert_block(&b1), Err(StateError::MissingUndo(b1.hash())));
        assert_eq!(set.height(), Some(1));
    }

    #[test]
    fn test_prune_bounds_spent_index_and_undo() {
        let (mut set, genesis) = genesis_state();
        let mut parent = genesis.clone();
        let mut input = genesis.transactions[0].output_ref(0);
        let mut amount = 12 * COIN;
        let mut owner = 1;
        let mut blocks = Vec::new();
        for nonce in 1..=4u64 {
            let next = owner + 1;
            let tx = transfer(input, owner, next, amount, 1_000, nonce);
            input = tx.output_ref(0);
            amount -= 1_000;
            owner = next;
            let block = block_on(&parent, vec![tx]);
            set.apply_block(&block).unwrap();
            parent = block.clone();
            blocks.push(block);
        }
        assert_eq!(set.spent_len(), 4);
        assert_eq!(set.undo_len(), 5);

        assert_eq!(set.prune_undo(3), 4);
        assert_eq!(set.spent_len(), 1);
        assert_eq!(set.undo_len(), 1);
        assert_eq!(set.spent_by(&genesis.transactions[0].output_ref(0)), None);
        assert!(set.is_applied(&blocks[3].hash()));
        assert!(!set.is_applied(&blocks[0].hash()));
        assert_eq!(set.tip(), Some(blocks[3].hash()));

        set.revert_block(&blocks[3]).unwrap();
        assert_eq!(set.spent_len(), 0);
        assert_eq!(set.tip(), Some(blocks[2].hash()));
        assert_eq!(set.height(), Some(3));
        assert_eq!(set.total_value(), set.total_issued());
    }

    #[test]
    fn test_restore_reservations_after_abandoned_apply() {
        let (mut set, genesis) = genesis_state();
        let input = genesis.transactions[0].output_ref(0);
        let pending = TxId([5; 32]);
        set.reserve_pending(input, pending, T0, 300).unwrap();
        let saved = set.reservations().clone();

        let block = block_on(&genesis, vec![transfer(input, 1, 2, 12 * COIN, 1_000, 1)]);
        set.apply_block(&block).unwrap();
        assert_eq!(set.reserved_by(&input), None);
        set.revert_block(&block).unwrap();
        assert_eq!(set.reserved_by(&input), None);

        set.restore_reservations(saved);
        assert_eq!(set.reserved_by(&input), Some(pending));
    }

    #[test]
    fn test_snapshot_isolated_from_later_writes() {
        let (mut set, genesis) = genesis_state();
        let snapshot = set.snapshot();
        let tx = transfer(genesis.transactions[0].output_ref(0), 1, 2, 12 * COIN, 1_000, 1);
        set.apply_block(&block_on(&genesis, vec![tx])).unwrap();

        assert_eq!(snapshot.balance(&addr(1)), 12 * COIN);
        assert_eq!(snapshot.height(), Some(0));
        assert_eq!(set.balance(&addr(1)), 0);
        assert_ne!(snapshot.digest(), set.snapshot_digest());
    }

    #[test]
    fn test_confirmation_clears_reservation() {
        let (mut set, genesis) = genesis_state();
        let input = genesis.transactions[0].output_ref(0);
        let tx = transfer(input, 1, 2, 12 * COIN, 1_000, 1);
        set.reserve_pending(input, tx.txid, T0, 300).unwrap();
        assert_eq!(set.reserved_by(&input), Some(tx.txid));

        set.apply_block(&block_on(&genesis, vec![tx])).unwrap();
        assert_eq!(set.reserved_by(&input), None);
        assert_eq!(set.reservation_count(), 0);
    }

    #[test]
    fn test_block_view_ignores_reservations() {
        let (mut set, genesis) = genesis_state();
        let input = genesis.transactions[0].output_ref(0);
        set.reserve_pending(input, TxId([5; 32]), T0, 300).unwrap();
        assert_eq!(LedgerView::reserved_by(&set, &input), None);
    }

    #[test]
    fn test_add_remove_get() {
        let mut set = UtxoSet::new();
        let utxo = Utxo {
            txid: TxId([1; 32]),
            output_index: 0,
            owner: addr(1),
            amount: 10,
            created_height: 0,
        };
        let key = utxo.utxo_ref();
        set.add(utxo.clone()).unwrap();
        assert_eq!(set.add(utxo.clone()), Err(StateError::DuplicateUtxo(key)));
        assert_eq!(set.get(&key), Ok(&utxo));
        assert_eq!(set.remove(&key), Ok(utxo));
        assert_eq!(set.remove(&key), Err(StateError::UtxoNotFound(key)));
        assert!(set.utxos_of(&addr(1)).is_empty());
    }
}
