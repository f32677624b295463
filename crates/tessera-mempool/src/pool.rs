//! Transaction pool.
//!
//! - Admission runs the transaction validator against a [`PoolView`] and
//!   soft-locks every input in the UTXO set's reservation table
//! - Entries are ordered by fee rate, then arrival
//! - Replace-by-fee evicts the original together with its in-pool
//!   descendants
//! - Under pressure the admission fee floor rises and the lowest fee-rate
//!   entries are evicted
//!
//! The pool has a single owner; every mutating call takes `&mut self`
//! together with the `UtxoSet` holding its reservations.

use crate::ordering::FeeOrdering;
use crate::orphan::OrphanPool;
use crate::view::PoolView;
use crate::{
    MempoolError, MempoolResult, DEFAULT_MAX_BYTES, DEFAULT_MAX_ORPHANS, DEFAULT_MAX_TXS,
    DEFAULT_ORPHAN_TTL_SECS, DEFAULT_RBF_MIN_FEE_INCREMENT, DEFAULT_RESERVATION_TTL_SECS,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tessera_consensus::{
    Address, Amount, Transaction, TransactionValidator, TxId, UtxoRef, ValidationContext,
    ValidationError,
};
use tessera_state::UtxoSet;
use tracing::{debug, info, instrument, warn};

/// Mempool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum total size of pooled transactions in bytes.
    pub max_bytes: usize,
    pub max_transactions: usize,
    /// Lifetime of input reservations; unconfirmed holders are evicted after it.
    pub reservation_ttl_secs: u64,
    /// Minimum absolute fee increase for a replacement.
    pub rbf_min_fee_increment: Amount,
    pub max_orphans: usize,
    pub orphan_ttl_secs: u64,
    /// Utilisation above which the admission fee floor starts rising.
    pub pressure_threshold: f64,
    /// Fee floor multiplier reached at full utilisation.
    pub max_pressure_multiplier: f64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_transactions: DEFAULT_MAX_TXS,
            reservation_ttl_secs: DEFAULT_RESERVATION_TTL_SECS,
            rbf_min_fee_increment: DEFAULT_RBF_MIN_FEE_INCREMENT,
            max_orphans: DEFAULT_MAX_ORPHANS,
            orphan_ttl_secs: DEFAULT_ORPHAN_TTL_SECS,
            pressure_threshold: 0.5,
            max_pressure_multiplier: 10.0,
        }
    }
}

/// Stored transaction in the mempool.
#[derive(Debug, Clone, PartialEq)]
pub struct PooledTransaction {
    pub tx: Transaction,
    pub size: usize,
    pub fee_rate: f64,
    /// Admission time in unix seconds.
    pub insertion_time: u64,
    sequence: u64,
}

impl PooledTransaction {
    pub fn txid(&self) -> TxId {
        self.tx.txid
    }

    fn ordering(&self) -> FeeOrdering {
        FeeOrdering::new(
            self.tx.txid,
            self.tx.fee,
            self.size,
            self.insertion_time,
            self.sequence,
        )
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Admitted by replace-by-fee; `evicted` holds the original and its descendants.
    Replaced { evicted: Vec<TxId> },
    /// Parked until `missing` becomes visible.
    Orphaned { missing: UtxoRef },
}

/// Mempool statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MempoolStats {
    pub tx_count: usize,
    pub total_bytes: usize,
    pub orphan_count: usize,
    /// Current admission fee-rate floor.
    pub min_fee_rate: f64,
    pub lowest_fee_rate: f64,
    pub highest_fee_rate: f64,
}

/// Point-in-time copy of the pool for readers.
#[derive(Debug, Clone, Default)]
pub struct MempoolSnapshot {
    /// Entries in priority order.
    pub entries: Vec<PooledTransaction>,
    pub stats: MempoolStats,
}

/// Fee-ordered transaction pool.
#[derive(Debug, Clone)]
pub struct Mempool {
    config: MempoolConfig,
    validator: TransactionValidator,
    entries: HashMap<TxId, PooledTransaction>,
    order: BTreeSet<FeeOrdering>,
    /// Input -> pooled transaction spending it.
    spends: HashMap<UtxoRef, TxId>,
    /// Pending output -> pooled transaction creating it.
    outputs: HashMap<UtxoRef, TxId>,
    by_sender: HashMap<Address, BTreeSet<(u64, TxId)>>,
    orphans: OrphanPool,
    total_bytes: usize,
    next_sequence: u64,
}

impl Mempool {
    pub fn new(config: MempoolConfig, validator: TransactionValidator) -> Self {
        let orphans = OrphanPool::new(config.max_orphans, config.orphan_ttl_secs);
        Self {
            config,
            validator,
            entries: HashMap::new(),
            order: BTreeSet::new(),
            spends: HashMap::new(),
            outputs: HashMap::new(),
            by_sender: HashMap::new(),
            orphans,
            total_bytes: 0,
            next_sequence: 0,
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn validator(&self) -> &TransactionValidator {
        &self.validator
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &TxId) -> Option<&PooledTransaction> {
        self.entries.get(txid)
    }

    /// View of `utxos` extended with this pool's pending state.
    pub fn view<'a>(&'a self, utxos: &'a UtxoSet) -> PoolView<'a> {
        PoolView::new(utxos, self)
    }

    pub(crate) fn creator_of(&self, utxo_ref: &UtxoRef) -> Option<&PooledTransaction> {
        self.outputs
            .get(utxo_ref)
            .and_then(|txid| self.entries.get(txid))
    }

    pub(crate) fn pending_nonce(&self, sender: &Address, hidden: &HashSet<TxId>) -> Option<u64> {
        self.by_sender.get(sender).and_then(|set| {
            set.iter()
                .rev()
                .find(|(_, txid)| !hidden.contains(txid))
                .map(|(nonce, _)| *nonce)
        })
    }

    /// Admission fee-rate floor under current pressure.
    pub fn effective_min_fee_rate(&self) -> f64 {
        let base = self.validator.config().min_fee_rate;
        let by_bytes = self.total_bytes as f64 / self.config.max_bytes.max(1) as f64;
        let by_count = self.entries.len() as f64 / self.config.max_transactions.max(1) as f64;
        let utilisation = by_bytes.max(by_count);

        let threshold = self.config.pressure_threshold;
        if threshold >= 1.0 || utilisation <= threshold {
            return base;
        }
        let pressure = ((utilisation - threshold) / (1.0 - threshold)).min(1.0);
        let multiplier = self.config.max_pressure_multiplier.max(1.0);
        base * (1.0 + (multiplier - 1.0) * pressure)
    }

    /// Submit a transaction for admission.
    #[instrument(skip_all, fields(txid = %tx.txid))]
    pub fn submit(
        &mut self,
        tx: Transaction,
        utxos: &mut UtxoSet,
        now: u64,
    ) -> MempoolResult<Admission> {
        let txid = tx.txid;
        let admission = self.admit(tx, utxos, now, now)?;
        if !matches!(admission, Admission::Orphaned { .. }) {
            self.promote_orphans(txid, utxos, now);
        }
        Ok(admission)
    }

    fn admit(
        &mut self,
        tx: Transaction,
        utxos: &mut UtxoSet,
        now: u64,
        arrival: u64,
    ) -> MempoolResult<Admission> {
        let txid = tx.txid;
        if tx.is_coinbase() {
            return Err(MempoolError::CoinbaseNotAllowed);
        }
        if self.entries.contains_key(&txid) || self.orphans.contains(&txid) {
            return Err(MempoolError::AlreadyExists(txid));
        }

        let target = self.replacement_target(&tx, utxos)?;
        let replaced = match target {
            Some(original) => {
                let required = self.entries[&original]
                    .tx
                    .fee
                    .saturating_add(self.config.rbf_min_fee_increment);
                if tx.fee < required {
                    return Err(MempoolError::ReplacementFeeTooLow {
                        fee: tx.fee,
                        required,
                    });
                }
                self.with_descendants(&original)
            }
            None => Vec::new(),
        };
        let hidden: HashSet<TxId> = replaced.iter().copied().collect();

        let ctx = ValidationContext::relay(now, self.effective_min_fee_rate());
        let result = {
            let view = PoolView::hiding(utxos, self, hidden.clone());
            self.validator.validate(&tx, &view, &ctx)
        };
        let validated = match result {
            Ok(validated) => validated,
            Err(ValidationError::MissingInput(missing)) => {
                debug!(%missing, "Parking transaction with unknown input");
                if let Some(dropped) = self.orphans.insert(tx, missing, now) {
                    debug!(txid = %dropped, "Orphan pool full, dropped transaction");
                }
                return Ok(Admission::Orphaned { missing });
            }
            Err(err) => {
                debug!(%err, "Transaction rejected");
                return Err(err.into());
            }
        };

        self.check_capacity(&tx, validated.size, &hidden)?;

        for id in replaced.iter().rev() {
            self.remove_entry(id, utxos);
        }
        self.reserve_inputs(&tx, utxos, now)?;
        self.insert_entry(tx, validated.size, validated.fee_rate, arrival);
        self.enforce_capacity(&txid, utxos);

        debug!(
            fee_rate = validated.fee_rate,
            count = self.entries.len(),
            "Transaction added to mempool"
        );
        if replaced.is_empty() {
            Ok(Admission::Accepted)
        } else {
            info!(
                replaced = %replaced[0],
                evicted = replaced.len(),
                "Replaced pooled transaction by fee"
            );
            Ok(Admission::Replaced { evicted: replaced })
        }
    }

    /// Pooled transaction this one replaces, if any.
    fn replacement_target(&self, tx: &Transaction, utxos: &UtxoSet) -> MempoolResult<Option<TxId>> {
        if !tx.rbf_enabled {
            return Ok(None);
        }
        if let Some(original) = tx.replaces_txid {
            return if self.entries.contains_key(&original) {
                Ok(Some(original))
            } else {
                Err(MempoolError::ReplacementNotFound(original))
            };
        }
        let holders: BTreeSet<TxId> = tx
            .inputs
            .iter()
            .filter_map(|input| utxos.reserved_by(input))
            .filter(|holder| self.entries.contains_key(holder))
            .collect();
        match holders.len() {
            0 => Ok(None),
            1 => Ok(holders.into_iter().next()),
            n => Err(MempoolError::AmbiguousReplacement(n)),
        }
    }

    /// Reject a newcomer that would itself be the first capacity eviction.
    fn check_capacity(
        &self,
        tx: &Transaction,
        size: usize,
        hidden: &HashSet<TxId>,
    ) -> MempoolResult<()> {
        let hidden_bytes: usize = hidden
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| e.size)
            .sum();
        let bytes = self.total_bytes - hidden_bytes + size;
        let count = self.entries.len() - hidden.len() + 1;
        if bytes <= self.config.max_bytes && count <= self.config.max_transactions {
            return Ok(());
        }

        let candidate = FeeOrdering::new(tx.txid, tx.fee, size, u64::MAX, u64::MAX);
        let lowest = self
            .order
            .iter()
            .rev()
            .find(|o| !hidden.contains(&o.txid));
        match lowest {
            Some(lowest) if candidate > *lowest => Err(MempoolError::PoolFull {
                fee_rate: candidate.fee_per_byte(),
                lowest: lowest.fee_per_byte(),
            }),
            None if size > self.config.max_bytes => Err(MempoolError::PoolFull {
                fee_rate: candidate.fee_per_byte(),
                lowest: 0.0,
            }),
            _ => Ok(()),
        }
    }

    fn over_capacity(&self) -> bool {
        self.total_bytes > self.config.max_bytes || self.entries.len() > self.config.max_transactions
    }

    /// Evict lowest fee-rate entries until within budget, never touching `keep`.
    fn enforce_capacity(&mut self, keep: &TxId, utxos: &mut UtxoSet) -> Vec<TxId> {
        let mut evicted = Vec::new();
        while self.over_capacity() {
            let victim = self
                .order
                .iter()
                .rev()
                .map(|o| o.txid)
                .find(|id| id != keep && !self.with_descendants(id).contains(keep));
            let Some(victim) = victim else { break };
            let removed = self.evict_with_descendants(&victim, utxos);
            warn!(
                txid = %victim,
                count = removed.len(),
                "Evicted lowest fee-rate transaction"
            );
            evicted.extend(removed);
        }
        evicted
    }

    fn reserve_inputs(
        &self,
        tx: &Transaction,
        utxos: &mut UtxoSet,
        now: u64,
    ) -> MempoolResult<()> {
        for (i, input) in tx.inputs.iter().enumerate() {
            if let Err(err) =
                utxos.reserve_pending(*input, tx.txid, now, self.config.reservation_ttl_secs)
            {
                for done in &tx.inputs[..i] {
                    utxos.release_pending(done, &tx.txid);
                }
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn insert_entry(&mut self, tx: Transaction, size: usize, fee_rate: f64, arrival: u64) {
        let txid = tx.txid;
        let entry = PooledTransaction {
            tx,
            size,
            fee_rate,
            insertion_time: arrival,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        self.order.insert(entry.ordering());
        for input in &entry.tx.inputs {
            self.spends.insert(*input, txid);
        }
        for index in 0..entry.tx.outputs.len() as u32 {
            self.outputs.insert(entry.tx.output_ref(index), txid);
        }
        self.by_sender
            .entry(entry.tx.sender.clone())
            .or_default()
            .insert((entry.tx.nonce, txid));
        self.total_bytes += size;
        self.entries.insert(txid, entry);
    }

    fn remove_entry(&mut self, txid: &TxId, utxos: &mut UtxoSet) -> Option<PooledTransaction> {
        let entry = self.entries.remove(txid)?;
        self.order.remove(&entry.ordering());
        for input in &entry.tx.inputs {
            if self.spends.get(input) == Some(txid) {
                self.spends.remove(input);
            }
            utxos.release_pending(input, txid);
        }
        for index in 0..entry.tx.outputs.len() as u32 {
            self.outputs.remove(&entry.tx.output_ref(index));
        }
        if let Some(set) = self.by_sender.get_mut(&entry.tx.sender) {
            set.remove(&(entry.tx.nonce, *txid));
            if set.is_empty() {
                self.by_sender.remove(&entry.tx.sender);
            }
        }
        self.total_bytes -= entry.size;
        Some(entry)
    }

    /// `root` followed by every pooled transaction spending its outputs,
    /// transitively, in breadth-first order.
    fn with_descendants(&self, root: &TxId) -> Vec<TxId> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*root]);
        seen.insert(*root);
        while let Some(id) = queue.pop_front() {
            let Some(entry) = self.entries.get(&id) else { continue };
            result.push(id);
            for index in 0..entry.tx.outputs.len() as u32 {
                if let Some(child) = self.spends.get(&UtxoRef::new(id, index)) {
                    if seen.insert(*child) {
                        queue.push_back(*child);
                    }
                }
            }
        }
        result
    }

    fn evict_with_descendants(&mut self, root: &TxId, utxos: &mut UtxoSet) -> Vec<TxId> {
        let ids = self.with_descendants(root);
        for id in ids.iter().rev() {
            self.remove_entry(id, utxos);
        }
        ids
    }

    /// Admit orphans that were waiting on outputs of `parent`, transitively.
    fn promote_orphans(&mut self, parent: TxId, utxos: &mut UtxoSet, now: u64) {
        let mut stack = vec![parent];
        while let Some(parent) = stack.pop() {
            let outputs = match self.entries.get(&parent) {
                Some(entry) => entry.tx.outputs.len() as u32,
                None => continue,
            };
            for index in 0..outputs {
                for orphan in self.orphans.take_waiting_on(&UtxoRef::new(parent, index)) {
                    if let Some(admitted) = self.readmit_orphan(orphan, utxos, now) {
                        stack.push(admitted);
                    }
                }
            }
        }
    }

    /// Retry orphans whose missing input is now visible.
    fn reprocess_orphans(&mut self, utxos: &mut UtxoSet, now: u64) -> usize {
        let outputs = &self.outputs;
        let ready = self
            .orphans
            .take_resolved(|r| utxos.contains(r) || outputs.contains_key(r));
        let mut admitted = 0;
        for orphan in ready {
            if let Some(txid) = self.readmit_orphan(orphan, utxos, now) {
                admitted += 1;
                self.promote_orphans(txid, utxos, now);
            }
        }
        admitted
    }

    fn readmit_orphan(&mut self, orphan: Transaction, utxos: &mut UtxoSet, now: u64) -> Option<TxId> {
        let txid = orphan.txid;
        match self.admit(orphan, utxos, now, now) {
            Ok(Admission::Orphaned { .. }) => None,
            Ok(_) => {
                debug!(%txid, "Orphan transaction admitted");
                Some(txid)
            }
            Err(err) => {
                debug!(%txid, %err, "Orphan transaction dropped");
                None
            }
        }
    }

    /// Transactions for a block template, at most `max_bytes` in total.
    ///
    /// Walks the fee order once and skips any transaction whose in-pool
    /// parents or lower-nonce siblings have not been taken yet, so the
    /// result is valid in order and non-increasing in fee rate.
    pub fn select_for_block(&self, max_bytes: usize) -> Vec<Transaction> {
        let mut selected = Vec::new();
        let mut chosen: HashSet<TxId> = HashSet::new();
        let mut used = 0usize;

        for key in &self.order {
            let Some(entry) = self.entries.get(&key.txid) else { continue };
            if used + entry.size > max_bytes {
                continue;
            }
            if !self.dependencies_met(entry, &chosen) {
                continue;
            }
            used += entry.size;
            chosen.insert(entry.tx.txid);
            selected.push(entry.tx.clone());
        }
        selected
    }

    fn dependencies_met(&self, entry: &PooledTransaction, chosen: &HashSet<TxId>) -> bool {
        let parents_ok = entry.tx.inputs.iter().all(|input| {
            self.outputs
                .get(input)
                .map_or(true, |parent| chosen.contains(parent))
        });
        let nonces_ok = self.by_sender.get(&entry.tx.sender).map_or(true, |set| {
            set.iter()
                .take_while(|(nonce, _)| *nonce < entry.tx.nonce)
                .all(|(_, id)| chosen.contains(id))
        });
        parents_ok && nonces_ok
    }

    /// Reconcile with a block already applied to `utxos`.
    ///
    /// Removes the block's transactions, evicts pooled transactions that
    /// conflict with its inputs or reuse a now-confirmed nonce, and retries
    /// orphans. Returns the evicted conflicts.
    pub fn remove_confirmed(
        &mut self,
        block_txs: &[Transaction],
        utxos: &mut UtxoSet,
        now: u64,
    ) -> Vec<TxId> {
        let mut confirmed = 0usize;
        for tx in block_txs.iter().filter(|tx| !tx.is_coinbase()) {
            if self.remove_entry(&tx.txid, utxos).is_some() {
                confirmed += 1;
            }
            self.orphans.remove(&tx.txid);
        }

        let mut evicted = Vec::new();
        for input in block_txs.iter().flat_map(|tx| tx.inputs.iter()) {
            if let Some(holder) = self.spends.get(input).copied() {
                evicted.extend(self.evict_with_descendants(&holder, utxos));
            }
        }

        let senders: BTreeSet<&Address> = block_txs
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .map(|tx| &tx.sender)
            .collect();
        for sender in senders {
            let Some(confirmed_nonce) = utxos.confirmed_nonce(sender) else { continue };
            let stale: Vec<TxId> = self
                .by_sender
                .get(sender)
                .map(|set| {
                    set.iter()
                        .take_while(|(nonce, _)| *nonce <= confirmed_nonce)
                        .map(|(_, id)| *id)
                        .collect()
                })
                .unwrap_or_default();
            for id in stale {
                if self.entries.contains_key(&id) {
                    evicted.extend(self.evict_with_descendants(&id, utxos));
                }
            }
        }

        let promoted = self.reprocess_orphans(utxos, now);
        debug!(
            confirmed,
            conflicts = evicted.len(),
            promoted,
            remaining = self.entries.len(),
            "Reconciled mempool with block"
        );
        evicted
    }

    /// Evict holders of expired reservations and drop expired orphans.
    pub fn evict_expired(&mut self, utxos: &mut UtxoSet, now: u64) -> Vec<TxId> {
        let mut evicted = Vec::new();
        for holder in utxos.expire_reservations(now) {
            if self.entries.contains_key(&holder) {
                evicted.extend(self.evict_with_descendants(&holder, utxos));
            }
        }
        let orphans = self.orphans.expire(now);
        if !evicted.is_empty() || !orphans.is_empty() {
            info!(
                evicted = evicted.len(),
                orphans = orphans.len(),
                "Expired pending transactions"
            );
        }
        evicted
    }

    /// Re-run admission for every entry against the current state, in
    /// arrival order. Returns the transactions dropped as invalid; entries
    /// whose inputs vanished are parked as orphans.
    pub fn revalidate(&mut self, utxos: &mut UtxoSet, now: u64) -> Vec<TxId> {
        let mut pooled: Vec<PooledTransaction> = self.entries.values().cloned().collect();
        pooled.sort_by_key(|e| e.sequence);
        for entry in &pooled {
            self.remove_entry(&entry.tx.txid, utxos);
        }

        let mut dropped = Vec::new();
        for entry in pooled {
            let txid = entry.tx.txid;
            if let Err(err) = self.admit(entry.tx, utxos, now, entry.insertion_time) {
                debug!(%txid, %err, "Dropped transaction on revalidation");
                dropped.push(txid);
            }
        }
        self.reprocess_orphans(utxos, now);

        if !dropped.is_empty() {
            info!(dropped = dropped.len(), "Revalidated mempool");
        }
        dropped
    }

    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            tx_count: self.entries.len(),
            total_bytes: self.total_bytes,
            orphan_count: self.orphans.len(),
            min_fee_rate: self.effective_min_fee_rate(),
            lowest_fee_rate: self.order.iter().next_back().map_or(0.0, FeeOrdering::fee_per_byte),
            highest_fee_rate: self.order.iter().next().map_or(0.0, FeeOrdering::fee_per_byte),
        }
    }

    pub fn snapshot(&self) -> MempoolSnapshot {
        MempoolSnapshot {
            entries: self
                .order
                .iter()
                .filter_map(|o| self.entries.get(&o.txid).cloned())
                .collect(),
            stats: self.stats(),
        }
    }
}
