//! Transaction validation pipeline.
//!
//! Stages run in a fixed order and stop at the first failure:
//!
//! 1. structure and size limits
//! 2. timestamp and fee floor
//! 3. address formats
//! 4. txid recomputation
//! 5. signature (skipped for coinbase)
//! 6. input resolution against confirmed then pending outputs
//! 7. value balance and fee rate
//! 8. sender nonce
//! 9. delegation of contract and governance transactions
//!
//! Stages 1-5 need no ledger state and may run in parallel across a block;
//! stages 6-9 read the [`LedgerView`].

use crate::address::{derive_address, validate_address};
use crate::crypto::verify_signature;
use crate::error::{SignatureError, ValidationError, ValidationResult};
use crate::ledger_view::{ContractExecutor, ExecutionOutcome, LedgerView};
use crate::types::{Address, Amount, Transaction, TxId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default maximum transaction size in bytes.
pub const DEFAULT_MAX_TX_BYTES: usize = 100_000;

/// Default maximum payload size for contract and governance calls.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// How sender nonces are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoncePolicy {
    /// Nonce must exceed every confirmed and pending nonce of the sender.
    #[default]
    Strict,
    /// A sender with no confirmed history skips the nonce check entirely,
    /// so its first pending transactions may share or reorder nonces.
    /// Compatibility mode; must be enabled explicitly.
    ExemptFirstSpend,
}

/// Transaction validator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_tx_bytes: usize,
    pub max_inputs: usize,
    pub max_outputs: usize,
    pub max_payload_bytes: usize,
    /// Absolute fee floor for relay.
    pub min_tx_fee: Amount,
    /// Fee-rate floor for relay, base units per byte.
    pub min_fee_rate: f64,
    pub max_future_drift_secs: u64,
    pub nonce_policy: NoncePolicy,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_tx_bytes: DEFAULT_MAX_TX_BYTES,
            max_inputs: 1_000,
            max_outputs: 1_000,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            min_tx_fee: 1_000,
            min_fee_rate: 1.0,
            max_future_drift_secs: 7200,
            nonce_policy: NoncePolicy::Strict,
        }
    }
}

/// Per-call validation context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationContext {
    /// Reference time for the timestamp check.
    pub now: u64,
    /// Fee-rate floor; only enforced with `policy_checks`.
    pub min_fee_rate: f64,
    /// Enforce relay policy (fee floor and fee rate). Off for block contents,
    /// which are judged by consensus rules only.
    pub policy_checks: bool,
}

impl ValidationContext {
    /// Context for admission to the pool.
    pub fn relay(now: u64, min_fee_rate: f64) -> Self {
        Self {
            now,
            min_fee_rate,
            policy_checks: true,
        }
    }

    /// Context for transactions inside a block with the given timestamp.
    pub fn block(timestamp: u64) -> Self {
        Self {
            now: timestamp,
            min_fee_rate: 0.0,
            policy_checks: false,
        }
    }
}

/// Summary of a transaction that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTx {
    pub txid: TxId,
    pub size: usize,
    pub input_total: Amount,
    pub fee: Amount,
    pub fee_rate: f64,
    /// Executor verdict for delegated transaction types.
    pub execution: Option<ExecutionOutcome>,
}

/// Transaction validator.
#[derive(Clone)]
pub struct TransactionValidator {
    config: ValidationConfig,
    address_prefix: String,
    executor: Option<Arc<dyn ContractExecutor>>,
}

impl fmt::Debug for TransactionValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionValidator")
            .field("config", &self.config)
            .field("address_prefix", &self.address_prefix)
            .field("executor", &self.executor.is_some())
            .finish()
    }
}

impl TransactionValidator {
    pub fn new(config: ValidationConfig, address_prefix: impl Into<String>) -> Self {
        Self {
            config,
            address_prefix: address_prefix.into(),
            executor: None,
        }
    }

    /// Attach the external contract / governance executor.
    pub fn with_executor(mut self, executor: Arc<dyn ContractExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn address_prefix(&self) -> &str {
        &self.address_prefix
    }

    /// Relay context at `now` with the configured fee-rate floor.
    pub fn relay_context(&self, now: u64) -> ValidationContext {
        ValidationContext::relay(now, self.config.min_fee_rate)
    }

    /// Run the full pipeline.
    #[instrument(skip_all, fields(txid = %tx.txid))]
    pub fn validate(
        &self,
        tx: &Transaction,
        view: &dyn LedgerView,
        ctx: &ValidationContext,
    ) -> ValidationResult<ValidatedTx> {
        self.check_stateless(tx, ctx)?;
        self.check_stateful(tx, view, ctx)
    }

    /// Stages 1-5.
    pub fn check_stateless(&self, tx: &Transaction, ctx: &ValidationContext) -> ValidationResult<()> {
        self.check_structure(tx)?;
        self.check_sanity(tx, ctx)?;
        self.check_formats(tx)?;
        check_txid(tx)?;
        if !tx.is_coinbase() {
            self.check_signature(tx)?;
        }
        Ok(())
    }

    /// Stages 6-9. Assumes `check_stateless` passed.
    pub fn check_stateful(
        &self,
        tx: &Transaction,
        view: &dyn LedgerView,
        ctx: &ValidationContext,
    ) -> ValidationResult<ValidatedTx> {
        let size = tx.size();
        if tx.is_coinbase() {
            return Ok(ValidatedTx {
                txid: tx.txid,
                size,
                input_total: 0,
                fee: 0,
                fee_rate: 0.0,
                execution: None,
            });
        }

        let input_total = resolve_inputs(tx, view)?;
        let fee_rate = check_value(tx, input_total, size, ctx)?;
        self.check_nonce(tx, view)?;
        let execution = self.delegate(tx, view)?;

        debug!(fee = tx.fee, fee_rate, size, "Transaction valid");
        Ok(ValidatedTx {
            txid: tx.txid,
            size,
            input_total,
            fee: tx.fee,
            fee_rate,
            execution,
        })
    }

    fn check_structure(&self, tx: &Transaction) -> ValidationResult<()> {
        let size = tx.size();
        if size > self.config.max_tx_bytes {
            return Err(ValidationError::TooLarge {
                size,
                max: self.config.max_tx_bytes,
            });
        }
        if tx.inputs.len() > self.config.max_inputs {
            return Err(ValidationError::TooManyInputs {
                count: tx.inputs.len(),
                max: self.config.max_inputs,
            });
        }
        if tx.outputs.len() > self.config.max_outputs {
            return Err(ValidationError::TooManyOutputs {
                count: tx.outputs.len(),
                max: self.config.max_outputs,
            });
        }

        if tx.is_coinbase() {
            if !tx.inputs.is_empty() {
                return Err(ValidationError::MalformedCoinbase("coinbase has inputs"));
            }
            if tx.outputs.is_empty() {
                return Err(ValidationError::MalformedCoinbase("coinbase has no outputs"));
            }
            if tx.fee != 0 {
                return Err(ValidationError::MalformedCoinbase("coinbase pays a fee"));
            }
            if tx.rbf_enabled || tx.replaces_txid.is_some() {
                return Err(ValidationError::MalformedCoinbase("coinbase is replaceable"));
            }
        } else {
            if tx.inputs.is_empty() {
                return Err(ValidationError::NoInputs);
            }
            if tx.outputs.is_empty() && !tx.tx_type.is_delegated() {
                return Err(ValidationError::NoOutputs);
            }
        }

        if let Some(index) = tx.outputs.iter().position(|o| o.amount == 0) {
            return Err(ValidationError::ZeroOutput { index });
        }

        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if !seen.insert(input) {
                return Err(ValidationError::DuplicateInput(*input));
            }
        }

        if tx.tx_type.is_delegated() {
            if tx.payload.is_empty() {
                return Err(ValidationError::InvalidPayload {
                    tx_type: tx.tx_type,
                    reason: "missing payload".to_string(),
                });
            }
            if tx.payload.len() > self.config.max_payload_bytes {
                return Err(ValidationError::InvalidPayload {
                    tx_type: tx.tx_type,
                    reason: format!("payload exceeds {} bytes", self.config.max_payload_bytes),
                });
            }
        } else if !tx.payload.is_empty() {
            return Err(ValidationError::InvalidPayload {
                tx_type: tx.tx_type,
                reason: "unexpected payload".to_string(),
            });
        }

        if tx.replaces_txid.is_some() && !tx.rbf_enabled {
            return Err(ValidationError::ReplacementNotEnabled);
        }

        if tx.output_total().is_none() {
            return Err(ValidationError::AmountOverflow);
        }
        Ok(())
    }

    fn check_sanity(&self, tx: &Transaction, ctx: &ValidationContext) -> ValidationResult<()> {
        let limit = ctx.now.saturating_add(self.config.max_future_drift_secs);
        if tx.timestamp > limit {
            return Err(ValidationError::TimestampInFuture {
                timestamp: tx.timestamp,
                limit,
            });
        }
        if ctx.policy_checks && !tx.is_coinbase() && tx.fee < self.config.min_tx_fee {
            return Err(ValidationError::FeeBelowFloor {
                fee: tx.fee,
                min: self.config.min_tx_fee,
            });
        }
        Ok(())
    }

    fn check_formats(&self, tx: &Transaction) -> ValidationResult<()> {
        self.check_address(&tx.sender)?;
        for output in &tx.outputs {
            self.check_address(&output.address)?;
        }
        Ok(())
    }

    fn check_address(&self, address: &Address) -> ValidationResult<()> {
        validate_address(address, &self.address_prefix).map_err(|reason| {
            ValidationError::InvalidAddress {
                address: address.to_string(),
                reason,
            }
        })
    }

    fn check_signature(&self, tx: &Transaction) -> ValidationResult<()> {
        if tx.public_key.is_empty() || tx.signature.is_empty() {
            return Err(SignatureError::Missing.into());
        }
        if derive_address(&tx.public_key, &self.address_prefix) != tx.sender {
            return Err(ValidationError::SenderMismatch {
                sender: tx.sender.to_string(),
            });
        }
        verify_signature(&tx.public_key, tx.txid.as_bytes(), &tx.signature)?;
        Ok(())
    }

    fn check_nonce(&self, tx: &Transaction, view: &dyn LedgerView) -> ValidationResult<()> {
        let confirmed = view.confirmed_nonce(&tx.sender);
        if confirmed.is_none() && self.config.nonce_policy == NoncePolicy::ExemptFirstSpend {
            return Ok(());
        }
        match confirmed.max(view.pending_nonce(&tx.sender)) {
            Some(last) if tx.nonce <= last => Err(ValidationError::NonceTooLow {
                nonce: tx.nonce,
                last,
            }),
            _ => Ok(()),
        }
    }

    fn delegate(
        &self,
        tx: &Transaction,
        view: &dyn LedgerView,
    ) -> ValidationResult<Option<ExecutionOutcome>> {
        if !tx.tx_type.is_delegated() {
            return Ok(None);
        }
        let executor = self
            .executor
            .as_ref()
            .ok_or(ValidationError::ExecutorUnavailable(tx.tx_type))?;
        let outcome = executor.execute(tx, view);
        if !outcome.success {
            return Err(ValidationError::ContractReverted(
                outcome
                    .reason
                    .clone()
                    .unwrap_or_else(|| "reverted".to_string()),
            ));
        }
        Ok(Some(outcome))
    }
}

fn check_txid(tx: &Transaction) -> ValidationResult<()> {
    let computed = tx.compute_txid();
    if computed != tx.txid {
        return Err(ValidationError::TxIdMismatch {
            declared: tx.txid,
            computed,
        });
    }
    Ok(())
}

fn resolve_inputs(tx: &Transaction, view: &dyn LedgerView) -> ValidationResult<Amount> {
    let mut total: Amount = 0;
    for input in &tx.inputs {
        let utxo = match view.utxo(input).or_else(|| view.pending_output(input)) {
            Some(utxo) => utxo,
            None if view.spent_by(input).is_some() => {
                return Err(ValidationError::DoubleSpend(*input))
            }
            None => return Err(ValidationError::MissingInput(*input)),
        };

        if let Some(holder) = view.reserved_by(input) {
            if holder != tx.txid {
                return Err(ValidationError::InputReserved {
                    utxo: *input,
                    holder,
                });
            }
        }

        if utxo.owner != tx.sender {
            return Err(ValidationError::InputNotOwned { utxo: *input });
        }

        total = total
            .checked_add(utxo.amount)
            .ok_or(ValidationError::AmountOverflow)?;
    }
    Ok(total)
}

fn check_value(
    tx: &Transaction,
    input_total: Amount,
    size: usize,
    ctx: &ValidationContext,
) -> ValidationResult<f64> {
    let outputs = tx.output_total().ok_or(ValidationError::AmountOverflow)?;
    let required = outputs
        .checked_add(tx.fee)
        .ok_or(ValidationError::AmountOverflow)?;
    if input_total != required {
        return Err(ValidationError::ValueImbalance {
            inputs: input_total,
            outputs,
            fee: tx.fee,
        });
    }

    let rate = if size == 0 {
        0.0
    } else {
        tx.fee as f64 / size as f64
    };
    if ctx.policy_checks && rate < ctx.min_fee_rate {
        return Err(ValidationError::FeeRateTooLow {
            rate,
            min: ctx.min_fee_rate,
        });
    }
    Ok(rate)
}
