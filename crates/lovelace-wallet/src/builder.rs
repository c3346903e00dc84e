//! Transaction builder with fee fixed point, change policy and signing.
//!
//! Provides a builder pattern for constructing transactions:
//! 1. Add inputs, outputs, TTL and optional message (state `Assembling`)
//! 2. Balance with [`add_change_if_needed`](TransactionBuilder::add_change_if_needed)
//!    or fix the fee by hand with [`set_fee`](TransactionBuilder::set_fee) (`Balanced`)
//! 3. Sign with one or more keys (`Signed`)
//! 4. [`build`](TransactionBuilder::build) the final transaction (`Built`)
//!
//! # Fee
//!
//! The fee is linear in the size of the *signed* transaction, and the size
//! depends on the fee's own encoded width. Balancing therefore starts from a
//! zero fee and raises it to `min_fee(size)` until the size stops growing.
//! Sizes are measured with placeholder witnesses, one per distinct payment
//! key among the inputs, of the same byte width as real witnesses.
//!
//! # Change
//!
//! Change at or above the min-ADA floor becomes the last output. Change
//! below the floor is added to the fee. A shortfall is
//! [`WalletError::InsufficientFunds`]. Balancing failures are latched:
//! every later call, including `build()`, returns the same error.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use lovelace_core::address::Address;
use lovelace_core::crypto::{Signature, VerificationKey};
use lovelace_core::error::TransactionError;
use lovelace_core::params::ProtocolParameters;
use lovelace_core::traits::TxSigner;
use lovelace_core::types::{
    AuxiliaryData, KeyHash, Transaction, TransactionBody, TxOut, Utxo, WitnessSet,
};

use crate::error::WalletError;

/// Upper bound on fee fixed-point rounds.
pub const MAX_FEE_ITERATIONS: usize = 8;

/// Lifecycle of a [`TransactionBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderState {
    Empty,
    Assembling,
    Balanced,
    Signed,
    Built,
}

/// How the fee was settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeReport {
    /// Fee written into the body.
    pub fee: u64,
    /// Linear minimum for the final size.
    pub required_fee: u64,
    /// Signed size (with placeholder witnesses) the fee was computed for.
    pub size: usize,
    /// Fixed-point rounds taken.
    pub iterations: usize,
    /// Amount of the appended change output, if any.
    pub change: Option<u64>,
    /// Sub-floor change folded into the fee.
    pub absorbed: u64,
}

/// Builder for one transaction. Build another by constructing a new builder.
///
/// # Example
/// ```ignore
/// let mut builder = TransactionBuilder::new(params);
/// builder.add_input(utxo)?.add_output(TxOut::new(to, 5_000_000))?.set_ttl(tip + 300)?;
/// builder.add_change_if_needed(&from)?;
/// builder.sign(&[&payment_key])?;
/// let tx = builder.build()?;
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    params: Arc<ProtocolParameters>,
    state: BuilderState,
    inputs: Vec<Utxo>,
    outputs: Vec<TxOut>,
    ttl: Option<u64>,
    tip: Option<u64>,
    fee: Option<u64>,
    auxiliary_data: Option<AuxiliaryData>,
    witnesses: WitnessSet,
    report: Option<FeeReport>,
    failure: Option<WalletError>,
}

struct Settled {
    body: TransactionBody,
    fee: u64,
    size: usize,
    required: u64,
    iterations: usize,
}

impl TransactionBuilder {
    pub fn new(params: Arc<ProtocolParameters>) -> Self {
        Self {
            params,
            state: BuilderState::Empty,
            inputs: Vec::new(),
            outputs: Vec::new(),
            ttl: None,
            tip: None,
            fee: None,
            auxiliary_data: None,
            witnesses: WitnessSet::new(),
            report: None,
            failure: None,
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn params(&self) -> &ProtocolParameters {
        &self.params
    }

    /// Fee settlement details once balanced.
    pub fn fee_report(&self) -> Option<&FeeReport> {
        self.report.as_ref()
    }

    pub fn inputs(&self) -> &[Utxo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    /// Add an input. The same reference may only be added once.
    pub fn add_input(&mut self, utxo: Utxo) -> Result<&mut Self, WalletError> {
        self.ensure_assembling("add_input")?;
        if self.inputs.iter().any(|u| u.input == utxo.input) {
            return Err(WalletError::DuplicateInput(utxo.input.to_string()));
        }
        debug!(input = %utxo.input, amount = utxo.amount, "input added");
        self.inputs.push(utxo);
        self.state = BuilderState::Assembling;
        Ok(self)
    }

    /// Add an output, rejecting amounts below its min-ADA floor.
    pub fn add_output(&mut self, output: TxOut) -> Result<&mut Self, WalletError> {
        self.ensure_assembling("add_output")?;
        let minimum = self.params.min_ada_for(&output)?;
        if output.amount < minimum {
            return Err(WalletError::DustOutput { amount: output.amount, minimum });
        }
        self.outputs.push(output);
        self.state = BuilderState::Assembling;
        Ok(self)
    }

    /// Last valid slot. Not checked against the chain unless a tip is supplied.
    pub fn set_ttl(&mut self, slot: u64) -> Result<&mut Self, WalletError> {
        self.ensure_assembling("set_ttl")?;
        self.ttl = Some(slot);
        Ok(self)
    }

    /// Current tip, used only to warn about an already expired TTL.
    pub fn with_tip(&mut self, slot: u64) -> &mut Self {
        self.tip = Some(slot);
        self
    }

    /// Attach auxiliary data; its hash goes into the body.
    pub fn set_auxiliary_data(&mut self, aux: AuxiliaryData) -> Result<&mut Self, WalletError> {
        self.ensure_assembling("set_auxiliary_data")?;
        self.auxiliary_data = Some(aux);
        Ok(self)
    }

    /// Attach a transaction message.
    pub fn set_message(&mut self, text: &str) -> Result<&mut Self, WalletError> {
        self.set_auxiliary_data(AuxiliaryData::message(text))
    }

    /// Fix the fee by hand and skip change handling.
    ///
    /// `build()` still enforces the balance equation and the minimum fee.
    pub fn set_fee(&mut self, fee: u64) -> Result<&mut Self, WalletError> {
        self.ensure_assembling("set_fee")?;
        if self.inputs.is_empty() {
            return Err(WalletError::EmptyInputSet);
        }
        self.fee = Some(fee);
        self.state = BuilderState::Balanced;
        Ok(self)
    }

    /// Settle the fee and add a change output to `change_address` when the
    /// remainder clears the min-ADA floor.
    pub fn add_change_if_needed(&mut self, change_address: &Address) -> Result<&mut Self, WalletError> {
        self.ensure_assembling("add_change_if_needed")?;
        match self.balance(change_address) {
            Ok(()) => Ok(self),
            Err(e) => {
                warn!(error = %e, "balancing failed");
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    fn balance(&mut self, change_address: &Address) -> Result<(), WalletError> {
        if self.inputs.is_empty() {
            return Err(WalletError::EmptyInputSet);
        }
        let total_in = self.total_input()?;
        let total_out = self.total_output()?;

        // Without change: the least this transaction can cost.
        let bare = self.settle(None, total_in, total_out)?;
        let need = total_out.checked_add(bare.fee).ok_or(TransactionError::ValueOverflow)?;
        if total_in < need {
            return Err(WalletError::InsufficientFunds { have: total_in, need });
        }

        let (settled, change, absorbed) = match self.settle(Some(change_address), total_in, total_out) {
            Ok(with_change) => {
                let mut floor_met = None;
                if let Some(out) = with_change.body.outputs.last() {
                    if out.amount >= self.params.min_ada_for(out)? {
                        floor_met = Some(out.amount);
                    }
                }
                match floor_met {
                    Some(amount) => (with_change, Some(amount), 0),
                    None => self.absorb(total_in, total_out, &bare)?,
                }
            }
            Err(WalletError::InsufficientFunds { .. }) => self.absorb(total_in, total_out, &bare)?,
            Err(e) => return Err(e),
        };

        let max = self.params.max_tx_bytes();
        if settled.size > max {
            return Err(TransactionError::SerializationLimitExceeded { size: settled.size, max }.into());
        }

        info!(
            fee = settled.fee,
            size = settled.size,
            iterations = settled.iterations,
            change = ?change,
            absorbed,
            "transaction balanced"
        );
        self.outputs = settled.body.outputs;
        self.fee = Some(settled.fee);
        self.report = Some(FeeReport {
            fee: settled.fee,
            required_fee: settled.required,
            size: settled.size,
            iterations: settled.iterations,
            change,
            absorbed,
        });
        self.state = BuilderState::Balanced;
        Ok(())
    }

    /// Fold everything above the outputs into the fee.
    fn absorb(
        &self,
        total_in: u64,
        total_out: u64,
        bare: &Settled,
    ) -> Result<(Settled, Option<u64>, u64), WalletError> {
        let fee = total_in - total_out;
        let body = self.body_with(self.outputs.clone(), fee);
        let size = self.estimated_size(&body)?;
        let required = self.params.min_fee(size)?;
        if required > fee {
            return Err(WalletError::InsufficientFunds {
                have: total_in,
                need: total_out.saturating_add(required),
            });
        }
        let absorbed = fee - bare.fee;
        debug!(fee, absorbed, "change below floor absorbed into fee");
        let settled = Settled { body, fee, size, required, iterations: bare.iterations };
        Ok((settled, None, absorbed))
    }

    /// Raise the fee from zero until it covers the linear minimum for the size.
    fn settle(
        &self,
        change_address: Option<&Address>,
        total_in: u64,
        total_out: u64,
    ) -> Result<Settled, WalletError> {
        let mut fee = 0u64;
        for iteration in 1..=MAX_FEE_ITERATIONS {
            let mut outputs = self.outputs.clone();
            if let Some(address) = change_address {
                let change = total_in
                    .checked_sub(total_out)
                    .and_then(|v| v.checked_sub(fee))
                    .ok_or(WalletError::InsufficientFunds {
                        have: total_in,
                        need: total_out.saturating_add(fee),
                    })?;
                outputs.push(TxOut::new(*address, change));
            }
            let body = self.body_with(outputs, fee);
            let size = self.estimated_size(&body)?;
            let required = self.params.min_fee(size)?;
            debug!(iteration, fee, size, required, with_change = change_address.is_some(), "fee iteration");
            if required <= fee {
                return Ok(Settled { body, fee, size, required, iterations: iteration });
            }
            fee = required;
        }
        Err(WalletError::FeeDidNotConverge { iterations: MAX_FEE_ITERATIONS })
    }

    /// Add one witness per distinct signer.
    ///
    /// A key that controls none of the inputs is accepted with a warning;
    /// the ledger will reject the transaction if a required witness is missing.
    pub fn sign(&mut self, signers: &[&dyn TxSigner]) -> Result<&mut Self, WalletError> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        match self.state {
            BuilderState::Balanced | BuilderState::Signed => {}
            other => {
                return Err(WalletError::InvalidState(format!("cannot sign in state {other:?}")));
            }
        }
        let body_hash = self.body().hash()?;
        let required = self.input_key_hashes();
        for signer in signers {
            let key_hash = signer.key_hash();
            if !required.contains(&key_hash) {
                warn!(%key_hash, "signing key does not control any input");
            }
            let signature = signer.sign(body_hash.as_bytes());
            self.witnesses.insert(signer.verification_key(), signature);
        }
        debug!(witnesses = self.witnesses.len(), %body_hash, "signed");
        self.state = BuilderState::Signed;
        Ok(self)
    }

    /// Produce the final transaction.
    pub fn build(&mut self) -> Result<Transaction, WalletError> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        if self.state == BuilderState::Built {
            return Err(WalletError::InvalidState("already built".into()));
        }
        if self.inputs.is_empty() {
            return Err(WalletError::EmptyInputSet);
        }

        let inputs = self.total_input()?;
        let outputs = self.total_output()?;
        let fee = self.fee.unwrap_or(0);
        if outputs.checked_add(fee) != Some(inputs) {
            return Err(WalletError::Unbalanced { inputs, outputs, fee });
        }

        if let (Some(ttl), Some(tip)) = (self.ttl, self.tip) {
            if ttl <= tip {
                warn!(ttl, tip, "ttl is not after the supplied tip; the ledger will reject this transaction");
            }
        }

        let tx = Transaction {
            body: self.body(),
            witness_set: self.witnesses.clone(),
            auxiliary_data: self.auxiliary_data.clone(),
        };
        let bytes = tx.to_bytes_checked(self.params.max_tx_bytes())?;
        let minimum = self.params.min_fee(bytes.len())?;
        if fee < minimum {
            return Err(WalletError::FeeBelowMinimum { fee, minimum });
        }

        info!(tx_hash = %tx.id()?, size = bytes.len(), fee, witnesses = tx.witness_set.len(), "transaction built");
        self.state = BuilderState::Built;
        Ok(tx)
    }

    /// Body as currently assembled.
    pub fn body(&self) -> TransactionBody {
        self.body_with(self.outputs.clone(), self.fee.unwrap_or(0))
    }

    pub fn total_input(&self) -> Result<u64, WalletError> {
        self.inputs
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.amount))
            .ok_or(WalletError::Transaction(TransactionError::ValueOverflow))
    }

    pub fn total_output(&self) -> Result<u64, WalletError> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
            .ok_or(WalletError::Transaction(TransactionError::ValueOverflow))
    }

    /// Distinct payment key hashes of the inputs being spent.
    pub fn input_key_hashes(&self) -> BTreeSet<KeyHash> {
        self.inputs
            .iter()
            .filter_map(|u| u.address.payment_key_hash())
            .collect()
    }

    fn ensure_assembling(&self, op: &str) -> Result<(), WalletError> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        match self.state {
            BuilderState::Empty | BuilderState::Assembling => Ok(()),
            other => Err(WalletError::InvalidState(format!("{op} not allowed in state {other:?}"))),
        }
    }

    fn body_with(&self, outputs: Vec<TxOut>, fee: u64) -> TransactionBody {
        TransactionBody {
            inputs: self.inputs.iter().map(|u| u.input).collect(),
            outputs,
            fee,
            ttl: self.ttl,
            auxiliary_data_hash: self
                .auxiliary_data
                .as_ref()
                .and_then(|aux| aux.hash().ok()),
        }
    }

    /// Signed size with one placeholder witness per distinct input key.
    fn estimated_size(&self, body: &TransactionBody) -> Result<usize, WalletError> {
        let count = self.input_key_hashes().len().max(1);
        let mut witness_set = WitnessSet::new();
        for i in 0..count {
            let mut vkey = [0u8; 32];
            vkey[..8].copy_from_slice(&(i as u64).to_le_bytes());
            witness_set.insert(VerificationKey::from_bytes(vkey), Signature::from_bytes([0u8; 64]));
        }
        let tx = Transaction {
            body: body.clone(),
            witness_set,
            auxiliary_data: self.auxiliary_data.clone(),
        };
        Ok(tx.to_bytes()?.len())
    }
}
