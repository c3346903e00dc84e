//! First-covering UTXO selection.
//!
//! Scans UTXOs in the order the query service returned them and takes the
//! first one whose amount covers the target. This is not globally optimal
//! (it may spend a large output when a smaller one later in the list would
//! do), but any covering input is acceptable to the ledger and the choice is
//! reproducible for a given listing.

use tracing::debug;

use lovelace_core::address::Address;
use lovelace_core::error::TransactionError;
use lovelace_core::params::ProtocolParameters;
use lovelace_core::types::{TxOut, Utxo};

use crate::error::WalletError;

/// Size budget used for the pre-selection fee estimate, in bytes.
pub const FEE_ESTIMATE_TX_SIZE: usize = 1024;

/// Result of coin selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    /// The chosen UTXO.
    pub selected: Utxo,
    /// Position of the chosen UTXO in the scanned listing.
    pub position: usize,
    /// Amount the UTXO had to cover.
    pub target: u64,
}

impl CoinSelection {
    /// Value left over once `target` is taken out.
    pub fn surplus(&self) -> u64 {
        self.selected.amount - self.target
    }
}

/// Greedy single-input selector.
pub struct CoinSelector;

impl CoinSelector {
    /// Amount a single input must cover to pay `send` with room for a
    /// change output to `change_address` and the fee:
    /// `send + change_floor + min_fee(1024)`.
    ///
    /// `change_floor` is the min-ADA value of a change output to that
    /// address carrying the widest possible amount.
    pub fn target_for(
        send: u64,
        change_address: &Address,
        params: &ProtocolParameters,
    ) -> Result<u64, WalletError> {
        let change_floor = params.min_ada_for(&TxOut::new(*change_address, u64::MAX))?;
        let fee_estimate = params.min_fee(FEE_ESTIMATE_TX_SIZE)?;
        send.checked_add(change_floor)
            .and_then(|v| v.checked_add(fee_estimate))
            .ok_or(WalletError::Transaction(TransactionError::ValueOverflow))
    }

    /// Pick the first UTXO whose amount is at least `target`.
    ///
    /// Fails with [`WalletError::InsufficientFunds`] when none qualifies;
    /// `have` then reports the largest single amount seen.
    pub fn first_covering(utxos: &[Utxo], target: u64) -> Result<CoinSelection, WalletError> {
        match utxos.iter().position(|u| u.amount >= target) {
            Some(position) => {
                let selected = utxos[position].clone();
                debug!(input = %selected.input, amount = selected.amount, target, position, "selected utxo");
                Ok(CoinSelection { selected, position, target })
            }
            None => {
                let have = utxos.iter().map(|u| u.amount).max().unwrap_or(0);
                debug!(candidates = utxos.len(), have, target, "no covering utxo");
                Err(WalletError::InsufficientFunds { have, need: target })
            }
        }
    }
}
