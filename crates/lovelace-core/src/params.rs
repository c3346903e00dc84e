//! Protocol parameter snapshot.
//!
//! A snapshot is fetched once (or loaded from a file) and handed to every
//! builder that needs it. It is never mutated after construction, so one
//! `Arc<ProtocolParameters>` can be shared by any number of concurrent builds.

use serde::{Deserialize, Serialize};

use crate::constants::UTXO_ENTRY_OVERHEAD;
use crate::error::TransactionError;
use crate::types::TxOut;

/// Ledger protocol version.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ProtocolVersion {
    pub major: u64,
    pub minor: u64,
}

/// Network-wide constants governing fees, sizes and deposits.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProtocolParameters {
    /// Fee per byte of signed transaction.
    pub min_fee_a: u64,
    /// Constant fee per transaction.
    pub min_fee_b: u64,
    /// Maximum encoded size of a signed transaction, in bytes.
    pub max_tx_size: u64,
    pub max_value_size: u64,
    pub max_block_body_size: u64,
    pub max_block_header_size: u64,
    pub key_deposit: u64,
    pub pool_deposit: u64,
    /// Lovelace per byte of UTXO entry (Babbage min-ADA rule).
    pub coins_per_utxo_byte: u64,
    /// Absolute lower bound on any output.
    pub min_utxo_value: u64,
    pub collateral_percentage: u64,
    pub max_collateral_inputs: u64,
    pub protocol_version: ProtocolVersion,
}

impl ProtocolParameters {
    /// Values matching the preview test network at protocol version 8.
    pub fn preview_defaults() -> Self {
        Self {
            min_fee_a: 44,
            min_fee_b: 155_381,
            max_tx_size: 16_384,
            max_value_size: 5_000,
            max_block_body_size: 90_112,
            max_block_header_size: 1_100,
            key_deposit: 2_000_000,
            pool_deposit: 500_000_000,
            coins_per_utxo_byte: 4_310,
            min_utxo_value: 1_000_000,
            collateral_percentage: 150,
            max_collateral_inputs: 3,
            protocol_version: ProtocolVersion { major: 8, minor: 0 },
        }
    }

    /// Linear fee for a transaction of `size` bytes.
    pub fn min_fee(&self, size: usize) -> Result<u64, TransactionError> {
        (size as u64)
            .checked_mul(self.min_fee_a)
            .and_then(|v| v.checked_add(self.min_fee_b))
            .ok_or(TransactionError::ValueOverflow)
    }

    /// Smallest amount `output` may carry.
    pub fn min_ada_for(&self, output: &TxOut) -> Result<u64, TransactionError> {
        let entry_size = (output.encoded_len()? as u64)
            .checked_add(UTXO_ENTRY_OVERHEAD)
            .ok_or(TransactionError::ValueOverflow)?;
        let by_size = entry_size
            .checked_mul(self.coins_per_utxo_byte)
            .ok_or(TransactionError::ValueOverflow)?;
        Ok(by_size.max(self.min_utxo_value))
    }

    /// `max_tx_size` as a byte count.
    pub fn max_tx_bytes(&self) -> usize {
        usize::try_from(self.max_tx_size).unwrap_or(usize::MAX)
    }
}
