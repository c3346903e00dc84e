//! Wallet error types.

use lovelace_core::error::{AddressError, CryptoError, ErrorCategory, QueryError, TransactionError};
use thiserror::Error;

/// Errors that can occur while deriving keys or building transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Root or extended key bytes are malformed.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// A hardened step was requested from a public-only key.
    #[error("hardened derivation at index {0:#x} requires the private key")]
    HardenedDerivationUnavailable(u32),

    /// Derivation path text or steps are malformed.
    #[error("invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// The same input reference was added twice.
    #[error("duplicate input: {0}")]
    DuplicateInput(String),

    /// Output below the minimum-ADA floor.
    #[error("dust output: {amount} below minimum {minimum}")]
    DustOutput {
        /// Requested amount in lovelace.
        amount: u64,
        /// Floor for this output in lovelace.
        minimum: u64,
    },

    /// Inputs do not cover outputs plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Available value in lovelace.
        have: u64,
        /// Required value in lovelace.
        need: u64,
    },

    /// `build()` was called without any inputs.
    #[error("transaction has no inputs")]
    EmptyInputSet,

    /// `sum(inputs) != sum(outputs) + fee` at build time.
    #[error("unbalanced transaction: inputs {inputs}, outputs {outputs}, fee {fee}")]
    Unbalanced { inputs: u64, outputs: u64, fee: u64 },

    /// A manually set fee is below the linear minimum for the final size.
    #[error("fee {fee} below minimum {minimum}")]
    FeeBelowMinimum { fee: u64, minimum: u64 },

    /// The fee fixed point did not settle.
    #[error("fee did not converge after {iterations} iterations")]
    FeeDidNotConverge { iterations: usize },

    /// Operation not allowed in the builder's current state.
    #[error("invalid builder state: {0}")]
    InvalidState(String),

    /// Malformed address.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Encoding or size failure from lovelace-core.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Signature or key failure from lovelace-core.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Ledger query failure.
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl WalletError {
    /// Where this error sits in the input / policy / remote taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            WalletError::InvalidSeed(_)
            | WalletError::HardenedDerivationUnavailable(_)
            | WalletError::InvalidDerivationPath(_)
            | WalletError::InvalidMnemonic(_)
            | WalletError::DuplicateInput(_)
            | WalletError::InvalidState(_)
            | WalletError::Address(_)
            | WalletError::Crypto(_) => ErrorCategory::Input,
            WalletError::DustOutput { .. }
            | WalletError::InsufficientFunds { .. }
            | WalletError::EmptyInputSet
            | WalletError::Unbalanced { .. }
            | WalletError::FeeBelowMinimum { .. }
            | WalletError::FeeDidNotConverge { .. } => ErrorCategory::Policy,
            WalletError::Transaction(e) => e.category(),
            WalletError::Query(_) => ErrorCategory::Remote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_insufficient_funds() {
        let e = WalletError::InsufficientFunds { have: 100, need: 200 };
        assert_eq!(e.to_string(), "insufficient funds: have 100, need 200");
    }

    #[test]
    fn display_hardened_index_is_hex() {
        let e = WalletError::HardenedDerivationUnavailable(0x8000_0000);
        assert_eq!(e.to_string(), "hardened derivation at index 0x80000000 requires the private key");
    }

    #[test]
    fn clone_and_eq() {
        let e1 = WalletError::DustOutput { amount: 1, minimum: 2 };
        let e2 = e1.clone();
        assert_eq!(e1, e2);
    }

    #[test]
    fn from_address_error() {
        let wallet: WalletError = AddressError::InvalidChecksum.into();
        assert_eq!(wallet, WalletError::Address(AddressError::InvalidChecksum));
        assert_eq!(wallet.category(), ErrorCategory::Input);
    }

    #[test]
    fn from_transaction_error_keeps_category() {
        let wallet: WalletError =
            TransactionError::SerializationLimitExceeded { size: 20_000, max: 16_384 }.into();
        assert_eq!(wallet.category(), ErrorCategory::Policy);
    }

    #[test]
    fn policy_errors_are_policy() {
        for e in [
            WalletError::EmptyInputSet,
            WalletError::Unbalanced { inputs: 1, outputs: 1, fee: 1 },
            WalletError::FeeDidNotConverge { iterations: 8 },
            WalletError::InsufficientFunds { have: 0, need: 1 },
        ] {
            assert_eq!(e.category(), ErrorCategory::Policy);
        }
    }

    #[test]
    fn query_errors_are_remote() {
        let wallet: WalletError = QueryError::Timeout.into();
        assert_eq!(wallet.category(), ErrorCategory::Remote);
    }
}
