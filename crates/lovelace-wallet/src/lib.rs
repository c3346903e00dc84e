//! # lovelace-wallet — keys, selection and transaction building.
//!
//! Derives BIP32-Ed25519 keys from a mnemonic or root key, selects UTXOs,
//! balances transactions against a protocol parameter snapshot and signs
//! them.
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`keys`] — extended keys, derivation paths, CIP-1852 account keys
//! - [`mnemonic`] — BIP-39 phrases and Icarus root key generation
//! - [`coin_selection`] — first-covering UTXO selection
//! - [`builder`] — transaction builder with fee fixed point and change policy
//! - [`wallet`] — payment flow over an injected `LedgerQuery`

pub mod builder;
pub mod coin_selection;
pub mod error;
pub mod keys;
pub mod mnemonic;
pub mod wallet;

// Re-exports for convenient access
pub use builder::{BuilderState, FeeReport, TransactionBuilder};
pub use coin_selection::{CoinSelection, CoinSelector};
pub use error::WalletError;
pub use keys::{AccountKey, DerivationPath, ExtendedPrivateKey, ExtendedPublicKey};
pub use wallet::{PaymentRequest, Wallet};
