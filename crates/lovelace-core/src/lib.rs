//! # lovelace-core
//! Foundation types and traits for building Lovelace transactions.
//!
//! - [`address`] — Shelley address codec (Bech32 text, header byte + credentials)
//! - [`types`] — hashes, inputs, outputs, bodies, witnesses, signed transactions
//! - [`cbor`] — canonical CBOR encoding of the transaction model
//! - [`crypto`] — Blake2b digests, verification keys and signatures
//! - [`params`] — protocol parameter snapshot and fee/min-ADA arithmetic
//! - [`traits`] — `LedgerQuery` and `TxSigner` seams

pub mod address;
pub mod cbor;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod params;
pub mod traits;
pub mod types;
