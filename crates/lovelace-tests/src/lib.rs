//! Cross-crate test suite for Lovelace.
//!
//! Integration tests live under `tests/`: the end-to-end payment flows
//! (offline snapshot and mocked live services) and property tests for the
//! builder, address codec, key derivation and transaction encoding.

pub mod helpers;
