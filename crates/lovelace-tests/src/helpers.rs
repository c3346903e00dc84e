//! Shared fixtures for the end-to-end and property tests.

use std::sync::Arc;

use lovelace_client::LedgerSnapshot;
use lovelace_core::address::{Address, Credential, Network};
use lovelace_core::params::ProtocolParameters;
use lovelace_core::types::{ChainTip, Hash28, Hash32, TxIn, Utxo};
use lovelace_wallet::mnemonic::root_key_from_mnemonic;
use lovelace_wallet::{AccountKey, ExtendedPrivateKey};

/// Fixed phrase so derived addresses are stable across runs.
pub const TEST_MNEMONIC: &str =
    "eight country switch draw meat scout mystery blade tip drift useless good keep usage title";

/// Tip used by snapshot fixtures.
pub const TEST_TIP: u64 = 40_000_000;

pub fn test_root() -> ExtendedPrivateKey {
    root_key_from_mnemonic(TEST_MNEMONIC, "").unwrap()
}

pub fn test_account() -> AccountKey {
    AccountKey::from_root(&test_root(), 0).unwrap()
}

/// Enterprise address of payment key 0 on testnet.
pub fn sender_address() -> Address {
    test_account().enterprise_address(Network::Testnet, 0).unwrap()
}

/// Testnet enterprise address for a synthetic key hash.
pub fn key_address(seed: u8) -> Address {
    Address::new(Network::Testnet, Credential::Key(Hash28::from_bytes([seed; 28])), None)
}

pub fn utxo(seed: u8, index: u32, owner: Address, amount: u64) -> Utxo {
    Utxo::new(TxIn::new(Hash32::from_bytes([seed; 32]), index), owner, amount)
}

pub fn preview_params() -> Arc<ProtocolParameters> {
    Arc::new(ProtocolParameters::preview_defaults())
}

/// Snapshot in which `owner` holds one UTXO per amount, in order.
pub fn funded_snapshot(owner: Address, amounts: &[u64]) -> LedgerSnapshot {
    let utxos = amounts
        .iter()
        .enumerate()
        .map(|(i, &amount)| utxo(i as u8 + 1, 0, owner, amount))
        .collect();
    LedgerSnapshot::new(
        ProtocolParameters::preview_defaults(),
        ChainTip { slot: TEST_TIP, height: Some(1_000) },
        utxos,
    )
}
