//! Criterion benchmarks for lovelace-wallet.
//!
//! Covers: Icarus root key generation, CIP-1852 child derivation, and
//! transaction balancing with the fee fixed point.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lovelace_core::address::{Address, Credential, Network};
use lovelace_core::params::ProtocolParameters;
use lovelace_core::traits::TxSigner;
use lovelace_core::types::{Hash28, Hash32, TxIn, TxOut, Utxo};
use lovelace_wallet::keys::DerivationPath;
use lovelace_wallet::mnemonic::root_key_from_mnemonic;
use lovelace_wallet::{AccountKey, TransactionBuilder};

const PHRASE: &str = "eight country switch draw meat scout mystery blade tip drift useless good keep usage title";

fn bench_root_key(c: &mut Criterion) {
    c.bench_function("root_key_from_mnemonic", |b| {
        b.iter(|| root_key_from_mnemonic(black_box(PHRASE), "").expect("root key"))
    });
}

fn bench_derivation(c: &mut Criterion) {
    let root = root_key_from_mnemonic(PHRASE, "").expect("root key");
    let path: DerivationPath = "m/1852'/1815'/0'/0/0".parse().expect("path");
    let account = AccountKey::from_root(&root, 0).expect("account");
    let public = account.public();
    let soft: DerivationPath = "m/0/7".parse().expect("path");

    c.bench_function("derive_private_full_path", |b| {
        b.iter(|| root.derive_path(black_box(&path)).expect("derive"))
    });
    c.bench_function("derive_public_soft_path", |b| {
        b.iter(|| public.derive_path(black_box(&soft)).expect("derive"))
    });
}

fn bench_builder(c: &mut Criterion) {
    let params = Arc::new(ProtocolParameters::preview_defaults());
    let root = root_key_from_mnemonic(PHRASE, "").expect("root key");
    let account = AccountKey::from_root(&root, 0).expect("account");
    let key = account.payment_key(0).expect("payment key");
    let sender = account.enterprise_address(Network::Testnet, 0).expect("address");
    let receiver = Address::new(Network::Testnet, Credential::Key(Hash28::from_bytes([7; 28])), None);

    let balance = |inputs: usize| {
        let mut builder = TransactionBuilder::new(params.clone());
        for i in 0..inputs {
            let utxo = Utxo::new(TxIn::new(Hash32::from_bytes([i as u8; 32]), 0), sender, 10_000_000);
            builder.add_input(utxo).expect("input");
        }
        builder.add_output(TxOut::new(receiver, 2_000_000)).expect("output");
        builder.add_change_if_needed(&sender).expect("balance");
        builder
    };

    c.bench_function("balance_1_input", |b| b.iter(|| balance(black_box(1))));
    c.bench_function("balance_20_inputs", |b| b.iter(|| balance(black_box(20))));
    c.bench_function("balance_sign_build", |b| {
        b.iter(|| {
            let mut builder = balance(1);
            builder.sign(&[&key as &dyn TxSigner]).expect("sign");
            builder.build().expect("build")
        })
    });
}

criterion_group!(benches, bench_root_key, bench_derivation, bench_builder);
criterion_main!(benches);
