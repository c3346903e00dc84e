//! BIP-39 mnemonics and Icarus root key generation.

use bip39::{Language, Mnemonic};
use sha2::Sha512;
use zeroize::Zeroize;

use crate::error::WalletError;
use crate::keys::{ExtendedPrivateKey, XPRV_LEN};

/// PBKDF2 rounds for the Icarus master key.
const ICARUS_ROUNDS: u32 = 4096;

/// Generate a fresh English mnemonic of 12, 15, 18, 21 or 24 words.
pub fn generate_mnemonic(words: usize) -> Result<String, WalletError> {
    use rand::RngCore;
    if !(12..=24).contains(&words) || words % 3 != 0 {
        return Err(WalletError::InvalidMnemonic(format!("unsupported word count {words}")));
    }
    let mut entropy = vec![0u8; words / 3 * 4];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let m = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()));
    entropy.zeroize();
    Ok(m?.to_string())
}

/// Parse a phrase, normalizing whitespace and case.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Icarus master key: PBKDF2-HMAC-SHA512 over the mnemonic entropy, clamped.
pub fn root_key_from_entropy(entropy: &[u8], passphrase: &str) -> ExtendedPrivateKey {
    let mut out = [0u8; XPRV_LEN];
    pbkdf2::pbkdf2_hmac::<Sha512>(passphrase.as_bytes(), entropy, ICARUS_ROUNDS, &mut out);
    let key = ExtendedPrivateKey::from_unclamped(out);
    out.zeroize();
    key
}

/// Root key for a mnemonic phrase and optional passphrase.
pub fn root_key_from_mnemonic(phrase: &str, passphrase: &str) -> Result<ExtendedPrivateKey, WalletError> {
    let mut entropy = parse_mnemonic(phrase)?.to_entropy();
    let key = root_key_from_entropy(&entropy, passphrase);
    entropy.zeroize();
    Ok(key)
}
