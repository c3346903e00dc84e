//! Hierarchical deterministic keys (BIP32-Ed25519, V2 derivation).
//!
//! An extended private key is 96 bytes: the 32-byte scalar half `kL`, the
//! 32-byte nonce half `kR` and a 32-byte chain code. Child keys are derived
//! with HMAC-SHA512 keyed by the chain code. Soft (non-hardened) children
//! can also be derived from the public half alone, which is what lets a
//! watch-only party compute receive addresses.
//!
//! Account layout follows CIP-1852: `m/1852'/1815'/account'/role/index` with
//! role 0 for external payment keys, 1 for change keys and 2 for the
//! stake key.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::hazmat::{raw_sign, ExpandedSecretKey};
use ed25519_dalek::VerifyingKey;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

use lovelace_core::address::{Address, Credential, Network};
use lovelace_core::crypto::{Signature, VerificationKey};
use lovelace_core::traits::TxSigner;
use lovelace_core::types::KeyHash;

use crate::error::WalletError;

/// Indices at or above this value are hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// CIP-1852 purpose.
pub const PURPOSE: u32 = 1852;

/// SLIP-44 coin type for ADA.
pub const COIN_TYPE: u32 = 1815;

/// External (receive) payment keys.
pub const ROLE_EXTERNAL: u32 = 0;

/// Internal (change) payment keys.
pub const ROLE_INTERNAL: u32 = 1;

/// Staking key.
pub const ROLE_STAKE: u32 = 2;

/// Extended private key length in bytes.
pub const XPRV_LEN: usize = 96;

const TAG_HARDENED_Z: u8 = 0x00;
const TAG_HARDENED_CC: u8 = 0x01;
const TAG_SOFT_Z: u8 = 0x02;
const TAG_SOFT_CC: u8 = 0x03;

/// Mark an index as hardened.
pub const fn harden(index: u32) -> u32 {
    index | HARDENED_OFFSET
}

pub const fn is_hardened(index: u32) -> bool {
    index >= HARDENED_OFFSET
}

/// A sequence of child indices, hardened ones carrying [`HARDENED_OFFSET`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    /// Build from `(index, hardened)` pairs. `index` must be below 2^31.
    pub fn from_steps(steps: &[(u32, bool)]) -> Result<Self, WalletError> {
        steps
            .iter()
            .map(|&(index, hardened)| {
                if is_hardened(index) {
                    return Err(WalletError::InvalidDerivationPath(format!(
                        "index {index} out of range"
                    )));
                }
                Ok(if hardened { harden(index) } else { index })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// `m/1852'/1815'/account'/role/index`.
    pub fn cip1852(account: u32, role: u32, index: u32) -> Self {
        Self(vec![harden(PURPOSE), harden(COIN_TYPE), harden(account), role, index])
    }

    /// Append one step.
    pub fn child(mut self, index: u32) -> Self {
        self.0.push(index);
        self
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }
}

impl FromStr for DerivationPath {
    type Err = WalletError;

    /// Parse `m/1852'/1815'/0'/0/0`. Both `'` and `h` mark hardened steps.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WalletError::InvalidDerivationPath(s.to_string());
        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(invalid());
        }
        let mut steps = Vec::new();
        for part in parts {
            let (digits, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let index: u32 = digits.parse().map_err(|_| invalid())?;
            steps.push((index, hardened));
        }
        Self::from_steps(&steps)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for &index in &self.0 {
            if is_hardened(index) {
                write!(f, "/{}'", index - HARDENED_OFFSET)?;
            } else {
                write!(f, "/{index}")?;
            }
        }
        Ok(())
    }
}

/// Extended private key `kL ‖ kR ‖ chain code`.
///
/// Secret material is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ExtendedPrivateKey {
    bytes: [u8; XPRV_LEN],
}

impl ExtendedPrivateKey {
    /// Wrap 96 raw bytes, checking that `kL` carries the Ed25519 clamping bits.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let bytes: [u8; XPRV_LEN] = bytes
            .try_into()
            .map_err(|_| WalletError::InvalidSeed(format!("expected {XPRV_LEN} bytes, got {}", bytes.len())))?;
        if bytes[0] & 0b111 != 0 || bytes[31] & 0x80 != 0 || bytes[31] & 0x40 == 0 {
            return Err(WalletError::InvalidSeed("scalar half is not clamped".into()));
        }
        Ok(Self { bytes })
    }

    /// Parse 192 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, WalletError> {
        let bytes = hex::decode(s.trim()).map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Clamp 96 bytes of key material into a root key (Icarus master key).
    pub(crate) fn from_unclamped(mut bytes: [u8; XPRV_LEN]) -> Self {
        bytes[0] &= 0b1111_1000;
        bytes[31] &= 0b0001_1111;
        bytes[31] |= 0b0100_0000;
        let key = Self { bytes };
        bytes.zeroize();
        key
    }

    /// Raw bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; XPRV_LEN] {
        &self.bytes
    }

    fn kl(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.bytes[..32]);
        out
    }

    fn kr(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.bytes[32..64]);
        out
    }

    pub fn chain_code(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.bytes[64..]);
        out
    }

    fn expanded(&self) -> ExpandedSecretKey {
        ExpandedSecretKey {
            scalar: Scalar::from_bytes_mod_order(self.kl()),
            hash_prefix: self.kr(),
        }
    }

    /// Public key `A = kL·G`.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        EdwardsPoint::mul_base(&Scalar::from_bytes_mod_order(self.kl()))
            .compress()
            .to_bytes()
    }

    /// The public half with the same chain code.
    pub fn public(&self) -> ExtendedPublicKey {
        ExtendedPublicKey {
            key: self.public_key_bytes(),
            chain_code: self.chain_code(),
        }
    }

    /// Derive one child.
    pub fn derive(&self, index: u32) -> Result<Self, WalletError> {
        let cc = self.chain_code();
        let index_le = index.to_le_bytes();
        let (z, c) = if is_hardened(index) {
            let secret = &self.bytes[..64];
            (
                hmac_sha512(&cc, &[&[TAG_HARDENED_Z], secret, &index_le])?,
                hmac_sha512(&cc, &[&[TAG_HARDENED_CC], secret, &index_le])?,
            )
        } else {
            let public = self.public_key_bytes();
            (
                hmac_sha512(&cc, &[&[TAG_SOFT_Z], &public, &index_le])?,
                hmac_sha512(&cc, &[&[TAG_SOFT_CC], &public, &index_le])?,
            )
        };

        let mut bytes = [0u8; XPRV_LEN];
        bytes[..32].copy_from_slice(&add_28_mul8(&self.kl(), &z[..28]));
        bytes[32..64].copy_from_slice(&add_256(&self.kr(), &z[32..]));
        bytes[64..].copy_from_slice(&c[32..]);
        let child = Self { bytes };
        bytes.zeroize();
        Ok(child)
    }

    /// Derive along every step of `path`.
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, WalletError> {
        let mut key = self.clone();
        for &index in path.indices() {
            key = key.derive(index)?;
        }
        Ok(key)
    }
}

impl Clone for ExtendedPrivateKey {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivateKey")
            .field("public", &hex::encode(self.public_key_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TxSigner for ExtendedPrivateKey {
    fn verification_key(&self) -> VerificationKey {
        VerificationKey::from_bytes(self.public_key_bytes())
    }

    fn sign(&self, message: &[u8]) -> Signature {
        let esk = self.expanded();
        let vk = VerifyingKey::from(&esk);
        raw_sign::<Sha512>(&esk, message, &vk).into()
    }
}

/// Extended public key: point `A` plus chain code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtendedPublicKey {
    key: [u8; 32],
    chain_code: [u8; 32],
}

impl ExtendedPublicKey {
    pub fn new(key: [u8; 32], chain_code: [u8; 32]) -> Self {
        Self { key, chain_code }
    }

    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey::from_bytes(self.key)
    }

    pub fn key_hash(&self) -> KeyHash {
        self.verification_key().hash()
    }

    pub fn chain_code(&self) -> [u8; 32] {
        self.chain_code
    }

    /// Derive a soft child. Hardened indices need the private key.
    pub fn derive(&self, index: u32) -> Result<Self, WalletError> {
        if is_hardened(index) {
            return Err(WalletError::HardenedDerivationUnavailable(index));
        }
        let index_le = index.to_le_bytes();
        let z = hmac_sha512(&self.chain_code, &[&[TAG_SOFT_Z], &self.key, &index_le])?;
        let c = hmac_sha512(&self.chain_code, &[&[TAG_SOFT_CC], &self.key, &index_le])?;

        let parent = CompressedEdwardsY(self.key)
            .decompress()
            .ok_or_else(|| WalletError::InvalidSeed("public key is not a curve point".into()))?;
        let tweak = Scalar::from_bytes_mod_order(add_28_mul8(&[0u8; 32], &z[..28]));
        let child = parent + EdwardsPoint::mul_base(&tweak);

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&c[32..]);
        Ok(Self {
            key: child.compress().to_bytes(),
            chain_code,
        })
    }

    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, WalletError> {
        path.indices().iter().try_fold(*self, |key, &index| key.derive(index))
    }
}

impl fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtendedPublicKey({})", hex::encode(self.key))
    }
}

/// Account-level key `m/1852'/1815'/account'` and the keys beneath it.
#[derive(Clone, Debug)]
pub struct AccountKey {
    key: ExtendedPrivateKey,
    account: u32,
}

impl AccountKey {
    /// Derive the account key from a root key.
    pub fn from_root(root: &ExtendedPrivateKey, account: u32) -> Result<Self, WalletError> {
        if is_hardened(account) {
            return Err(WalletError::InvalidDerivationPath(format!("account {account} out of range")));
        }
        let path = DerivationPath(vec![harden(PURPOSE), harden(COIN_TYPE), harden(account)]);
        Ok(Self {
            key: root.derive_path(&path)?,
            account,
        })
    }

    pub fn account(&self) -> u32 {
        self.account
    }

    /// Public half, from which every payment and stake key can be derived.
    pub fn public(&self) -> ExtendedPublicKey {
        self.key.public()
    }

    /// External payment key `role 0 / index`.
    pub fn payment_key(&self, index: u32) -> Result<ExtendedPrivateKey, WalletError> {
        self.key.derive(ROLE_EXTERNAL)?.derive(index)
    }

    /// Change key `role 1 / index`.
    pub fn change_key(&self, index: u32) -> Result<ExtendedPrivateKey, WalletError> {
        self.key.derive(ROLE_INTERNAL)?.derive(index)
    }

    /// Stake key `role 2 / 0`.
    pub fn stake_key(&self) -> Result<ExtendedPrivateKey, WalletError> {
        self.key.derive(ROLE_STAKE)?.derive(0)
    }

    /// Base address for payment key `index` delegated to the account's stake key.
    pub fn base_address(&self, network: Network, index: u32) -> Result<Address, WalletError> {
        let payment = self.payment_key(index)?.key_hash();
        let stake = self.stake_key()?.key_hash();
        Ok(Address::new(network, Credential::Key(payment), Some(Credential::Key(stake))))
    }

    /// Enterprise address for payment key `index`.
    pub fn enterprise_address(&self, network: Network, index: u32) -> Result<Address, WalletError> {
        let payment = self.payment_key(index)?.key_hash();
        Ok(Address::new(network, Credential::Key(payment), None))
    }

    /// Reward address of the stake key.
    pub fn reward_address(&self, network: Network) -> Result<Address, WalletError> {
        Ok(Address::reward(network, Credential::Key(self.stake_key()?.key_hash())))
    }
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 64], WalletError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(key)
        .map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// `x + 8·y` where `y` is the 28-byte little-endian `ZL`.
fn add_28_mul8(x: &[u8; 32], y: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry: u16 = 0;
    for i in 0..32 {
        let yi = if i < 28 { u16::from(y[i]) << 3 } else { 0 };
        let r = u16::from(x[i]) + yi + carry;
        out[i] = (r & 0xff) as u8;
        carry = r >> 8;
    }
    out
}

/// `x + y mod 2^256`, little-endian.
fn add_256(x: &[u8; 32], y: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry: u16 = 0;
    for i in 0..32 {
        let r = u16::from(x[i]) + u16::from(y[i]) + carry;
        out[i] = (r & 0xff) as u8;
        carry = r >> 8;
    }
    out
}
