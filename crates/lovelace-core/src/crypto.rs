//! Digests, verification keys and signatures.
//!
//! Credentials are Blake2b-224 digests of 32-byte Ed25519 verification keys;
//! transaction ids and auxiliary data hashes are Blake2b-256. Witnesses carry
//! the raw verification key and a 64-byte Ed25519 signature over the body
//! hash, so a verifier needs nothing beyond the transaction bytes.

use blake2::digest::consts::{U28, U32};
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::constants::{SIGNATURE_LEN, VKEY_LEN};
use crate::error::CryptoError;
use crate::traits::TxSigner;
use crate::types::{Hash28, Hash32, KeyHash};

/// Blake2b with a 224-bit output.
pub fn blake2b_224(data: &[u8]) -> Hash28 {
    Hash28::from_bytes(Blake2b::<U28>::digest(data).into())
}

/// Blake2b with a 256-bit output.
pub fn blake2b_256(data: &[u8]) -> Hash32 {
    Hash32::from_bytes(Blake2b::<U32>::digest(data).into())
}

/// Raw 32-byte Ed25519 verification key as carried in witnesses.
///
/// The bytes are not validated on construction; [`verify`](Self::verify)
/// rejects keys that are not valid curve points.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerificationKey([u8; VKEY_LEN]);

impl VerificationKey {
    pub fn from_bytes(bytes: [u8; VKEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; VKEY_LEN] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; VKEY_LEN] {
        &self.0
    }

    /// Credential hash of this key.
    pub fn hash(&self) -> KeyHash {
        blake2b_224(&self.0)
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CryptoError::InvalidVerificationKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        vk.verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<ed25519_dalek::VerifyingKey> for VerificationKey {
    fn from(vk: ed25519_dalek::VerifyingKey) -> Self {
        Self(vk.to_bytes())
    }
}

impl Serialize for VerificationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for VerificationKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let array: [u8; VKEY_LEN] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("verification key must be 32 bytes"))?;
        Ok(Self(array))
    }
}

/// 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

impl From<ed25519_dalek::Signature> for Signature {
    fn from(sig: ed25519_dalek::Signature) -> Self {
        Self(sig.to_bytes())
    }
}

/// Plain (non-extended) Ed25519 keys can witness transactions directly.
impl TxSigner for ed25519_dalek::SigningKey {
    fn verification_key(&self) -> VerificationKey {
        self.verifying_key().into()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        Signer::sign(self, message).into()
    }
}
