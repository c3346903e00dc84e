//! Transaction model: hashes, inputs, outputs, bodies, witnesses.
//!
//! All monetary values are in lovelace. Encoding to the ledger's binary
//! format lives in [`crate::cbor`]; the methods here delegate to it so the
//! hashed bytes and the transmitted bytes always come from one code path.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::cbor;
use crate::constants::{MESSAGE_METADATA_LABEL, METADATA_TEXT_MAX_LEN};
use crate::crypto::{blake2b_256, Signature, VerificationKey};
use crate::error::{CryptoError, TransactionError};
use crate::traits::TxSigner;

/// A fixed-width hash value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash<const BYTES: usize>(pub [u8; BYTES]);

/// Blake2b-224 digest: key and script credentials.
pub type Hash28 = Hash<28>;

/// Blake2b-256 digest: transaction ids and auxiliary data hashes.
pub type Hash32 = Hash<32>;

/// Hash of a verification key.
pub type KeyHash = Hash28;

/// Transaction id.
pub type TxHash = Hash32;

impl<const BYTES: usize> Hash<BYTES> {
    /// All-zero hash.
    pub const ZERO: Self = Self([0u8; BYTES]);

    pub fn from_bytes(bytes: [u8; BYTES]) -> Self {
        Self(bytes)
    }

    /// Copy from a slice, returning `None` on length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; BYTES] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; BYTES] {
        &self.0
    }
}

impl<const BYTES: usize> Default for Hash<BYTES> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const BYTES: usize> fmt::Display for Hash<BYTES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl<const BYTES: usize> fmt::Debug for Hash<BYTES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash<{BYTES}>({})", hex::encode(self.0))
    }
}

impl<const BYTES: usize> FromStr for Hash<BYTES> {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }
}

impl<const BYTES: usize> From<[u8; BYTES]> for Hash<BYTES> {
    fn from(bytes: [u8; BYTES]) -> Self {
        Self(bytes)
    }
}

impl<const BYTES: usize> AsRef<[u8]> for Hash<BYTES> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const BYTES: usize> Serialize for Hash<BYTES> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, const BYTES: usize> Deserialize<'de> for Hash<BYTES> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to an output of a previous transaction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxIn {
    /// Id of the transaction that created the output.
    pub tx_hash: TxHash,
    /// Position of the output within that transaction.
    pub index: u32,
}

impl TxIn {
    pub fn new(tx_hash: TxHash, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Display for TxIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

/// A transaction output: destination address and lovelace amount.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub address: Address,
    pub amount: u64,
}

impl TxOut {
    pub fn new(address: Address, amount: u64) -> Self {
        Self { address, amount }
    }

    /// Length of this output's canonical encoding, used by the min-ADA rule.
    pub fn encoded_len(&self) -> Result<usize, TransactionError> {
        Ok(cbor::encode_value(&cbor::output_to_value(self))?.len())
    }
}

/// An unspent output as reported by the ledger query service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    /// Reference used when spending this output.
    pub input: TxIn,
    /// Address the output was paid to (owner).
    pub address: Address,
    /// Lovelace carried by the output.
    pub amount: u64,
}

impl Utxo {
    pub fn new(input: TxIn, address: Address, amount: u64) -> Self {
        Self { input, address, amount }
    }
}

/// Current chain tip as reported by the query service.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ChainTip {
    /// Absolute slot of the tip block.
    pub slot: u64,
    /// Block height, when the service reports it.
    pub height: Option<u64>,
}

/// The part of a transaction that is hashed and signed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct TransactionBody {
    /// Inputs in encoding order.
    pub inputs: Vec<TxIn>,
    /// Outputs in encoding order.
    pub outputs: Vec<TxOut>,
    /// Fee in lovelace.
    pub fee: u64,
    /// Last slot at which the transaction is valid.
    pub ttl: Option<u64>,
    /// Blake2b-256 of the attached auxiliary data.
    pub auxiliary_data_hash: Option<Hash32>,
}

impl TransactionBody {
    /// Canonical CBOR encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        cbor::encode_value(&cbor::body_to_value(self))
    }

    /// Transaction id: Blake2b-256 over [`to_bytes`](Self::to_bytes).
    pub fn hash(&self) -> Result<TxHash, TransactionError> {
        Ok(blake2b_256(&self.to_bytes()?))
    }

    /// Sum of all output amounts.
    pub fn total_output(&self) -> Result<u64, TransactionError> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.amount))
            .ok_or(TransactionError::ValueOverflow)
    }
}

/// Verification-key witnesses, one per distinct key, ordered by key bytes.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct WitnessSet {
    vkeys: BTreeMap<VerificationKey, Signature>,
}

impl WitnessSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a witness. A second signature for the same key replaces the first.
    pub fn insert(&mut self, vkey: VerificationKey, signature: Signature) {
        self.vkeys.insert(vkey, signature);
    }

    pub fn len(&self) -> usize {
        self.vkeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vkeys.is_empty()
    }

    pub fn contains(&self, vkey: &VerificationKey) -> bool {
        self.vkeys.contains_key(vkey)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VerificationKey, &Signature)> {
        self.vkeys.iter()
    }

    /// Check every signature against the given body hash.
    pub fn verify(&self, body_hash: &TxHash) -> Result<(), CryptoError> {
        for (vkey, signature) in &self.vkeys {
            vkey.verify(body_hash.as_bytes(), signature)?;
        }
        Ok(())
    }
}

/// Auxiliary data attached to a transaction.
///
/// Only transaction messages (metadata label 674) are produced. Text is
/// split into items of at most 64 bytes on character boundaries.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuxiliaryData {
    pub message: Vec<String>,
}

impl AuxiliaryData {
    /// Build a message, splitting long text into ledger-sized items.
    pub fn message(text: &str) -> Self {
        let mut items = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            if current.len() + ch.len_utf8() > METADATA_TEXT_MAX_LEN {
                items.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
        if !current.is_empty() || items.is_empty() {
            items.push(current);
        }
        Self { message: items }
    }

    /// Metadata label the message is stored under.
    pub fn label(&self) -> u64 {
        MESSAGE_METADATA_LABEL
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        cbor::encode_value(&cbor::auxiliary_data_to_value(self))
    }

    pub fn hash(&self) -> Result<Hash32, TransactionError> {
        Ok(blake2b_256(&self.to_bytes()?))
    }
}

/// A complete transaction: body, witnesses and optional auxiliary data.
///
/// The identifying hash depends on the body only, so adding witnesses never
/// changes [`Transaction::id`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub body: TransactionBody,
    pub witness_set: WitnessSet,
    pub auxiliary_data: Option<AuxiliaryData>,
}

impl Transaction {
    /// Wrap a body with an empty witness set.
    pub fn new(body: TransactionBody) -> Self {
        Self {
            body,
            witness_set: WitnessSet::new(),
            auxiliary_data: None,
        }
    }

    /// Transaction id (hash of the body).
    pub fn id(&self) -> Result<TxHash, TransactionError> {
        self.body.hash()
    }

    /// Sign the body hash and record the witness.
    pub fn sign(&mut self, signer: &dyn TxSigner) -> Result<(), TransactionError> {
        let body_hash = self.body.hash()?;
        let signature = signer.sign(body_hash.as_bytes());
        self.witness_set.insert(signer.verification_key(), signature);
        Ok(())
    }

    /// Verify all witnesses against the body hash.
    pub fn verify_witnesses(&self) -> Result<(), CryptoError> {
        let body_hash = self
            .id()
            .map_err(|_| CryptoError::VerificationFailed)?;
        self.witness_set.verify(&body_hash)
    }

    /// Canonical encoding of the signed transaction.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        cbor::encode_transaction(self)
    }

    /// Encode, failing if the result exceeds `max_tx_size` bytes.
    pub fn to_bytes_checked(&self, max_tx_size: usize) -> Result<Vec<u8>, TransactionError> {
        let bytes = self.to_bytes()?;
        if bytes.len() > max_tx_size {
            return Err(TransactionError::SerializationLimitExceeded {
                size: bytes.len(),
                max: max_tx_size,
            });
        }
        Ok(bytes)
    }

    /// Decode a transaction produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        cbor::decode_transaction(bytes)
    }
}
