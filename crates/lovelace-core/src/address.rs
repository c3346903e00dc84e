//! Shelley address encoding.
//!
//! An address is a header byte followed by one or two 28-byte credentials.
//! The header's high nibble is the address type, the low nibble the network
//! id. Human-readable form is Bech32 ([BIP-173]) with prefixes:
//! - payment addresses: `addr` (mainnet), `addr_test` (testnets)
//! - reward addresses: `stake` (mainnet), `stake_test` (testnets)
//!
//! Supported types are base (0-3), enterprise (6, 7) and reward (14, 15).
//! Pointer and Byron addresses are rejected with
//! [`AddressError::UnsupportedType`].
//!
//! [BIP-173]: https://github.com/bitcoin/bips/blob/master/bip-0173.mediawiki

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::{KEY_HASH_LEN, MAINNET_NETWORK_ID, TESTNET_NETWORK_ID};
use crate::error::AddressError;
use crate::types::{Hash28, KeyHash};

/// Bech32 checksum constant (BIP-173).
const BECH32_CONST: u32 = 1;

/// Bech32 character set for encoding 5-bit values.
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const TYPE_ENTERPRISE_KEY: u8 = 0b0110;
const TYPE_ENTERPRISE_SCRIPT: u8 = 0b0111;
const TYPE_REWARD_KEY: u8 = 0b1110;
const TYPE_REWARD_SCRIPT: u8 = 0b1111;

/// Network an address belongs to.
///
/// All test networks (preprod, preview) share network id 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Network id carried in the low nibble of the header byte.
    pub fn network_id(&self) -> u8 {
        match self {
            Network::Mainnet => MAINNET_NETWORK_ID,
            Network::Testnet => TESTNET_NETWORK_ID,
        }
    }

    pub fn from_network_id(id: u8) -> Result<Self, AddressError> {
        match id {
            MAINNET_NETWORK_ID => Ok(Network::Mainnet),
            TESTNET_NETWORK_ID => Ok(Network::Testnet),
            other => Err(AddressError::UnknownNetwork(other)),
        }
    }

    /// Prefix for payment (base and enterprise) addresses.
    pub fn payment_hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "addr",
            Network::Testnet => "addr_test",
        }
    }

    /// Prefix for reward addresses.
    pub fn reward_hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "stake",
            Network::Testnet => "stake_test",
        }
    }
}

/// Whether a credential is a key hash or a script hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialKind {
    Key,
    Script,
}

/// A payment or stake credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Credential {
    /// Blake2b-224 of a verification key.
    Key(KeyHash),
    /// Blake2b-224 of a script.
    Script(Hash28),
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Key(_) => CredentialKind::Key,
            Credential::Script(_) => CredentialKind::Script,
        }
    }

    pub fn hash(&self) -> &Hash28 {
        match self {
            Credential::Key(h) | Credential::Script(h) => h,
        }
    }

    pub fn is_script(&self) -> bool {
        self.kind() == CredentialKind::Script
    }

    fn from_bit(script: bool, hash: Hash28) -> Self {
        if script { Credential::Script(hash) } else { Credential::Key(hash) }
    }
}

/// Shape of an address's credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressKind {
    /// Payment credential plus stake credential.
    Base { payment: Credential, stake: Credential },
    /// Payment credential only.
    Enterprise { payment: Credential },
    /// Stake credential only.
    Reward { stake: Credential },
}

/// A Shelley-era address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    network: Network,
    kind: AddressKind,
}

impl Address {
    /// Payment address: base when a stake credential is given, enterprise otherwise.
    pub fn new(network: Network, payment: Credential, stake: Option<Credential>) -> Self {
        let kind = match stake {
            Some(stake) => AddressKind::Base { payment, stake },
            None => AddressKind::Enterprise { payment },
        };
        Self { network, kind }
    }

    /// Reward (stake) address.
    pub fn reward(network: Network, stake: Credential) -> Self {
        Self { network, kind: AddressKind::Reward { stake } }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn kind(&self) -> &AddressKind {
        &self.kind
    }

    pub fn payment(&self) -> Option<&Credential> {
        match &self.kind {
            AddressKind::Base { payment, .. } | AddressKind::Enterprise { payment } => Some(payment),
            AddressKind::Reward { .. } => None,
        }
    }

    pub fn stake(&self) -> Option<&Credential> {
        match &self.kind {
            AddressKind::Base { stake, .. } | AddressKind::Reward { stake } => Some(stake),
            AddressKind::Enterprise { .. } => None,
        }
    }

    /// Key hash that must witness a spend from this address, if the payment
    /// credential is a key.
    pub fn payment_key_hash(&self) -> Option<KeyHash> {
        match self.payment() {
            Some(Credential::Key(hash)) => Some(*hash),
            _ => None,
        }
    }

    pub fn is_reward(&self) -> bool {
        matches!(self.kind, AddressKind::Reward { .. })
    }

    /// Header byte: address type in the high nibble, network id in the low.
    pub fn header(&self) -> u8 {
        let type_code = match &self.kind {
            AddressKind::Base { payment, stake } => {
                u8::from(payment.is_script()) | (u8::from(stake.is_script()) << 1)
            }
            AddressKind::Enterprise { payment } => {
                if payment.is_script() { TYPE_ENTERPRISE_SCRIPT } else { TYPE_ENTERPRISE_KEY }
            }
            AddressKind::Reward { stake } => {
                if stake.is_script() { TYPE_REWARD_SCRIPT } else { TYPE_REWARD_KEY }
            }
        };
        (type_code << 4) | self.network.network_id()
    }

    /// Human-readable prefix for this address.
    pub fn hrp(&self) -> &'static str {
        if self.is_reward() {
            self.network.reward_hrp()
        } else {
            self.network.payment_hrp()
        }
    }

    /// Raw bytes as carried in transaction outputs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 2 * KEY_HASH_LEN);
        out.push(self.header());
        match &self.kind {
            AddressKind::Base { payment, stake } => {
                out.extend_from_slice(payment.hash().as_bytes());
                out.extend_from_slice(stake.hash().as_bytes());
            }
            AddressKind::Enterprise { payment: cred } | AddressKind::Reward { stake: cred } => {
                out.extend_from_slice(cred.hash().as_bytes());
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let (&header, body) = bytes.split_first().ok_or(AddressError::InvalidLength(0))?;
        let type_code = header >> 4;
        let expected_len = match type_code {
            0..=3 => 2 * KEY_HASH_LEN,
            TYPE_ENTERPRISE_KEY | TYPE_ENTERPRISE_SCRIPT | TYPE_REWARD_KEY | TYPE_REWARD_SCRIPT => {
                KEY_HASH_LEN
            }
            other => return Err(AddressError::UnsupportedType(other)),
        };
        let network = Network::from_network_id(header & 0x0f)?;
        if body.len() != expected_len {
            return Err(AddressError::InvalidLength(bytes.len()));
        }

        let first = Hash28::from_slice(&body[..KEY_HASH_LEN])
            .ok_or(AddressError::InvalidLength(bytes.len()))?;
        let kind = match type_code {
            0..=3 => {
                let second = Hash28::from_slice(&body[KEY_HASH_LEN..])
                    .ok_or(AddressError::InvalidLength(bytes.len()))?;
                AddressKind::Base {
                    payment: Credential::from_bit(type_code & 1 != 0, first),
                    stake: Credential::from_bit(type_code & 2 != 0, second),
                }
            }
            TYPE_ENTERPRISE_KEY | TYPE_ENTERPRISE_SCRIPT => AddressKind::Enterprise {
                payment: Credential::from_bit(type_code & 1 != 0, first),
            },
            _ => AddressKind::Reward {
                stake: Credential::from_bit(type_code & 1 != 0, first),
            },
        };
        Ok(Self { network, kind })
    }

    /// Encode this address as a Bech32 string.
    pub fn encode(&self) -> String {
        bech32_encode(self.hrp(), &self.to_bytes())
    }

    /// Decode a Bech32 address string, checking the prefix against the header.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let (hrp, bytes) = bech32_decode(s)?;
        let address = Self::from_bytes(&bytes)?;
        if hrp != address.hrp() {
            return match hrp.as_str() {
                "addr" | "addr_test" | "stake" | "stake_test" => Err(AddressError::NetworkMismatch {
                    hrp,
                    network_id: address.network.network_id(),
                }),
                _ => Err(AddressError::InvalidHrp(hrp)),
            };
        }
        Ok(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}

// --- Bech32 internals ---

fn bech32_encode(hrp: &str, bytes: &[u8]) -> String {
    // 8-to-5 conversion with padding cannot fail on byte input.
    let data = convert_bits(bytes, 8, 5, true).unwrap_or_default();
    let checksum = bech32_create_checksum(hrp, &data);

    let mut result = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    result.push_str(hrp);
    result.push('1');
    for &d in data.iter().chain(checksum.iter()) {
        result.push(CHARSET[d as usize] as char);
    }
    result
}

fn bech32_decode(s: &str) -> Result<(String, Vec<u8>), AddressError> {
    let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(AddressError::MixedCase);
    }

    let s_lower = s.to_ascii_lowercase();
    let sep_pos = s_lower.rfind('1').ok_or(AddressError::MissingSeparator)?;
    if sep_pos == 0 {
        return Err(AddressError::InvalidHrp(String::new()));
    }
    if sep_pos + 7 > s_lower.len() {
        return Err(AddressError::InvalidLength(0));
    }

    let hrp = &s_lower[..sep_pos];
    if hrp.bytes().any(|b| !(33..=126).contains(&b)) {
        return Err(AddressError::InvalidHrp(hrp.to_string()));
    }

    let mut data = Vec::with_capacity(s_lower.len() - sep_pos - 1);
    for c in s_lower[sep_pos + 1..].chars() {
        let pos = CHARSET
            .iter()
            .position(|&ch| ch as char == c)
            .ok_or(AddressError::InvalidCharacter(c))?;
        data.push(pos as u8);
    }

    if !bech32_verify_checksum(hrp, &data) {
        return Err(AddressError::InvalidChecksum);
    }

    let payload = &data[..data.len() - 6];
    let bytes = convert_bits(payload, 5, 8, false).ok_or(AddressError::InvalidPadding)?;
    Ok((hrp.to_string(), bytes))
}

/// Compute the Bech32 polymod over a sequence of 5-bit values.
fn bech32_polymod(values: &[u8]) -> u32 {
    const GEN: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
    let mut chk: u32 = 1;
    for &v in values {
        let b = chk >> 25;
        chk = ((chk & 0x1ffffff) << 5) ^ (v as u32);
        for (i, &g) in GEN.iter().enumerate() {
            if (b >> i) & 1 != 0 {
                chk ^= g;
            }
        }
    }
    chk
}

fn bech32_hrp_expand(hrp: &str) -> Vec<u8> {
    let mut ret = Vec::with_capacity(hrp.len() * 2 + 1);
    ret.extend(hrp.bytes().map(|c| c >> 5));
    ret.push(0);
    ret.extend(hrp.bytes().map(|c| c & 31));
    ret
}

fn bech32_create_checksum(hrp: &str, data: &[u8]) -> Vec<u8> {
    let mut values = bech32_hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0; 6]);
    let polymod = bech32_polymod(&values) ^ BECH32_CONST;
    (0..6)
        .map(|i| ((polymod >> (5 * (5 - i))) & 31) as u8)
        .collect()
}

fn bech32_verify_checksum(hrp: &str, data: &[u8]) -> bool {
    let mut values = bech32_hrp_expand(hrp);
    values.extend_from_slice(data);
    bech32_polymod(&values) == BECH32_CONST
}

/// Convert between bit widths (8-bit bytes to 5-bit groups and back).
fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut ret = Vec::new();
    let maxv = (1u32 << to_bits) - 1;
    for &value in data {
        let v = value as u32;
        if v >> from_bits != 0 {
            return None;
        }
        acc = (acc << from_bits) | v;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return None;
    }
    Some(ret)
}
