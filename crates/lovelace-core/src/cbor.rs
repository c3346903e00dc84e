//! Canonical CBOR encoding of the transaction model.
//!
//! Every item is definite-length, integers and lengths use their shortest
//! head, and map keys are emitted in ascending order. Given the same field
//! values a body therefore has exactly one encoding, which is what makes the
//! transaction id reproducible by any verifier.
//!
//! # Layout
//!
//! ```text
//! body        = { 0: [[tx_hash, index], ..], 1: [[address, amount], ..],
//!                 2: fee, ? 3: ttl, ? 7: auxiliary_data_hash }
//! witness_set = { ? 0: [[vkey, signature], ..] }
//! transaction = [body, witness_set, true, auxiliary_data / null]
//! ```

use ciborium::value::{Integer, Value};
use std::io::Cursor;

use crate::address::Address;
use crate::constants::MESSAGE_METADATA_LABEL;
use crate::crypto::{Signature, VerificationKey};
use crate::error::TransactionError;
use crate::types::{AuxiliaryData, Hash32, Transaction, TransactionBody, TxIn, TxOut, WitnessSet};

/// CBOR tag some encoders put in front of input sets.
const SET_TAG: u64 = 258;

const BODY_INPUTS: u64 = 0;
const BODY_OUTPUTS: u64 = 1;
const BODY_FEE: u64 = 2;
const BODY_TTL: u64 = 3;
const BODY_AUX_HASH: u64 = 7;

const WITNESS_VKEYS: u64 = 0;

/// Head of a four-element array.
const ARRAY_4: u8 = 0x84;
const CBOR_TRUE: u8 = 0xf5;
const CBOR_NULL: u8 = 0xf6;

/// Serialize a value.
pub fn encode_value(value: &Value) -> Result<Vec<u8>, TransactionError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| TransactionError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Deserialize exactly one value, rejecting trailing bytes.
pub fn decode_value(bytes: &[u8]) -> Result<Value, TransactionError> {
    let mut cursor = Cursor::new(bytes);
    let value: Value = ciborium::de::from_reader(&mut cursor)
        .map_err(|e| TransactionError::Decoding(e.to_string()))?;
    if cursor.position() as usize != bytes.len() {
        return Err(TransactionError::Decoding(format!(
            "{} trailing bytes",
            bytes.len() - cursor.position() as usize
        )));
    }
    Ok(value)
}

fn uint(n: u64) -> Value {
    Value::Integer(Integer::from(n))
}

fn decoding(what: &str) -> TransactionError {
    TransactionError::Decoding(format!("expected {what}"))
}

fn as_uint(value: &Value, what: &str) -> Result<u64, TransactionError> {
    value
        .as_integer()
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| decoding(what))
}

fn as_bytes<'a>(value: &'a Value, what: &str) -> Result<&'a [u8], TransactionError> {
    value.as_bytes().map(Vec::as_slice).ok_or_else(|| decoding(what))
}

fn as_array<'a>(value: &'a Value, what: &str) -> Result<&'a [Value], TransactionError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Tag(SET_TAG, inner) => as_array(inner, what),
        _ => Err(decoding(what)),
    }
}

fn as_map<'a>(value: &'a Value, what: &str) -> Result<&'a [(Value, Value)], TransactionError> {
    value.as_map().map(Vec::as_slice).ok_or_else(|| decoding(what))
}

pub fn input_to_value(input: &TxIn) -> Value {
    Value::Array(vec![
        Value::Bytes(input.tx_hash.as_bytes().to_vec()),
        uint(u64::from(input.index)),
    ])
}

fn input_from_value(value: &Value) -> Result<TxIn, TransactionError> {
    match as_array(value, "input array")? {
        [hash, index] => {
            let tx_hash = Hash32::from_slice(as_bytes(hash, "input tx hash")?)
                .ok_or_else(|| decoding("32-byte input tx hash"))?;
            let index = u32::try_from(as_uint(index, "input index")?)
                .map_err(|_| decoding("input index within u32"))?;
            Ok(TxIn { tx_hash, index })
        }
        _ => Err(decoding("two-element input")),
    }
}

pub fn output_to_value(output: &TxOut) -> Value {
    Value::Array(vec![
        Value::Bytes(output.address.to_bytes()),
        uint(output.amount),
    ])
}

fn output_from_value(value: &Value) -> Result<TxOut, TransactionError> {
    let (address, amount) = match value {
        Value::Array(items) => match items.as_slice() {
            [address, amount, ..] => (address, amount),
            _ => return Err(decoding("output with address and amount")),
        },
        // Post-Alonzo map form: {0: address, 1: value, ..}
        Value::Map(entries) => {
            let field = |key: u64| {
                entries
                    .iter()
                    .find(|(k, _)| as_uint(k, "output key").ok() == Some(key))
                    .map(|(_, v)| v)
                    .ok_or_else(|| decoding("output address and amount"))
            };
            (field(0)?, field(1)?)
        }
        _ => return Err(decoding("output")),
    };
    let address = Address::from_bytes(as_bytes(address, "output address")?)
        .map_err(|e| TransactionError::Decoding(format!("output address: {e}")))?;
    let amount = as_uint(amount, "coin-only output amount")?;
    Ok(TxOut { address, amount })
}

pub fn body_to_value(body: &TransactionBody) -> Value {
    let mut entries = vec![
        (
            uint(BODY_INPUTS),
            Value::Array(body.inputs.iter().map(input_to_value).collect()),
        ),
        (
            uint(BODY_OUTPUTS),
            Value::Array(body.outputs.iter().map(output_to_value).collect()),
        ),
        (uint(BODY_FEE), uint(body.fee)),
    ];
    if let Some(ttl) = body.ttl {
        entries.push((uint(BODY_TTL), uint(ttl)));
    }
    if let Some(hash) = &body.auxiliary_data_hash {
        entries.push((uint(BODY_AUX_HASH), Value::Bytes(hash.as_bytes().to_vec())));
    }
    Value::Map(entries)
}

pub fn body_from_value(value: &Value) -> Result<TransactionBody, TransactionError> {
    let mut body = TransactionBody::default();
    let mut seen_fee = false;
    for (key, field) in as_map(value, "body map")? {
        match as_uint(key, "body key")? {
            BODY_INPUTS => {
                body.inputs = as_array(field, "inputs")?
                    .iter()
                    .map(input_from_value)
                    .collect::<Result<_, _>>()?;
            }
            BODY_OUTPUTS => {
                body.outputs = as_array(field, "outputs")?
                    .iter()
                    .map(output_from_value)
                    .collect::<Result<_, _>>()?;
            }
            BODY_FEE => {
                body.fee = as_uint(field, "fee")?;
                seen_fee = true;
            }
            BODY_TTL => body.ttl = Some(as_uint(field, "ttl")?),
            BODY_AUX_HASH => {
                body.auxiliary_data_hash = Some(
                    Hash32::from_slice(as_bytes(field, "auxiliary data hash")?)
                        .ok_or_else(|| decoding("32-byte auxiliary data hash"))?,
                );
            }
            other => {
                return Err(TransactionError::Decoding(format!(
                    "unsupported body field {other}"
                )));
            }
        }
    }
    if !seen_fee {
        return Err(decoding("fee field"));
    }
    Ok(body)
}

pub fn witness_set_to_value(witnesses: &WitnessSet) -> Value {
    if witnesses.is_empty() {
        return Value::Map(Vec::new());
    }
    let vkeys = witnesses
        .iter()
        .map(|(vkey, sig)| {
            Value::Array(vec![
                Value::Bytes(vkey.as_bytes().to_vec()),
                Value::Bytes(sig.as_bytes().to_vec()),
            ])
        })
        .collect();
    Value::Map(vec![(uint(WITNESS_VKEYS), Value::Array(vkeys))])
}

pub fn witness_set_from_value(value: &Value) -> Result<WitnessSet, TransactionError> {
    let mut witnesses = WitnessSet::new();
    for (key, field) in as_map(value, "witness set map")? {
        let key = as_uint(key, "witness set key")?;
        if key != WITNESS_VKEYS {
            return Err(TransactionError::Decoding(format!(
                "unsupported witness kind {key}"
            )));
        }
        for item in as_array(field, "vkey witnesses")? {
            match as_array(item, "vkey witness")? {
                [vkey, sig] => {
                    let vkey: [u8; 32] = as_bytes(vkey, "vkey")?
                        .try_into()
                        .map_err(|_| decoding("32-byte vkey"))?;
                    let sig: [u8; 64] = as_bytes(sig, "signature")?
                        .try_into()
                        .map_err(|_| decoding("64-byte signature"))?;
                    witnesses.insert(VerificationKey::from_bytes(vkey), Signature::from_bytes(sig));
                }
                _ => return Err(decoding("two-element vkey witness")),
            }
        }
    }
    Ok(witnesses)
}

pub fn auxiliary_data_to_value(aux: &AuxiliaryData) -> Value {
    let items = aux.message.iter().cloned().map(Value::Text).collect();
    Value::Map(vec![(
        uint(MESSAGE_METADATA_LABEL),
        Value::Map(vec![(Value::Text("msg".into()), Value::Array(items))]),
    )])
}

pub fn auxiliary_data_from_value(value: &Value) -> Result<AuxiliaryData, TransactionError> {
    let entries = as_map(value, "metadata map")?;
    let message = entries
        .iter()
        .find(|(k, _)| as_uint(k, "metadata label").ok() == Some(MESSAGE_METADATA_LABEL))
        .map(|(_, v)| v)
        .ok_or_else(|| decoding("message metadata"))?;
    let msg = as_map(message, "message map")?
        .iter()
        .find(|(k, _)| k.as_text() == Some("msg"))
        .map(|(_, v)| v)
        .ok_or_else(|| decoding("msg entry"))?;
    let message = as_array(msg, "message items")?
        .iter()
        .map(|v| v.as_text().map(str::to_owned).ok_or_else(|| decoding("text item")))
        .collect::<Result<_, _>>()?;
    Ok(AuxiliaryData { message })
}

/// Encode a signed transaction.
///
/// The body is encoded once and spliced in verbatim so the embedded bytes are
/// exactly the bytes behind [`Transaction::id`].
pub fn encode_transaction(tx: &Transaction) -> Result<Vec<u8>, TransactionError> {
    let body = tx.body.to_bytes()?;
    let witnesses = encode_value(&witness_set_to_value(&tx.witness_set))?;
    let aux = tx.auxiliary_data.as_ref().map(AuxiliaryData::to_bytes).transpose()?;

    let mut out = Vec::with_capacity(2 + body.len() + witnesses.len() + aux.as_ref().map_or(1, Vec::len));
    out.push(ARRAY_4);
    out.extend_from_slice(&body);
    out.extend_from_slice(&witnesses);
    out.push(CBOR_TRUE);
    match aux {
        Some(bytes) => out.extend_from_slice(&bytes),
        None => out.push(CBOR_NULL),
    }
    Ok(out)
}

/// Decode a signed transaction. Accepts the three-element Shelley layout
/// as well as the four-element layout with the validity flag.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, TransactionError> {
    let value = decode_value(bytes)?;
    let (body, witnesses, aux) = match as_array(&value, "transaction array")? {
        [body, witnesses, aux] => (body, witnesses, aux),
        [body, witnesses, valid, aux] => {
            if valid.as_bool() != Some(true) {
                return Err(decoding("transaction marked valid"));
            }
            (body, witnesses, aux)
        }
        _ => return Err(decoding("three or four element transaction")),
    };
    let auxiliary_data = if aux.is_null() {
        None
    } else {
        Some(auxiliary_data_from_value(aux)?)
    };
    Ok(Transaction {
        body: body_from_value(body)?,
        witness_set: witness_set_from_value(witnesses)?,
        auxiliary_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Credential, Network};
    use crate::types::Hash28;

    fn enterprise(seed: u8) -> Address {
        Address::new(Network::Testnet, Credential::Key(Hash28::from_bytes([seed; 28])), None)
    }

    fn sample_body() -> TransactionBody {
        TransactionBody {
            inputs: vec![TxIn::new(Hash32::from_bytes([0x11; 32]), 1)],
            outputs: vec![TxOut::new(enterprise(0xAA), 1_000_000)],
            fee: 170_000,
            ttl: Some(500),
            auxiliary_data_hash: None,
        }
    }

    #[test]
    fn body_exact_bytes() {
        let mut expected = vec![0xa4, 0x00, 0x81, 0x82, 0x58, 0x20];
        expected.extend_from_slice(&[0x11; 32]);
        expected.push(0x01);
        expected.extend_from_slice(&[0x01, 0x81, 0x82, 0x58, 0x1d, 0x60]);
        expected.extend_from_slice(&[0xAA; 28]);
        expected.extend_from_slice(&[0x1a, 0x00, 0x0f, 0x42, 0x40]);
        expected.extend_from_slice(&[0x02, 0x1a, 0x00, 0x02, 0x98, 0x10]);
        expected.extend_from_slice(&[0x03, 0x19, 0x01, 0xf4]);
        assert_eq!(sample_body().to_bytes().unwrap(), expected);
    }

    #[test]
    fn ttl_omitted_when_unset() {
        let mut body = sample_body();
        body.ttl = None;
        let bytes = body.to_bytes().unwrap();
        assert_eq!(bytes[0], 0xa3);
    }

    #[test]
    fn aux_hash_uses_key_seven() {
        let mut body = sample_body();
        body.auxiliary_data_hash = Some(Hash32::from_bytes([0x77; 32]));
        let bytes = body.to_bytes().unwrap();
        assert_eq!(bytes[0], 0xa5);
        let tail = &bytes[bytes.len() - 35..];
        assert_eq!(&tail[..3], &[0x07, 0x58, 0x20]);
    }

    #[test]
    fn shortest_integer_heads() {
        assert_eq!(encode_value(&uint(23)).unwrap(), vec![0x17]);
        assert_eq!(encode_value(&uint(24)).unwrap(), vec![0x18, 0x18]);
        assert_eq!(encode_value(&uint(256)).unwrap(), vec![0x19, 0x01, 0x00]);
        assert_eq!(encode_value(&uint(65_536)).unwrap(), vec![0x1a, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(encode_value(&uint(u64::MAX)).unwrap()[0], 0x1b);
    }

    #[test]
    fn empty_witness_set_is_empty_map() {
        assert_eq!(encode_value(&witness_set_to_value(&WitnessSet::new())).unwrap(), vec![0xa0]);
    }

    #[test]
    fn transaction_framing() {
        let tx = Transaction::new(sample_body());
        let bytes = tx.to_bytes().unwrap();
        let body = tx.body.to_bytes().unwrap();
        assert_eq!(bytes[0], 0x84);
        assert_eq!(&bytes[1..1 + body.len()], body.as_slice());
        assert_eq!(&bytes[1 + body.len()..], &[0xa0, 0xf5, 0xf6]);
    }

    #[test]
    fn transaction_decode_roundtrip_with_witness_and_message() {
        let sk = ed25519_dalek::SigningKey::from_bytes(&[9u8; 32]);
        let aux = AuxiliaryData::message("invoice 42");
        let mut body = sample_body();
        body.auxiliary_data_hash = Some(aux.hash().unwrap());
        let mut tx = Transaction::new(body);
        tx.auxiliary_data = Some(aux);
        tx.sign(&sk).unwrap();

        let decoded = Transaction::from_bytes(&tx.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.id().unwrap(), tx.id().unwrap());
        assert!(decoded.verify_witnesses().is_ok());
    }

    #[test]
    fn decode_shelley_three_element_layout() {
        let tx = Transaction::new(sample_body());
        let body = encode_value(&body_to_value(&tx.body)).unwrap();
        let mut bytes = vec![0x83];
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(&[0xa0, 0xf6]);
        assert_eq!(Transaction::from_bytes(&bytes).unwrap(), tx);
    }

    #[test]
    fn decode_accepts_tagged_input_set() {
        let body = sample_body();
        let value = Value::Map(vec![
            (uint(0), Value::Tag(SET_TAG, Box::new(Value::Array(vec![input_to_value(&body.inputs[0])])))),
            (uint(1), Value::Array(vec![output_to_value(&body.outputs[0])])),
            (uint(2), uint(body.fee)),
            (uint(3), uint(500)),
        ]);
        assert_eq!(body_from_value(&value).unwrap(), body);
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = Transaction::new(sample_body()).to_bytes().unwrap();
        bytes.push(0x00);
        assert!(matches!(
            Transaction::from_bytes(&bytes).unwrap_err(),
            TransactionError::Decoding(_)
        ));
    }

    #[test]
    fn decode_rejects_unknown_body_field() {
        let value = Value::Map(vec![(uint(2), uint(1)), (uint(9), uint(1))]);
        assert!(body_from_value(&value).is_err());
    }

    #[test]
    fn decode_rejects_missing_fee() {
        let value = Value::Map(vec![(uint(0), Value::Array(vec![]))]);
        assert_eq!(body_from_value(&value).unwrap_err(), decoding("fee field"));
    }

    #[test]
    fn decode_rejects_invalid_flag() {
        let tx = Transaction::new(sample_body());
        let mut bytes = tx.to_bytes().unwrap();
        let len = bytes.len();
        bytes[len - 2] = 0xf4; // false
        assert!(Transaction::from_bytes(&bytes).is_err());
    }

    #[test]
    fn output_encoded_len_matches_bytes() {
        let out = TxOut::new(enterprise(1), 1_000_000);
        // array head + bytes head (2) + 29 address bytes + 5-byte uint
        assert_eq!(out.encoded_len().unwrap(), 1 + 2 + 29 + 5);
    }

    mod props {
        use crate::types::Transaction;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let _ = Transaction::from_bytes(&bytes);
            }
        }
    }
}
