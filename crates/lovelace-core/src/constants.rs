//! Ledger constants. All monetary values in lovelace (1 ADA = 10^6 lovelace).

/// Lovelace per ADA.
pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// Length of a credential hash (Blake2b-224).
pub const KEY_HASH_LEN: usize = 28;

/// Length of a transaction id (Blake2b-256).
pub const TX_HASH_LEN: usize = 32;

/// Length of an Ed25519 verification key.
pub const VKEY_LEN: usize = 32;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Bytes charged per UTXO entry on top of its serialized output when
/// computing the minimum-ADA floor (Babbage rule).
pub const UTXO_ENTRY_OVERHEAD: u64 = 160;

/// Network id carried in the low nibble of the address header on mainnet.
pub const MAINNET_NETWORK_ID: u8 = 1;

/// Network id carried in the low nibble of the address header on test networks.
pub const TESTNET_NETWORK_ID: u8 = 0;

/// Metadata label for transaction messages (CIP-20).
pub const MESSAGE_METADATA_LABEL: u64 = 674;

/// Maximum byte length of a single metadata text item.
pub const METADATA_TEXT_MAX_LEN: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_lengths() {
        assert_eq!(KEY_HASH_LEN, 28);
        assert_eq!(TX_HASH_LEN, 32);
        assert_eq!(SIGNATURE_LEN, 2 * VKEY_LEN);
    }

    #[test]
    fn network_ids_differ() {
        assert_ne!(MAINNET_NETWORK_ID, TESTNET_NETWORK_ID);
        assert!(MAINNET_NETWORK_ID < 16);
    }
}
