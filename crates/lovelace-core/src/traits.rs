//! Trait interfaces at the crate boundaries.
//!
//! - [`TxSigner`] — anything that can witness a transaction body (lovelace-wallet
//!   extended keys, plain `ed25519_dalek::SigningKey`)
//! - [`LedgerQuery`] — read-only view of the ledger (lovelace-client implements
//!   it over Blockfrost and over an in-memory snapshot)

use async_trait::async_trait;

use crate::address::Address;
use crate::crypto::{Signature, VerificationKey};
use crate::error::QueryError;
use crate::params::ProtocolParameters;
use crate::types::{ChainTip, KeyHash, TxHash, Utxo};

/// A key able to produce transaction witnesses.
pub trait TxSigner {
    /// Verification key placed in the witness.
    fn verification_key(&self) -> VerificationKey;

    /// Ed25519 signature over `message` (a body hash).
    fn sign(&self, message: &[u8]) -> Signature;

    /// Credential hash of the verification key.
    ///
    /// Default implementation hashes [`verification_key`](Self::verification_key).
    fn key_hash(&self) -> KeyHash {
        self.verification_key().hash()
    }
}

/// Read-only ledger queries needed to build and reconcile transactions.
///
/// All methods are idempotent reads, so implementations may retry them.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Current protocol parameters.
    async fn protocol_parameters(&self) -> Result<ProtocolParameters, QueryError>;

    /// Unspent outputs at `address`, in the order the service returns them.
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, QueryError>;

    /// Current chain tip.
    async fn tip(&self) -> Result<ChainTip, QueryError>;

    /// Whether the ledger already contains a transaction with this id.
    async fn transaction_exists(&self, tx_hash: &TxHash) -> Result<bool, QueryError>;
}
