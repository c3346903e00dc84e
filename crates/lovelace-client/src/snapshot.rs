//! Offline [`LedgerQuery`] backed by a snapshot of ledger state.
//!
//! The snapshot is plain JSON so it can be captured once from a live
//! service and replayed for offline builds and tests.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use lovelace_core::address::Address;
use lovelace_core::error::QueryError;
use lovelace_core::params::ProtocolParameters;
use lovelace_core::traits::LedgerQuery;
use lovelace_core::types::{ChainTip, Transaction, TxHash, TxIn, Utxo};

/// Serialized ledger state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub protocol_parameters: ProtocolParameters,
    pub tip: ChainTip,
    pub utxos: Vec<Utxo>,
    /// Ids of transactions known to be on chain.
    #[serde(default)]
    pub transactions: Vec<TxHash>,
}

impl LedgerSnapshot {
    pub fn new(protocol_parameters: ProtocolParameters, tip: ChainTip, utxos: Vec<Utxo>) -> Self {
        Self { protocol_parameters, tip, utxos, transactions: Vec::new() }
    }

    /// Read a snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, QueryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Unavailable(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| QueryError::Malformed(format!("{}: {e}", path.display())))
    }

    /// Write the snapshot as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), QueryError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).map_err(|e| QueryError::Malformed(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| QueryError::Unavailable(format!("{}: {e}", path.display())))
    }
}

/// In-memory ledger. [`apply`](SnapshotLedger::apply) lets offline flows
/// chain several transactions.
#[derive(Debug)]
pub struct SnapshotLedger {
    state: RwLock<LedgerSnapshot>,
}

impl SnapshotLedger {
    pub fn new(snapshot: LedgerSnapshot) -> Self {
        Self { state: RwLock::new(snapshot) }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, QueryError> {
        Ok(Self::new(LedgerSnapshot::load(path)?))
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.read().await.clone()
    }

    /// Spend the transaction's inputs and add its outputs.
    ///
    /// Fails with [`QueryError::Remote`] (status 400) if an input is not in
    /// the snapshot, the way a node refuses a spent input.
    pub async fn apply(&self, tx: &Transaction) -> Result<TxHash, QueryError> {
        let tx_hash = tx.id().map_err(|e| QueryError::Malformed(e.to_string()))?;
        let mut state = self.state.write().await;
        let missing: Vec<String> = tx
            .body
            .inputs
            .iter()
            .filter(|input| !state.utxos.iter().any(|u| &u.input == *input))
            .map(|input| input.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(QueryError::Remote {
                status: 400,
                body: format!("BadInputsUTxO: {}", missing.join(", ")),
            });
        }
        state.utxos.retain(|u| !tx.body.inputs.contains(&u.input));
        for (index, output) in tx.body.outputs.iter().enumerate() {
            let index = u32::try_from(index).map_err(|_| QueryError::Malformed("too many outputs".into()))?;
            state
                .utxos
                .push(Utxo::new(TxIn::new(tx_hash, index), output.address, output.amount));
        }
        state.transactions.push(tx_hash);
        debug!(%tx_hash, utxos = state.utxos.len(), "snapshot updated");
        Ok(tx_hash)
    }

    /// Move the tip forward.
    pub async fn advance_tip(&self, slots: u64) {
        let mut state = self.state.write().await;
        state.tip.slot = state.tip.slot.saturating_add(slots);
    }
}

#[async_trait]
impl LedgerQuery for SnapshotLedger {
    async fn protocol_parameters(&self) -> Result<ProtocolParameters, QueryError> {
        Ok(self.state.read().await.protocol_parameters.clone())
    }

    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, QueryError> {
        let state = self.state.read().await;
        Ok(state.utxos.iter().filter(|u| &u.address == address).cloned().collect())
    }

    async fn tip(&self) -> Result<ChainTip, QueryError> {
        Ok(self.state.read().await.tip)
    }

    async fn transaction_exists(&self, tx_hash: &TxHash) -> Result<bool, QueryError> {
        Ok(self.state.read().await.transactions.contains(tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lovelace_core::address::{Credential, Network};
    use lovelace_core::types::{Hash28, Hash32, TransactionBody, TxOut};

    fn address(seed: u8) -> Address {
        Address::new(Network::Testnet, Credential::Key(Hash28::from_bytes([seed; 28])), None)
    }

    fn snapshot() -> LedgerSnapshot {
        LedgerSnapshot::new(
            ProtocolParameters::preview_defaults(),
            ChainTip { slot: 1_000, height: None },
            vec![
                Utxo::new(TxIn::new(Hash32::from_bytes([1; 32]), 0), address(1), 10_000_000),
                Utxo::new(TxIn::new(Hash32::from_bytes([2; 32]), 1), address(2), 20_000_000),
                Utxo::new(TxIn::new(Hash32::from_bytes([3; 32]), 0), address(1), 30_000_000),
            ],
        )
    }

    fn spend(input: TxIn, to: Address, amount: u64) -> Transaction {
        Transaction::new(TransactionBody {
            inputs: vec![input],
            outputs: vec![TxOut::new(to, amount)],
            fee: 0,
            ttl: None,
            auxiliary_data_hash: None,
        })
    }

    #[tokio::test]
    async fn utxos_filter_by_address_in_order() {
        let ledger = SnapshotLedger::new(snapshot());
        let mine = ledger.utxos(&address(1)).await.unwrap();
        assert_eq!(mine.iter().map(|u| u.amount).collect::<Vec<_>>(), vec![10_000_000, 30_000_000]);
        assert!(ledger.utxos(&address(9)).await.unwrap().is_empty());
        assert_eq!(ledger.tip().await.unwrap().slot, 1_000);
    }

    #[tokio::test]
    async fn apply_moves_value() {
        let ledger = SnapshotLedger::new(snapshot());
        let input = TxIn::new(Hash32::from_bytes([1; 32]), 0);
        let tx_hash = ledger.apply(&spend(input, address(5), 10_000_000)).await.unwrap();

        let received = ledger.utxos(&address(5)).await.unwrap();
        assert_eq!(received, vec![Utxo::new(TxIn::new(tx_hash, 0), address(5), 10_000_000)]);
        assert_eq!(ledger.utxos(&address(1)).await.unwrap().len(), 1);
        assert!(ledger.transaction_exists(&tx_hash).await.unwrap());
    }

    #[tokio::test]
    async fn apply_rejects_spent_input() {
        let ledger = SnapshotLedger::new(snapshot());
        let input = TxIn::new(Hash32::from_bytes([1; 32]), 0);
        ledger.apply(&spend(input, address(5), 1)).await.unwrap();
        let err = ledger.apply(&spend(input, address(6), 1)).await.unwrap_err();
        match err {
            QueryError::Remote { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("BadInputsUTxO"));
                assert!(body.contains(&input.to_string()));
            }
            other => panic!("expected remote rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn advance_tip() {
        let ledger = SnapshotLedger::new(snapshot());
        ledger.advance_tip(20).await;
        assert_eq!(ledger.tip().await.unwrap().slot, 1_020);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let original = snapshot();
        original.save(&path).unwrap();
        assert_eq!(LedgerSnapshot::load(&path).unwrap(), original);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = LedgerSnapshot::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, QueryError::Unavailable(_)));
    }

    #[test]
    fn garbage_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(LedgerSnapshot::load(&path).unwrap_err(), QueryError::Malformed(_)));
    }

    #[test]
    fn transactions_field_is_optional() {
        let mut value = serde_json::to_value(snapshot()).unwrap();
        value.as_object_mut().unwrap().remove("transactions");
        let parsed: LedgerSnapshot = serde_json::from_value(value).unwrap();
        assert!(parsed.transactions.is_empty());
    }
}
