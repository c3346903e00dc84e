//! [`LedgerQuery`] over the Blockfrost HTTP API.
//!
//! Every request is an idempotent GET, so transport failures, 429 and 5xx
//! are retried under the configured [`RetryPolicy`]. Blockfrost answers 404
//! for addresses it has never seen and for unknown transactions; both are
//! treated as "nothing there" rather than as errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use lovelace_core::address::Address;
use lovelace_core::error::QueryError;
use lovelace_core::params::{ProtocolParameters, ProtocolVersion};
use lovelace_core::traits::LedgerQuery;
use lovelace_core::types::{ChainTip, TxHash, TxIn, Utxo};

use crate::retry::{Cancellation, RetryPolicy};

pub const BLOCKFROST_MAINNET: &str = "https://cardano-mainnet.blockfrost.io/api/v0";
pub const BLOCKFROST_PREPROD: &str = "https://cardano-preprod.blockfrost.io/api/v0";
pub const BLOCKFROST_PREVIEW: &str = "https://cardano-preview.blockfrost.io/api/v0";

/// Items per page Blockfrost returns for list endpoints.
pub const PAGE_SIZE: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockfrostConfig {
    pub base_url: String,
    pub project_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Upper bound on UTXO pages fetched for one address.
    pub max_pages: u32,
}

impl Default for BlockfrostConfig {
    fn default() -> Self {
        Self {
            base_url: BLOCKFROST_PREVIEW.to_string(),
            project_id: String::new(),
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            max_pages: 100,
        }
    }
}

impl BlockfrostConfig {
    pub fn new(base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }
}

/// Blockfrost-backed ledger query service.
#[derive(Debug, Clone)]
pub struct BlockfrostClient {
    config: BlockfrostConfig,
    client: reqwest::Client,
    cancel: Cancellation,
}

impl BlockfrostClient {
    pub fn new(config: BlockfrostConfig) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QueryError::Unavailable(e.to_string()))?;
        Ok(Self { config, client, cancel: Cancellation::never() })
    }

    /// Abort in-flight and future reads when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &BlockfrostConfig {
        &self.config
    }

    /// GET `path`, retried. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, QueryError> {
        self.config
            .retry
            .run(&self.cancel, path, || self.get_once(path))
            .await
    }

    async fn get_once<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, QueryError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .get(&url)
            .header("project_id", &self.config.project_id)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(QueryError::Remote { status: status.as_u16(), body });
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| QueryError::Malformed(format!("{path}: {e}")))
    }
}

fn transport_error(e: reqwest::Error) -> QueryError {
    if e.is_timeout() {
        QueryError::Timeout
    } else {
        QueryError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl LedgerQuery for BlockfrostClient {
    async fn protocol_parameters(&self) -> Result<ProtocolParameters, QueryError> {
        let raw: BfParameters = self
            .get_json("/epochs/latest/parameters")
            .await?
            .ok_or_else(|| QueryError::Malformed("no parameters for latest epoch".into()))?;
        Ok(raw.into_parameters())
    }

    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, QueryError> {
        let encoded = address.encode();
        let mut utxos = Vec::new();
        let mut skipped = 0usize;
        for page in 1..=self.config.max_pages {
            let path = format!("/addresses/{encoded}/utxos?page={page}&count={PAGE_SIZE}");
            let batch: Vec<BfUtxo> = self.get_json(&path).await?.unwrap_or_default();
            let len = batch.len();
            for raw in batch {
                match raw.lovelace_only()? {
                    Some(amount) => {
                        let tx_hash: TxHash = raw
                            .tx_hash
                            .parse()
                            .map_err(|_| QueryError::Malformed(format!("bad tx_hash {}", raw.tx_hash)))?;
                        utxos.push(Utxo::new(TxIn::new(tx_hash, raw.output_index), *address, amount));
                    }
                    None => skipped += 1,
                }
            }
            if len < PAGE_SIZE {
                break;
            }
        }
        debug!(address = %encoded, count = utxos.len(), skipped, "utxos fetched");
        Ok(utxos)
    }

    async fn tip(&self) -> Result<ChainTip, QueryError> {
        let block: BfBlock = self
            .get_json("/blocks/latest")
            .await?
            .ok_or_else(|| QueryError::Malformed("no latest block".into()))?;
        let slot = block
            .slot
            .ok_or_else(|| QueryError::Malformed("latest block has no slot".into()))?;
        Ok(ChainTip { slot, height: block.height })
    }

    async fn transaction_exists(&self, tx_hash: &TxHash) -> Result<bool, QueryError> {
        let found: Option<serde_json::Value> = self.get_json(&format!("/txs/{tx_hash}")).await?;
        Ok(found.is_some())
    }
}

// --- Wire types ---

#[derive(Deserialize)]
struct BfParameters {
    min_fee_a: u64,
    min_fee_b: u64,
    max_tx_size: u64,
    #[serde(deserialize_with = "number_or_string")]
    max_val_size: u64,
    max_block_size: u64,
    max_block_header_size: u64,
    #[serde(deserialize_with = "number_or_string")]
    key_deposit: u64,
    #[serde(deserialize_with = "number_or_string")]
    pool_deposit: u64,
    #[serde(default, deserialize_with = "optional_number_or_string")]
    coins_per_utxo_size: Option<u64>,
    #[serde(default, deserialize_with = "optional_number_or_string")]
    min_utxo: Option<u64>,
    #[serde(default)]
    collateral_percent: Option<u64>,
    #[serde(default)]
    max_collateral_inputs: Option<u64>,
    protocol_major_ver: u64,
    protocol_minor_ver: u64,
}

impl BfParameters {
    fn into_parameters(self) -> ProtocolParameters {
        ProtocolParameters {
            min_fee_a: self.min_fee_a,
            min_fee_b: self.min_fee_b,
            max_tx_size: self.max_tx_size,
            max_value_size: self.max_val_size,
            max_block_body_size: self.max_block_size,
            max_block_header_size: self.max_block_header_size,
            key_deposit: self.key_deposit,
            pool_deposit: self.pool_deposit,
            coins_per_utxo_byte: self.coins_per_utxo_size.unwrap_or(0),
            min_utxo_value: self.min_utxo.unwrap_or(0),
            collateral_percentage: self.collateral_percent.unwrap_or(0),
            max_collateral_inputs: self.max_collateral_inputs.unwrap_or(0),
            protocol_version: ProtocolVersion {
                major: self.protocol_major_ver,
                minor: self.protocol_minor_ver,
            },
        }
    }
}

#[derive(Deserialize)]
struct BfAmount {
    unit: String,
    quantity: String,
}

#[derive(Deserialize)]
struct BfUtxo {
    tx_hash: String,
    output_index: u32,
    amount: Vec<BfAmount>,
}

impl BfUtxo {
    /// Lovelace amount, or `None` if the output also carries other assets.
    fn lovelace_only(&self) -> Result<Option<u64>, QueryError> {
        let mut lovelace = None;
        for entry in &self.amount {
            if entry.unit != "lovelace" {
                return Ok(None);
            }
            let quantity = entry
                .quantity
                .parse::<u64>()
                .map_err(|_| QueryError::Malformed(format!("bad quantity {}", entry.quantity)))?;
            lovelace = Some(quantity);
        }
        Ok(lovelace)
    }
}

#[derive(Deserialize)]
struct BfBlock {
    slot: Option<u64>,
    height: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

impl NumberOrString {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s.parse().map_err(E::custom),
        }
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_u64()
}

fn optional_number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_u64)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lovelace_core::address::Network;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SENDER: &str = "addr_test1vpe3gtplyv5ygjnwnddyv0yc640hupqgkr2528xzf5nms7qalkkln";

    fn client_for(server: &MockServer) -> BlockfrostClient {
        let mut config = BlockfrostConfig::new(server.uri(), "preview-test");
        config.retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        BlockfrostClient::new(config).unwrap()
    }

    fn utxo_json(hash_byte: &str, index: u32, amounts: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "address": SENDER,
            "tx_hash": hash_byte.repeat(32),
            "tx_index": index,
            "output_index": index,
            "amount": amounts,
            "block": "7b1ee3",
            "data_hash": null,
            "inline_datum": null,
            "reference_script_hash": null
        })
    }

    #[tokio::test]
    async fn parameters_accept_string_and_number_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/epochs/latest/parameters"))
            .and(header("project_id", "preview-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "epoch": 520,
                "min_fee_a": 44,
                "min_fee_b": 155381,
                "max_block_size": 90112,
                "max_tx_size": 16384,
                "max_block_header_size": 1100,
                "key_deposit": "2000000",
                "pool_deposit": "500000000",
                "min_utxo": "4310",
                "max_val_size": "5000",
                "coins_per_utxo_size": "4310",
                "collateral_percent": 150,
                "max_collateral_inputs": 3,
                "protocol_major_ver": 9,
                "protocol_minor_ver": 0
            })))
            .mount(&server)
            .await;

        let params = client_for(&server).protocol_parameters().await.unwrap();
        assert_eq!(params.min_fee_a, 44);
        assert_eq!(params.min_fee_b, 155_381);
        assert_eq!(params.key_deposit, 2_000_000);
        assert_eq!(params.coins_per_utxo_byte, 4310);
        assert_eq!(params.max_value_size, 5000);
        assert_eq!(params.protocol_version, ProtocolVersion { major: 9, minor: 0 });
    }

    #[tokio::test]
    async fn utxos_skip_multi_asset_outputs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/addresses/{SENDER}/utxos")))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                utxo_json("aa", 0, serde_json::json!([{"unit": "lovelace", "quantity": "9997281236"}])),
                utxo_json("bb", 1, serde_json::json!([
                    {"unit": "lovelace", "quantity": "1500000"},
                    {"unit": "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a74e7574636f696e", "quantity": "1"}
                ])),
                utxo_json("cc", 2, serde_json::json!([{"unit": "lovelace", "quantity": "3000000"}])),
            ])))
            .mount(&server)
            .await;

        let address: Address = SENDER.parse().unwrap();
        let utxos = client_for(&server).utxos(&address).await.unwrap();
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].amount, 9_997_281_236);
        assert_eq!(utxos[0].input.index, 0);
        assert_eq!(utxos[1].input.tx_hash.to_string(), "cc".repeat(32));
        assert!(utxos.iter().all(|u| u.address == address));
    }

    #[tokio::test]
    async fn utxos_follow_pages() {
        let server = MockServer::start().await;
        let full: Vec<_> = (0..PAGE_SIZE as u32)
            .map(|i| utxo_json("11", i, serde_json::json!([{"unit": "lovelace", "quantity": "1000000"}])))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/addresses/{SENDER}/utxos")))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/addresses/{SENDER}/utxos")))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                utxo_json("22", 0, serde_json::json!([{"unit": "lovelace", "quantity": "5"}]))
            ])))
            .mount(&server)
            .await;

        let address: Address = SENDER.parse().unwrap();
        let utxos = client_for(&server).utxos(&address).await.unwrap();
        assert_eq!(utxos.len(), PAGE_SIZE + 1);
        assert_eq!(utxos.last().unwrap().amount, 5);
    }

    #[tokio::test]
    async fn unknown_address_has_no_utxos() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "status_code": 404, "error": "Not Found", "message": "The requested component has not been found."
            })))
            .mount(&server)
            .await;

        let address: Address = SENDER.parse().unwrap();
        assert!(client_for(&server).utxos(&address).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tip_reads_latest_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "time": 1_700_000_000, "height": 2_000_123, "slot": 41_234_567, "epoch": 520
            })))
            .mount(&server)
            .await;

        let tip = client_for(&server).tip().await.unwrap();
        assert_eq!(tip, ChainTip { slot: 41_234_567, height: Some(2_000_123) });
    }

    #[tokio::test]
    async fn transaction_lookup() {
        let server = MockServer::start().await;
        let known = TxHash::from_bytes([0xAA; 32]);
        Mock::given(method("GET"))
            .and(path(format!("/txs/{known}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"hash": known.to_string()})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.transaction_exists(&known).await.unwrap());
        assert!(!client.transaction_exists(&TxHash::from_bytes([0xBB; 32])).await.unwrap());
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks/latest"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server).tip().await.unwrap_err();
        assert_eq!(err, QueryError::Remote { status: 500, body: "boom".into() });
    }

    #[tokio::test]
    async fn forbidden_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Invalid project token."))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).tip().await.unwrap_err();
        assert!(matches!(err, QueryError::Remote { status: 403, .. }));
    }

    #[tokio::test]
    async fn malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        assert!(matches!(client_for(&server).tip().await.unwrap_err(), QueryError::Malformed(_)));
    }

    #[test]
    fn default_config_targets_preview() {
        let config = BlockfrostConfig::default();
        assert_eq!(config.base_url, BLOCKFROST_PREVIEW);
        assert_eq!(config.max_pages, 100);
        let address: Address = SENDER.parse().unwrap();
        assert_eq!(address.network(), Network::Testnet);
    }
}
