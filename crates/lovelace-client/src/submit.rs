//! Transaction submission.
//!
//! A signed transaction is posted as raw CBOR to a cardano-submit-api style
//! endpoint. The answer is classified into four outcomes:
//!
//! | Response | Result |
//! |---|---|
//! | 2xx with the expected id | `Ok(tx_hash)` |
//! | 4xx | [`SubmitError::Rejected`], body passed through verbatim |
//! | 503, or the connection could not be made | [`SubmitError::Unavailable`] |
//! | other 5xx, timeout, cancel or broken body after sending | [`SubmitError::UnknownOutcome`] |
//!
//! Submissions are never retried automatically. After an unknown outcome,
//! [`SubmitClient::resubmit`] asks the ledger first.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::{info, warn};

use lovelace_core::traits::LedgerQuery;
use lovelace_core::types::{Transaction, TxHash};

use crate::error::SubmitError;
use crate::retry::Cancellation;

/// Local cardano-submit-api.
pub const DEFAULT_SUBMIT_URL: &str = "http://localhost:8090/api/submit/tx";

/// Media type of a raw signed transaction.
pub const CBOR_CONTENT_TYPE: &str = "application/cbor";

/// Submission endpoint settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitConfig {
    pub url: String,
    pub timeout: Duration,
    /// Sent as the `project_id` header, for Blockfrost's `/tx/submit`.
    pub project_id: Option<String>,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SUBMIT_URL.to_string(),
            timeout: Duration::from_secs(30),
            project_id: None,
        }
    }
}

/// What the ledger says about a transaction whose submission outcome is unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    OnChain,
    NotFound,
}

/// HTTP client for a submit endpoint.
#[derive(Debug, Clone)]
pub struct SubmitClient {
    config: SubmitConfig,
    client: reqwest::Client,
}

impl SubmitClient {
    pub fn new(config: SubmitConfig) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SubmitError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SubmitConfig {
        &self.config
    }

    /// Encode and submit a signed transaction.
    pub async fn submit(&self, tx: &Transaction, cancel: &Cancellation) -> Result<TxHash, SubmitError> {
        let bytes = tx.to_bytes()?;
        let tx_hash = tx.id()?;
        self.send(bytes, tx_hash, cancel).await
    }

    /// Submit already encoded bytes exactly as given.
    pub async fn submit_raw(&self, bytes: &[u8], cancel: &Cancellation) -> Result<TxHash, SubmitError> {
        let tx_hash = Transaction::from_bytes(bytes)?.id()?;
        self.send(bytes.to_vec(), tx_hash, cancel).await
    }

    /// Look the transaction up on the ledger.
    pub async fn reconcile(&self, ledger: &dyn LedgerQuery, tx_hash: &TxHash) -> Result<Reconciliation, SubmitError> {
        if ledger.transaction_exists(tx_hash).await? {
            Ok(Reconciliation::OnChain)
        } else {
            Ok(Reconciliation::NotFound)
        }
    }

    /// Submit again after an earlier attempt, unless the ledger already has it.
    ///
    /// A transaction that is not on chain yet may still be in a mempool; the
    /// node then rejects the duplicate, which surfaces as [`SubmitError::Rejected`].
    pub async fn resubmit(
        &self,
        tx: &Transaction,
        ledger: &dyn LedgerQuery,
        cancel: &Cancellation,
    ) -> Result<TxHash, SubmitError> {
        let tx_hash = tx.id()?;
        match self.reconcile(ledger, &tx_hash).await? {
            Reconciliation::OnChain => {
                info!(%tx_hash, "transaction already on chain, not resubmitting");
                Ok(tx_hash)
            }
            Reconciliation::NotFound => self.submit(tx, cancel).await,
        }
    }

    async fn send(&self, bytes: Vec<u8>, tx_hash: TxHash, cancel: &Cancellation) -> Result<TxHash, SubmitError> {
        if cancel.is_cancelled() {
            return Err(SubmitError::Cancelled);
        }
        let size = bytes.len();
        let mut request = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, CBOR_CONTENT_TYPE)
            .body(bytes);
        if let Some(project_id) = &self.config.project_id {
            request = request.header("project_id", project_id);
        }

        info!(%tx_hash, size, url = %self.config.url, "submitting transaction");
        let unknown = |reason: String| SubmitError::UnknownOutcome { tx_hash, reason };

        let response = tokio::select! {
            r = request.send() => r,
            _ = cancel.cancelled() => return Err(unknown("cancelled while sending".into())),
        };
        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_connect() => return Err(SubmitError::Unavailable(e.to_string())),
            Err(e) if e.is_timeout() => return Err(unknown("timed out waiting for a response".into())),
            Err(e) => return Err(unknown(e.to_string())),
        };

        let status = response.status();
        let body = tokio::select! {
            b = response.text() => b,
            _ = cancel.cancelled() => return Err(unknown(format!("cancelled reading {status} response"))),
        };
        let body = match body {
            Ok(b) => b,
            Err(e) if status.is_client_error() => format!("<unreadable response body: {e}>"),
            Err(e) => return Err(unknown(format!("status {status}, unreadable body: {e}"))),
        };

        let result = classify(status, body, tx_hash);
        match &result {
            Ok(_) => info!(%tx_hash, "transaction accepted"),
            Err(e) => warn!(%tx_hash, error = %e, "submission failed"),
        }
        result
    }
}

fn classify(status: StatusCode, body: String, tx_hash: TxHash) -> Result<TxHash, SubmitError> {
    if status.is_success() {
        let returned = acknowledged_id(&body);
        return match returned.parse::<TxHash>() {
            Ok(id) if id == tx_hash => Ok(tx_hash),
            _ => Err(SubmitError::HashMismatch { expected: tx_hash, returned }),
        };
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(SubmitError::Unavailable(body));
    }
    if status.is_client_error() {
        return Err(SubmitError::Rejected { status: status.as_u16(), diagnostic: body });
    }
    Err(SubmitError::UnknownOutcome { tx_hash, reason: format!("status {status}: {body}") })
}

/// The id in a success body: a JSON string or bare hex.
fn acknowledged_id(body: &str) -> String {
    let trimmed = body.trim();
    serde_json::from_str::<String>(trimmed).unwrap_or_else(|_| trimmed.to_string())
}
