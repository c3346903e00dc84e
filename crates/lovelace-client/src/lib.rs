//! # lovelace-client — talking to the outside world.
//!
//! - [`submit`] — posts signed transactions to a submit endpoint and
//!   classifies the answer as accepted, rejected, unavailable or unknown
//! - [`query`] — `LedgerQuery` over the Blockfrost HTTP API
//! - [`snapshot`] — `LedgerQuery` over an in-memory or JSON-file snapshot
//! - [`retry`] — backoff for idempotent reads and a cancellation signal
//! - [`error`] — `SubmitError`

pub mod error;
pub mod query;
pub mod retry;
pub mod snapshot;
pub mod submit;

pub use error::SubmitError;
pub use query::{BlockfrostClient, BlockfrostConfig};
pub use retry::{cancellation, CancelHandle, Cancellation, RetryPolicy};
pub use snapshot::{LedgerSnapshot, SnapshotLedger};
pub use submit::{Reconciliation, SubmitClient, SubmitConfig};
