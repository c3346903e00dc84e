//! Submission error types.

use lovelace_core::error::{ErrorCategory, QueryError, TransactionError};
use lovelace_core::types::TxHash;
use thiserror::Error;

/// Why a submission did not end in a confirmed acceptance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The endpoint refused the transaction. `diagnostic` is the response
    /// body exactly as received.
    #[error("submission rejected ({status}): {diagnostic}")]
    Rejected { status: u16, diagnostic: String },

    /// The request never reached a node that could accept it.
    #[error("submission endpoint unavailable: {0}")]
    Unavailable(String),

    /// The request may have been delivered. Check the chain before resubmitting.
    #[error("outcome of {tx_hash} unknown: {reason}")]
    UnknownOutcome { tx_hash: TxHash, reason: String },

    /// The endpoint acknowledged a different transaction id.
    #[error("endpoint acknowledged {returned}, expected {expected}")]
    HashMismatch { expected: TxHash, returned: String },

    /// Cancelled before anything was sent.
    #[error("submission cancelled")]
    Cancelled,

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl SubmitError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SubmitError::Rejected { .. }
            | SubmitError::Unavailable(_)
            | SubmitError::Cancelled
            | SubmitError::Query(_) => ErrorCategory::Remote,
            SubmitError::UnknownOutcome { .. } | SubmitError::HashMismatch { .. } => ErrorCategory::Ambiguous,
            SubmitError::Config(_) => ErrorCategory::Input,
            SubmitError::Transaction(e) => e.category(),
        }
    }

    /// Whether the transaction is known not to have been delivered, so
    /// sending it again cannot double-submit.
    pub fn safe_to_resend(&self) -> bool {
        matches!(self, SubmitError::Unavailable(_) | SubmitError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_display_keeps_diagnostic() {
        let e = SubmitError::Rejected { status: 400, diagnostic: "BadInputsUTxO".into() };
        assert_eq!(e.to_string(), "submission rejected (400): BadInputsUTxO");
        assert_eq!(e.category(), ErrorCategory::Remote);
    }

    #[test]
    fn unknown_outcome_is_ambiguous() {
        let e = SubmitError::UnknownOutcome { tx_hash: TxHash::ZERO, reason: "timeout".into() };
        assert_eq!(e.category(), ErrorCategory::Ambiguous);
        assert!(!e.safe_to_resend());
    }

    #[test]
    fn unavailable_is_safe_to_resend() {
        assert!(SubmitError::Unavailable("connection refused".into()).safe_to_resend());
        assert!(!SubmitError::Rejected { status: 400, diagnostic: String::new() }.safe_to_resend());
    }

    #[test]
    fn transaction_errors_keep_category() {
        let e: SubmitError = TransactionError::Decoding("truncated".into()).into();
        assert_eq!(e.category(), ErrorCategory::Input);
    }
}
