//! Error types for the Lovelace core.
use thiserror::Error;

/// How a caller should react to a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed caller input. Fix the input; never retry.
    Input,
    /// The transaction breaks a ledger rule. Reselect inputs or change the request.
    Policy,
    /// A remote service failed or rejected the request. Its diagnostic is attached.
    Remote,
    /// The outcome of a submission is unknown. Verify on chain before resubmitting.
    Ambiguous,
}

/// Malformed address text or bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid HRP: {0}")] InvalidHrp(String),
    #[error("invalid length: {0} bytes")] InvalidLength(usize),
    #[error("invalid checksum")] InvalidChecksum,
    #[error("invalid character: {0}")] InvalidCharacter(char),
    #[error("invalid padding bits")] InvalidPadding,
    #[error("unknown network id: {0}")] UnknownNetwork(u8),
    #[error("prefix {hrp} does not match network id {network_id}")] NetworkMismatch { hrp: String, network_id: u8 },
    #[error("unsupported address type: {0}")] UnsupportedType(u8),
    #[error("missing separator")] MissingSeparator,
    #[error("mixed case")] MixedCase,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("serialization limit exceeded: {size} > {max}")] SerializationLimitExceeded { size: usize, max: usize },
    #[error("value overflow")] ValueOverflow,
    #[error("encoding: {0}")] Encoding(String),
    #[error("decoding: {0}")] Decoding(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid verification key bytes")] InvalidVerificationKey,
    #[error("signature verification failed")] VerificationFailed,
    #[error("missing witness for key hash {0}")] MissingWitness(String),
}

/// Failures of the ledger query service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("query service unavailable: {0}")] Unavailable(String),
    #[error("query rejected ({status}): {body}")] Remote { status: u16, body: String },
    #[error("malformed response: {0}")] Malformed(String),
    #[error("request timed out")] Timeout,
    #[error("cancelled")] Cancelled,
}

impl TransactionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransactionError::SerializationLimitExceeded { .. } | TransactionError::ValueOverflow => {
                ErrorCategory::Policy
            }
            TransactionError::Encoding(_) | TransactionError::Decoding(_) => ErrorCategory::Input,
        }
    }
}

impl QueryError {
    /// Whether an idempotent read that failed this way may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueryError::Unavailable(_) | QueryError::Timeout => true,
            QueryError::Remote { status, .. } => *status == 429 || *status >= 500,
            QueryError::Malformed(_) | QueryError::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_serialization_limit() {
        let e = TransactionError::SerializationLimitExceeded { size: 20_000, max: 16_384 };
        assert_eq!(e.to_string(), "serialization limit exceeded: 20000 > 16384");
    }

    #[test]
    fn transaction_error_categories() {
        let limit = TransactionError::SerializationLimitExceeded { size: 2, max: 1 };
        assert_eq!(limit.category(), ErrorCategory::Policy);
        assert_eq!(TransactionError::Decoding("x".into()).category(), ErrorCategory::Input);
    }

    #[test]
    fn retryable_classification() {
        assert!(QueryError::Timeout.is_retryable());
        assert!(QueryError::Unavailable("refused".into()).is_retryable());
        assert!(QueryError::Remote { status: 429, body: String::new() }.is_retryable());
        assert!(QueryError::Remote { status: 502, body: String::new() }.is_retryable());
        assert!(!QueryError::Remote { status: 404, body: String::new() }.is_retryable());
        assert!(!QueryError::Cancelled.is_retryable());
        assert!(!QueryError::Malformed("x".into()).is_retryable());
    }
}
