//! Transport and submission error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors from a single JSON-RPC round trip.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, bad status, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if the node could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }
}

impl From<TransportError> for flowindex_core::FlowIndexError {
    fn from(e: TransportError) -> Self {
        Self::Rpc(e.to_string())
    }
}

/// Why submitting a flow change failed.
///
/// Kept apart from reconciliation errors: a failed submission never touches
/// indexed state, and none of these are retried automatically.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The signer refused, or the node refused to sign for the account.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Mined with a failing status, or execution reverted during estimation.
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// The node could not be reached.
    #[error("Node unreachable: {0}")]
    Unreachable(String),

    /// No receipt appeared before the confirmation deadline.
    #[error("No receipt for {tx_hash} after {secs}s")]
    Timeout { tx_hash: String, secs: u64 },

    /// Missing or malformed user input; nothing was sent.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("RPC error: {0}")]
    Rpc(String),
}

/// EIP-1193 "user rejected request".
const USER_REJECTED: i64 = 4001;

impl From<TransportError> for SubmissionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Http(msg) => Self::Unreachable(msg),
            TransportError::Timeout { ms } => Self::Unreachable(format!("timed out after {ms}ms")),
            TransportError::Rpc(err) => {
                let lower = err.message.to_lowercase();
                if err.code == USER_REJECTED
                    || lower.contains("rejected")
                    || lower.contains("unknown account")
                    || lower.contains("no signer")
                {
                    Self::Rejected(err.message)
                } else if lower.contains("revert") {
                    Self::Reverted(err.message)
                } else {
                    Self::Rpc(err.to_string())
                }
            }
            other => Self::Rpc(other.to_string()),
        }
    }
}

impl From<flowindex_core::ConversionError> for SubmissionError {
    fn from(e: flowindex_core::ConversionError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(code: i64, message: &str) -> TransportError {
        TransportError::Rpc(JsonRpcError {
            code,
            message: message.into(),
            data: None,
        })
    }

    #[test]
    fn classify_node_errors() {
        assert!(matches!(
            SubmissionError::from(rpc(4001, "User denied transaction signature")),
            SubmissionError::Rejected(_)
        ));
        assert!(matches!(
            SubmissionError::from(rpc(-32000, "unknown account")),
            SubmissionError::Rejected(_)
        ));
        assert!(matches!(
            SubmissionError::from(rpc(-32603, "execution reverted: CFA: flow already exist")),
            SubmissionError::Reverted(_)
        ));
        assert!(matches!(
            SubmissionError::from(rpc(-32601, "method not found")),
            SubmissionError::Rpc(_)
        ));
        assert!(matches!(
            SubmissionError::from(TransportError::Http("connection refused".into())),
            SubmissionError::Unreachable(_)
        ));
    }
}
