//! Error types for the flowindex pipeline.

use thiserror::Error;

/// Errors that can occur while reconciling or querying streams.
#[derive(Debug, Error)]
pub enum FlowIndexError {
    /// An inbound flow event is missing a required field or carries an invalid value.
    /// The store is never touched for such events.
    #[error("Invalid flow event: field '{field}' {reason}")]
    InvalidEvent { field: &'static str, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl FlowIndexError {
    /// Shorthand for an [`FlowIndexError::InvalidEvent`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error is a rejected (malformed) event rather than
    /// an infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidEvent { .. })
    }
}

/// Errors from converting a human monthly amount into a native flow rate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("empty amount")]
    Empty,

    #[error("'{0}' is not a decimal number")]
    NotANumber(String),

    #[error("'{0}' has more than 18 fractional digits")]
    TooPrecise(String),

    #[error("'{0}' is out of range")]
    Overflow(String),
}
