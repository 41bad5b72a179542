//! Error types for request sessions.
//!
//! Every failure a session can produce is one variant of [`RequestError`].
//! Only [`TransportError`] ever reaches [`RequestState::error`](crate::RequestState);
//! the other variants are returned to callers directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for request operations.
pub type Result<T> = std::result::Result<T, RequestError>;

/// Error taxonomy for request sessions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    /// Malformed configuration, raised before any request runs.
    #[error("Invalid request options: {0}")]
    Config(#[from] ConfigError),

    /// The in-flight request was cancelled through its cancellation token.
    ///
    /// Routed to the `Cancel` transition; never stored as state error.
    #[error("Request was cancelled")]
    Cancelled,

    /// The executor failed for any reason other than cancellation.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `abort()` was called with nothing in flight.
    #[error("No pending request to abort")]
    NoPendingRequest,

    /// A defect inside the session (e.g. a request task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// Build a transport error from a message.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(TransportError::new(message))
    }

    /// Check if this is the cancellation signal
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Extract the error value that is recorded into request state.
    ///
    /// Transport errors are returned as-is; anything else the executor
    /// surfaced is flattened into a transport error carrying its message.
    #[must_use]
    pub fn to_transport(&self) -> TransportError {
        match self {
            Self::Transport(error) => error.clone(),
            other => TransportError::new(other.to_string()),
        }
    }
}

/// Failure reported by a request executor.
///
/// Carries an extractable message plus optional status code and structured
/// payload (for example an error body returned by the server).
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct TransportError {
    /// Human-readable failure description
    pub message: String,
    /// Status code reported by the transport, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Structured error payload, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl TransportError {
    /// Create a transport error with only a message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            payload: None,
        }
    }

    /// Attach a status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a structured payload
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Configuration errors raised by the options validator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A settings key outside the recognized option set.
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    /// A callable option was given a plain data value.
    #[error("Option `{0}` must be callable")]
    NotCallable(String),

    /// A required callable option was never provided.
    #[error("Option `{0}` is required")]
    MissingCallable(&'static str),

    /// `cache_policy` is not one of the supported literals.
    #[error("Unsupported cache policy: {0} (expected \"no-cache\" or \"cache-and-network\")")]
    InvalidCachePolicy(String),

    /// A recognized setting holds a value of the wrong shape.
    #[error("Invalid value for option `{option}`: {reason}")]
    InvalidSetting {
        /// Option name
        option: String,
        /// Why the value was rejected
        reason: String,
    },
}
