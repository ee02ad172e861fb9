//! Error types for the negotiation controller.
//!
//! Two layers are distinguished: [`TransportError`] is the structural
//! classification of failures reported by a transport capability (wrong
//! handshake phase, malformed descriptor, missing platform support), while
//! [`Error`] is the crate-level type everything else funnels into.
//! [`ErrorKind`] names the categories surfaced to the connection provider
//! through its error-reporting channel.

use crate::transport::SignalingState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories a transport capability reports from its asynchronous
/// operations (create-offer/answer, set local/remote description, add
/// candidate).
///
/// The controller classifies by variant, never by message text: the
/// signaling state embedded in [`TransportError::InvalidState`] is the
/// structural signal used to recognize the benign cross-signaling race.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The operation was attempted in the wrong phase of the handshake.
    #[error("invalid signaling state ({state:?}): {message}")]
    InvalidState {
        /// Signaling state the transport reported at failure time.
        state: SignalingState,
        /// Human-readable detail from the transport.
        message: String,
    },

    /// The descriptor or candidate was malformed or unsupported.
    #[error("invalid session content: {0}")]
    InvalidContent(String),

    /// The platform lacks the requested facility (e.g. track attachment).
    #[error("not supported by this transport: {0}")]
    Unsupported(String),

    /// Any other transport failure.
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Create an invalid-state error carrying the state at failure time.
    pub fn invalid_state(state: SignalingState, message: impl Into<String>) -> Self {
        TransportError::InvalidState {
            state,
            message: message.into(),
        }
    }

    /// Create an invalid-content error.
    pub fn invalid_content(message: impl Into<String>) -> Self {
        TransportError::InvalidContent(message.into())
    }

    /// Create an unsupported-facility error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        TransportError::Unsupported(message.into())
    }

    /// Create a generic transport error.
    pub fn other(message: impl Into<String>) -> Self {
        TransportError::Other(message.into())
    }
}

/// Error categories surfaced to the connection provider via `emit_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Connectivity checks failed; the session is terminal.
    #[serde(rename = "negotiation-failed")]
    NegotiationFailed,
    /// The transport reported itself closed; the session is terminal.
    #[serde(rename = "connection-closed")]
    ConnectionClosed,
    /// Generic transport or negotiation-step failure.
    #[serde(rename = "webrtc")]
    WebRtc,
}

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration validation failed.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// A transport operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The signaling channel rejected a send or is gone.
    #[error("signaling error: {0}")]
    Signaling(String),

    /// Payload serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Create a signaling error.
    pub fn signaling(msg: impl Into<String>) -> Self {
        Error::Signaling(msg.into())
    }
}

/// Result type for negotiation operations.
pub type Result<T> = std::result::Result<T, Error>;
