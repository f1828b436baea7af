//! API error payload and failure classification.
//!
//! Every auth endpoint reports failures through the same wire payload.
//! The session layer only cares about a coarse classification: was the
//! request rejected outright (bad credentials), did it fail transiently
//! (timeout, service unavailable), or did the server refuse it for good.

use serde::{Deserialize, Serialize};

/// Typed failure returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Credentials were invalid (401-equivalent).
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    /// The request did not complete within the client timeout.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// The server (or the network path to it) is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The server answered with a non-retryable error status.
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },
    /// The response could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ApiError {
    /// True when the failure means the supplied credentials were refused.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected(_))
    }

    /// True when retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// Error body as it appears on the wire.
///
/// `status` 0 is what browser-side HTTP stacks report when the request
/// never reached the server; it classifies as unavailable, same as 503.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default)]
    pub timeout: bool,
}

impl From<ErrorPayload> for ApiError {
    fn from(payload: ErrorPayload) -> Self {
        if payload.timeout {
            return ApiError::Timeout(payload.message);
        }
        match payload.status {
            Some(401) => ApiError::AuthRejected(payload.message),
            Some(0) | Some(503) => ApiError::Unavailable(payload.message),
            Some(status) => ApiError::Server {
                status,
                message: payload.message,
            },
            None => ApiError::Protocol(payload.message),
        }
    }
}
