//! Session layer error type.
//!
//! The taxonomy mirrors how each failure is handled, not where it came
//! from: configuration errors are fatal and propagate, transient errors
//! are retried by whichever component owns the retry, auth rejections are
//! retried with fresh credentials up to a bound, and terminal losses are
//! surfaced through lifecycle events so the embedding application can
//! restart the session.
//!
//! All variants are `Clone` so lifecycle events can carry the error that
//! caused them.

use tether_protocol::{ApiError, InvalidCredential};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The issuing server granted a lifetime too short to renew safely.
    /// Fix the server configuration; at least 2 minutes, usually 10.
    #[error("issued credential expires too soon (ttl {ttl_ms} ms, renewal margin {margin_ms} ms)")]
    TokenTooShortLived { ttl_ms: u64, margin_ms: u64 },

    /// A renewal could no longer be scheduled before expiry (clock drift
    /// or a renewal that took too long).
    #[error("cannot schedule renewal before expiry (ttl {ttl_ms} ms, requested delay {delay_ms} ms)")]
    RenewalOverdue { ttl_ms: u64, delay_ms: u64 },

    /// The login retry bound was exhausted.
    #[error("too many login failures ({attempts} attempts)")]
    TooManyLoginFailures { attempts: u32 },

    /// The credential source could not supply identifiers.
    #[error("credential source failed: {0}")]
    CredentialSource(String),

    /// An auth endpoint reported a failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// An issued credential violated the expiry-after-issuance invariant.
    #[error(transparent)]
    InvalidCredential(#[from] InvalidCredential),

    /// The initial connection attempt failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The initial connection attempt timed out.
    #[error("connect timed out: {0}")]
    ConnectTimeout(String),

    /// Automatic reconnection gave up; the connection is permanently lost.
    #[error("connection recovery failed: {0}")]
    RecoveryFailed(String),

    /// The transport never acknowledged an explicit disconnect.
    #[error("transport did not acknowledge disconnect within {timeout_ms} ms")]
    DisconnectTimeout { timeout_ms: u64 },

    /// Invalid session configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// True when retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api(err) => err.is_transient(),
            _ => false,
        }
    }

    /// True when the failure means supplied credentials were refused.
    pub fn is_auth_rejected(&self) -> bool {
        match self {
            Self::Api(err) => err.is_auth_rejected(),
            _ => false,
        }
    }
}
