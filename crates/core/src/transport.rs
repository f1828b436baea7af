//! Seam to the realtime transport library.
//!
//! The transport is an external collaborator: it owns the wire protocol,
//! the connect timeout, and the automatic reconnection loop. The session
//! layer only consumes its notification stream and its `disconnect()`
//! method. Notifications are a closed enum rather than string-keyed
//! events so reconciliation in [`Connection`] is exhaustiveness-checked.
//!
//! [`Connection`]: crate::connection::Connection

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::config::ConnectOptions;
use crate::error::Result;

/// Notifications a transport emits over its connection's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is established.
    Connect,
    /// A connect attempt failed.
    ConnectError(String),
    /// A connect attempt exceeded the configured timeout.
    ConnectTimeout(String),
    /// An automatic reconnection attempt is starting (1-based count).
    ReconnectAttempt(u32),
    /// An automatic reconnection attempt failed; the transport will retry.
    ReconnectError(String),
    /// Automatic reconnection succeeded.
    Reconnect,
    /// The reconnection attempt cap is exhausted. The transport may or may
    /// not supply an error.
    ReconnectFailed(Option<String>),
    /// The connection closed.
    Disconnect(String),
    /// An application-level message on a named channel.
    Message { channel: String, payload: Value },
}

impl TransportEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::ConnectError(_) => "connect_error",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::ReconnectAttempt(_) => "reconnect_attempt",
            Self::ReconnectError(_) => "reconnect_error",
            Self::Reconnect => "reconnect",
            Self::ReconnectFailed(_) => "reconnect_failed",
            Self::Disconnect(_) => "disconnect",
            Self::Message { .. } => "message",
        }
    }
}

/// Live connection handle. Dropping it releases the underlying socket.
pub trait TransportHandle: Send + Sync {
    /// Asks the transport to close. The close is observed through the
    /// event stream's `Disconnect` notification, not through this call.
    fn disconnect(&self);
}

/// Factory for realtime connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection to `url` with a frozen snapshot of `options`.
    ///
    /// Returns the handle and the notification stream for this connection.
    /// An `Err` here means the transport could not even start connecting
    /// (e.g. resource exhaustion); ordinary connect failures arrive as
    /// `ConnectError`/`ConnectTimeout` events instead.
    async fn connect(
        &self,
        url: Url,
        options: &ConnectOptions,
    ) -> Result<(Box<dyn TransportHandle>, mpsc::UnboundedReceiver<TransportEvent>)>;
}
