//! In-memory transport for unit testing connection reconciliation.
//!
//! Provides a scriptable transport so the session layer can be exercised
//! without a realtime server. The controller injects notification
//! sequences and inspects what the layer asked the transport to do.
//!
//! # Example
//!
//! ```ignore
//! let (transport, controller) = FakeTransport::new();
//! let connection = Connection::new(url, "ws-1".into(), options, Arc::new(transport));
//!
//! let connect = tokio::spawn({
//!     let connection = connection.clone();
//!     async move { connection.connect(&credential).await }
//! });
//! controller.emit(TransportEvent::Connect);
//! connect.await??;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::config::ConnectOptions;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent, TransportHandle};

/// What the fake observed for one `connect()` call.
#[derive(Debug, Clone)]
pub struct ConnectRecord {
    pub url: Url,
    pub options: ConnectOptions,
}

#[derive(Default)]
struct Shared {
    /// Sequence number and event sender of the current connection. The
    /// only sender copy lives here, so clearing it closes the stream.
    sender: Mutex<Option<(u64, mpsc::UnboundedSender<TransportEvent>)>>,
    seq: Mutex<u64>,
    connects: Mutex<Vec<ConnectRecord>>,
    disconnects: Mutex<u32>,
    fail_next_connect: Mutex<Option<String>>,
    swallow_disconnects: Mutex<bool>,
}

/// Scriptable [`Transport`] implementation.
pub struct FakeTransport {
    shared: Arc<Shared>,
}

impl FakeTransport {
    /// Builds the fake transport and its controller.
    pub fn new() -> (Self, FakeTransportController) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            FakeTransportController { shared },
        )
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        url: Url,
        options: &ConnectOptions,
    ) -> Result<(Box<dyn TransportHandle>, mpsc::UnboundedReceiver<TransportEvent>)> {
        if let Some(message) = self.shared.fail_next_connect.lock().take() {
            return Err(Error::Connect(message));
        }
        self.shared.connects.lock().push(ConnectRecord {
            url,
            options: options.clone(),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let seq = {
            let mut seq = self.shared.seq.lock();
            *seq += 1;
            *seq
        };
        *self.shared.sender.lock() = Some((seq, tx));
        let handle = FakeHandle {
            shared: Arc::clone(&self.shared),
            seq,
        };
        Ok((Box::new(handle), rx))
    }
}

struct FakeHandle {
    shared: Arc<Shared>,
    seq: u64,
}

impl TransportHandle for FakeHandle {
    fn disconnect(&self) {
        *self.shared.disconnects.lock() += 1;
        if *self.shared.swallow_disconnects.lock() {
            return;
        }
        // a real transport acknowledges the close through its own
        // notification stream, then goes silent; a stale handle must not
        // touch a newer connection's stream
        let mut current = self.shared.sender.lock();
        if current.as_ref().is_some_and(|(seq, _)| *seq == self.seq) {
            if let Some((_, sender)) = current.take() {
                let _ = sender.send(TransportEvent::Disconnect("client disconnect".to_string()));
            }
        }
    }
}

/// Controller for injecting notifications and inspecting transport usage.
pub struct FakeTransportController {
    shared: Arc<Shared>,
}

impl FakeTransportController {
    /// Injects a notification into the current connection's stream.
    /// Returns false when no connection is open.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match &*self.shared.sender.lock() {
            Some((_, sender)) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Drops the notification stream without a disconnect notification,
    /// as if the transport process died.
    pub fn drop_stream(&self) {
        self.shared.sender.lock().take();
    }

    /// Makes the next `connect()` call fail before producing a handle.
    pub fn fail_next_connect(&self, message: impl Into<String>) {
        *self.shared.fail_next_connect.lock() = Some(message.into());
    }

    /// Makes `disconnect()` calls go unacknowledged: they are still
    /// counted, but no `Disconnect` notification is delivered.
    pub fn swallow_disconnects(&self) {
        *self.shared.swallow_disconnects.lock() = true;
    }

    /// Number of `connect()` calls observed.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.lock().len()
    }

    /// URL and options of the most recent `connect()` call.
    pub fn last_connect(&self) -> Option<ConnectRecord> {
        self.shared.connects.lock().last().cloned()
    }

    /// Number of `disconnect()` calls observed.
    pub fn disconnect_count(&self) -> u32 {
        *self.shared.disconnects.lock()
    }

    /// True while a connection's notification stream is open.
    pub fn has_connection(&self) -> bool {
        self.shared.sender.lock().is_some()
    }
}
