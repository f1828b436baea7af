//! Realtime connection management.
//!
//! [`Connection`] wraps one transport connection and keeps it useful to
//! callers: it derives the connect query from the current access
//! credential, lets the transport run its own reconnection loop, and
//! collapses the transport's granular notifications into the small public
//! [`ConnectionEvent`] surface. While the transport is recovering on its
//! own, its connect errors are expected noise and are not re-surfaced;
//! only the terminal outcomes (`Reconnect`, `ReconnectFailed`) are.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::ConnectOptions;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent, TransportHandle};
use tether_protocol::AccessCredential;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Connection lifecycle, as far as callers can observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Automatic recovery gave up; only a fresh `connect()` helps.
    LostPermanently,
}

/// Public notifications, after reconnect-noise collapsing.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The initial connection is established.
    Connect,
    /// The initial connection attempt failed.
    ConnectError(Error),
    /// The initial connection attempt timed out.
    ConnectTimeout(Error),
    /// Automatic recovery succeeded.
    Reconnect,
    /// Automatic recovery gave up; the connection is permanently lost.
    ReconnectFailed(Error),
    /// The connection closed.
    Disconnect,
    /// An application-level message on a named channel.
    Message { channel: String, payload: Value },
}

/// Bounds on how long automatic recovery can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryTime {
    /// Every reconnect attempt succeeds right after its delay.
    pub best: Duration,
    /// Every reconnect attempt also exhausts its connect timeout.
    pub worst: Duration,
}

struct Inner {
    state: ConnectionState,
    connected: bool,
    reconnecting_count: u32,
    disconnected_at: Option<Instant>,
    handle: Option<Box<dyn TransportHandle>>,
    dispatch: Option<JoinHandle<()>>,
}

/// Maintains one realtime connection to the service.
///
/// Cheap to clone; clones share the same connection state.
#[derive(Clone)]
pub struct Connection {
    server_url: Url,
    workspace_id: String,
    options: ConnectOptions,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<ConnectionEvent>,
    inner: Arc<Mutex<Inner>>,
}

impl Connection {
    pub fn new(
        server_url: Url,
        workspace_id: String,
        options: ConnectOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            server_url,
            workspace_id,
            options,
            transport,
            events,
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                connected: false,
                reconnecting_count: 0,
                disconnected_at: None,
                handle: None,
                dispatch: None,
            })),
        }
    }

    /// Subscribes to public connection notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// True while a transport handle is held (connected or recovering).
    pub fn is_open(&self) -> bool {
        self.inner.lock().handle.is_some()
    }

    /// Opens the connection with a query derived from `credential`,
    /// resolving once the initial connect succeeds or fails.
    ///
    /// A previously open connection is closed first. The options snapshot
    /// handed to the transport is frozen for this connection's lifetime;
    /// later credential updates only apply to the next `connect()` call.
    pub async fn connect(&self, credential: &AccessCredential) -> Result<()> {
        let (stale_handle, stale_dispatch) = {
            let mut inner = self.inner.lock();
            inner.state = ConnectionState::Connecting;
            inner.connected = false;
            inner.reconnecting_count = 0;
            (inner.handle.take(), inner.dispatch.take())
        };
        if let Some(dispatch) = stale_dispatch {
            dispatch.abort();
        }
        if let Some(handle) = stale_handle {
            handle.disconnect();
        }

        let url = self.connect_url(credential);
        debug!(
            target: "tether.connection",
            server = %self.server_url,
            options = ?self.options,
            "connecting"
        );
        let (handle, events_rx) = match self.transport.connect(url, &self.options).await {
            Ok(parts) => parts,
            Err(err) => {
                self.inner.lock().state = ConnectionState::Disconnected;
                return Err(err);
            }
        };

        let (outcome_tx, outcome_rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            inner.handle = Some(handle);
            inner.dispatch = Some(tokio::spawn(dispatch_loop(
                events_rx,
                Arc::downgrade(&self.inner),
                self.events.clone(),
                outcome_tx,
            )));
        }

        match outcome_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Connect(
                "transport closed before the initial connect resolved".to_string(),
            )),
        }
    }

    /// Asks the transport to close. No public notification is emitted
    /// here; the transport's own disconnect notification is relied upon.
    /// Harmless when the connection is already closed.
    pub fn disconnect(&self) {
        let handle = self.inner.lock().handle.take();
        match handle {
            Some(handle) => handle.disconnect(),
            None => debug!(target: "tether.connection", "disconnect with no open transport"),
        }
    }

    /// Bounds on automatic recovery duration for the configured options.
    ///
    /// Delays grow linearly from the floor d and saturate at the ceiling
    /// D after m = D/d attempts, so over n attempts the delay sum
    /// collapses to D*(n - (m+1)/2). The worst case adds one full connect
    /// timeout per attempt on top.
    pub fn recovery_time(&self) -> RecoveryTime {
        let opt = &self.options;
        if !opt.reconnection {
            return RecoveryTime {
                best: Duration::ZERO,
                worst: Duration::ZERO,
            };
        }

        let n = f64::from(opt.reconnection_attempts);
        let t = opt.connect_timeout.as_millis() as f64;
        let d = opt.reconnection_delay.as_millis() as f64;
        let ceiling = opt.reconnection_delay_max.as_millis() as f64;
        let m = ceiling / d;

        let best = ceiling * (n - (m + 1.0) / 2.0);
        let worst = best + n * t;
        RecoveryTime {
            best: Duration::from_millis(best.max(0.0) as u64),
            worst: Duration::from_millis(worst.max(0.0) as u64),
        }
    }

    fn connect_url(&self, credential: &AccessCredential) -> Url {
        let mut url = self.server_url.clone();
        url.query_pairs_mut()
            .append_pair("token", &credential.text)
            .append_pair("sessionId", &credential.session_id)
            .append_pair("workspaceId", &self.workspace_id);
        url
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(dispatch) = self.dispatch.take() {
            dispatch.abort();
        }
    }
}

async fn dispatch_loop(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    inner: std::sync::Weak<Mutex<Inner>>,
    public: broadcast::Sender<ConnectionEvent>,
    outcome: oneshot::Sender<Result<()>>,
) {
    let mut outcome = Some(outcome);
    while let Some(event) = events.recv().await {
        // the owning Connection may be gone; late notifications are ignored
        let Some(inner) = inner.upgrade() else {
            break;
        };
        reconcile(event, &inner, &public, &mut outcome);
    }
    debug!(target: "tether.connection", "transport notification stream ended");
}

/// Applies one transport notification to the connection state and decides
/// what, if anything, becomes public.
fn reconcile(
    event: TransportEvent,
    inner: &Mutex<Inner>,
    public: &broadcast::Sender<ConnectionEvent>,
    outcome: &mut Option<oneshot::Sender<Result<()>>>,
) {
    match event {
        TransportEvent::Connect => {
            let (first, already_connected, took) = {
                let mut state = inner.lock();
                let first = state.reconnecting_count == 0;
                let already = state.connected;
                state.connected = true;
                state.state = ConnectionState::Connected;
                state.reconnecting_count = 0;
                let took = state.disconnected_at.take().map(|at| at.elapsed());
                (first, already, took)
            };
            debug!(
                target: "tether.connection",
                took_ms = took.map(|d| d.as_millis() as u64),
                "connected to server"
            );
            if let Some(tx) = outcome.take() {
                let _ = tx.send(Ok(()));
            }
            if first && !already_connected {
                let _ = public.send(ConnectionEvent::Connect);
            }
        }
        TransportEvent::ConnectError(message) => {
            handle_connect_failure(
                Error::Connect(message),
                ConnectionEvent::ConnectError,
                inner,
                public,
                outcome,
            );
        }
        TransportEvent::ConnectTimeout(message) => {
            handle_connect_failure(
                Error::ConnectTimeout(message),
                ConnectionEvent::ConnectTimeout,
                inner,
                public,
                outcome,
            );
        }
        TransportEvent::ReconnectAttempt(count) => {
            let reconnecting_for = {
                let mut state = inner.lock();
                state.reconnecting_count = count;
                state.state = ConnectionState::Reconnecting;
                state.disconnected_at.map(|at| at.elapsed())
            };
            debug!(
                target: "tether.connection",
                attempt = count,
                reconnecting_for_ms = reconnecting_for.map(|d| d.as_millis() as u64),
                "trying to recover connection"
            );
        }
        TransportEvent::ReconnectError(message) => {
            warn!(target: "tether.connection", %message, "reconnect attempt failed");
        }
        TransportEvent::Reconnect => {
            let downtime = {
                let mut state = inner.lock();
                state.connected = true;
                state.state = ConnectionState::Connected;
                state.reconnecting_count = 0;
                state.disconnected_at.take().map(|at| at.elapsed())
            };
            debug!(
                target: "tether.connection",
                downtime_ms = downtime.map(|d| d.as_millis() as u64),
                "recovered connection"
            );
            let _ = public.send(ConnectionEvent::Reconnect);
        }
        TransportEvent::ReconnectFailed(message) => {
            let err = Error::RecoveryFailed(
                message.unwrap_or_else(|| "too many reconnect attempts, reached the limit".to_string()),
            );
            let reconnecting_for = {
                let mut state = inner.lock();
                state.connected = false;
                state.state = ConnectionState::LostPermanently;
                state.reconnecting_count = 0;
                state.disconnected_at.map(|at| at.elapsed())
            };
            error!(
                target: "tether.connection",
                error = %err,
                reconnecting_for_ms = reconnecting_for.map(|d| d.as_millis() as u64),
                "lost connection"
            );
            if let Some(tx) = outcome.take() {
                let _ = tx.send(Err(err.clone()));
            }
            let _ = public.send(ConnectionEvent::ReconnectFailed(err));
        }
        TransportEvent::Disconnect(reason) => {
            {
                let mut state = inner.lock();
                state.connected = false;
                state.disconnected_at = Some(Instant::now());
                if state.state != ConnectionState::LostPermanently {
                    state.state = ConnectionState::Disconnected;
                }
            }
            debug!(target: "tether.connection", %reason, "disconnected from server");
            let _ = public.send(ConnectionEvent::Disconnect);
        }
        TransportEvent::Message { channel, payload } => {
            let _ = public.send(ConnectionEvent::Message { channel, payload });
        }
    }
}

/// Initial connect failures are terminal for that attempt and become
/// public; failures while the transport is already reconnecting are
/// handled by the reconnect notifications instead.
fn handle_connect_failure(
    err: Error,
    wrap: fn(Error) -> ConnectionEvent,
    inner: &Mutex<Inner>,
    public: &broadcast::Sender<ConnectionEvent>,
    outcome: &mut Option<oneshot::Sender<Result<()>>>,
) {
    let reconnecting = {
        let mut state = inner.lock();
        if state.reconnecting_count == 0 {
            state.state = ConnectionState::Disconnected;
        }
        state.reconnecting_count > 0
    };
    if reconnecting {
        debug!(target: "tether.connection", error = %err, "connect failure during recovery");
        return;
    }
    error!(target: "tether.connection", error = %err, "connect failed");
    if let Some(tx) = outcome.take() {
        let _ = tx.send(Err(err.clone()));
    }
    let _ = public.send(wrap(err));
}
