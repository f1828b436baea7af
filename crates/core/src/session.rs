//! Session facade.
//!
//! [`SessionManager`] owns the three timing domains - login, credential
//! renewal, realtime connection - and sequences them: start runs login,
//! installs the issued credential, then opens the connection; stop runs
//! the same stages in reverse. Either sequence fails fast, emitting a
//! lifecycle notification before the original error propagates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::api::AuthApi;
use crate::auth::{Authenticator, CredentialSource};
use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionEvent};
use crate::error::{Error, Result};
use crate::token::TokenManager;
use crate::transport::Transport;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Bound on waiting for the transport to acknowledge an explicit close.
/// Transports do not report close failures, so the wait is bounded
/// instead.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Session lifecycle notifications.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Start,
    StartError(Error),
    Stop,
    StopError(Error),
}

/// Explicitly constructed session context; owns all session state.
pub struct SessionManager {
    config: SessionConfig,
    auth: Authenticator,
    tokens: TokenManager,
    connection: Connection,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        api: Arc<dyn AuthApi>,
        source: Arc<dyn CredentialSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let auth = Authenticator::new(
            Arc::clone(&api),
            source,
            config.master_credential().cloned(),
            config.login_max_retries(),
        );
        let tokens = TokenManager::new(api, config.renewal_margin());
        let connection = Connection::new(
            config.server_url().clone(),
            config.workspace_id().to_string(),
            config.connect_options().clone(),
            transport,
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            auth,
            tokens,
            connection,
            events,
        }
    }

    /// Subscribes to session lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// The credential lifecycle component; observe its events to learn
    /// when the credential is renewed or lost.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// The realtime connection component.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Starts the session: login, install the issued credential, open the
    /// realtime connection. Any stage's failure aborts the remaining
    /// stages and propagates after a `StartError` notification.
    pub async fn start(&self) -> Result<()> {
        match self.run_start().await {
            Ok(()) => {
                info!(target: "tether.session", "session start complete");
                let _ = self.events.send(SessionEvent::Start);
                Ok(())
            }
            Err(err) => {
                error!(target: "tether.session", error = %err, "session start failed");
                let _ = self.events.send(SessionEvent::StartError(err.clone()));
                Err(err)
            }
        }
    }

    /// Stops the session in reverse order: close the connection (tolerating
    /// it being closed already), then discard the credential and its
    /// renewal schedule.
    pub async fn stop(&self) -> Result<()> {
        match self.run_stop().await {
            Ok(()) => {
                info!(target: "tether.session", "session stop complete");
                let _ = self.events.send(SessionEvent::Stop);
                Ok(())
            }
            Err(err) => {
                error!(target: "tether.session", error = %err, "session stop failed");
                let _ = self.events.send(SessionEvent::StopError(err.clone()));
                Err(err)
            }
        }
    }

    async fn run_start(&self) -> Result<()> {
        let issued = self.auth.authenticate().await?;
        self.tokens.update_access_credential(issued)?;
        let credential = self
            .tokens
            .current()
            .ok_or_else(|| Error::Config("no access credential installed after login".to_string()))?;
        self.connection.connect(&credential).await?;
        Ok(())
    }

    async fn run_stop(&self) -> Result<()> {
        if self.connection.is_open() {
            let mut events = self.connection.subscribe();
            self.connection.disconnect();
            let disconnected = async {
                loop {
                    match events.recv().await {
                        Ok(ConnectionEvent::Disconnect) => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };
            if tokio::time::timeout(DISCONNECT_TIMEOUT, disconnected)
                .await
                .is_err()
            {
                return Err(Error::DisconnectTimeout {
                    timeout_ms: DISCONNECT_TIMEOUT.as_millis() as u64,
                });
            }
        } else {
            debug!(target: "tether.session", "realtime connection already closed");
        }
        self.tokens.dispose();
        Ok(())
    }
}
