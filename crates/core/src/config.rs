//! Session and connection configuration.

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use tether_protocol::MasterCredential;

/// Transport implementation the realtime connection is opened over.
///
/// Only websocket is supported; long-polling fallbacks defeat the
/// reconnection bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    WebSocket,
}

/// Options handed to the transport when opening the realtime connection.
///
/// Immutable after first use: the snapshot given to a transport handle is
/// frozen for that handle's lifetime. The credential-derived query string
/// is rebuilt on every `connect()` call, so credential changes never apply
/// retroactively to an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Share one underlying socket between logical channels.
    pub multiplex: bool,
    /// Bound on a single connect attempt before it reports an error.
    pub connect_timeout: Duration,
    /// Transport selection.
    pub transport: TransportKind,
    /// Whether the transport reconnects automatically on loss.
    pub reconnection: bool,
    /// First reconnection delay; grows linearly from here.
    pub reconnection_delay: Duration,
    /// Ceiling the reconnection delay saturates at.
    pub reconnection_delay_max: Duration,
    /// Reconnection attempts before the connection is declared lost.
    pub reconnection_attempts: u32,
}

impl Default for ConnectOptions {
    // delay grows 0.5, 1.0, 1.5, .. to 3.0 seconds
    fn default() -> Self {
        Self {
            multiplex: true,
            connect_timeout: Duration::from_secs(5),
            transport: TransportKind::WebSocket,
            reconnection: true,
            reconnection_delay: Duration::from_millis(500),
            reconnection_delay_max: Duration::from_secs(3),
            reconnection_attempts: 20,
        }
    }
}

/// Buffer added on top of the renewal request timeout when computing the
/// safety margin subtracted from a credential's TTL.
pub const RENEWAL_MARGIN_BUFFER: Duration = Duration::from_secs(30);

/// Immutable session configuration, supplied once at boot.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    server_url: Url,
    workspace_id: String,
    master_credential: Option<MasterCredential>,
    api_timeout: Duration,
    login_max_retries: u32,
    connect: ConnectOptions,
}

impl SessionConfig {
    /// Creates a configuration for the given service URL and workspace.
    ///
    /// Only http(s) URLs are accepted; file-like and other exotic schemes
    /// cannot host the service.
    pub fn new(server_url: &str, workspace_id: impl Into<String>) -> Result<Self> {
        let url = Url::parse(server_url)
            .map_err(|e| Error::Config(format!("cannot parse server url {server_url}: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Config(format!(
                    "cannot use server url {server_url}: unsupported scheme {other}"
                )));
            }
        }
        Ok(Self {
            server_url: url,
            workspace_id: workspace_id.into(),
            master_credential: None,
            api_timeout: Duration::from_secs(60),
            login_max_retries: 5,
            connect: ConnectOptions::default(),
        })
    }

    /// Installs a master credential, bypassing interactive login.
    pub fn with_master_credential(mut self, master: MasterCredential) -> Self {
        self.master_credential = Some(master);
        self
    }

    /// Overrides the REST request timeout used in the renewal margin.
    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    /// Overrides the login retry bound.
    pub fn with_login_max_retries(mut self, max: u32) -> Self {
        self.login_max_retries = max;
        self
    }

    /// Overrides the realtime connection options.
    pub fn with_connect_options(mut self, connect: ConnectOptions) -> Self {
        self.connect = connect;
        self
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn master_credential(&self) -> Option<&MasterCredential> {
        self.master_credential.as_ref()
    }

    pub fn api_timeout(&self) -> Duration {
        self.api_timeout
    }

    pub fn login_max_retries(&self) -> u32 {
        self.login_max_retries
    }

    pub fn connect_options(&self) -> &ConnectOptions {
        &self.connect
    }

    /// Safety margin subtracted from a credential's TTL when scheduling
    /// renewal: one renewal round trip plus a fixed buffer.
    pub fn renewal_margin(&self) -> Duration {
        self.api_timeout + RENEWAL_MARGIN_BUFFER
    }
}
