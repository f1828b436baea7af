//! Client-side session layer for a remote workspace service.
//!
//! Keeps a service session alive across three independently-failing
//! timing domains:
//!
//! * [`TokenManager`] renews the short-lived access credential one safety
//!   margin before it expires, and declares it lost when renewal cannot
//!   complete in time.
//! * [`Connection`] maintains the realtime connection, letting the
//!   transport reconnect on its own and collapsing its granular
//!   notifications into a small public event surface.
//! * [`Authenticator`] performs the initial login handshake, retrying
//!   rejected credentials with fresh ones up to a bound.
//!
//! [`SessionManager`] sequences the three at startup and in reverse at
//! shutdown. The REST API, the realtime transport, and the credential
//! prompt are external collaborators, consumed through the [`AuthApi`],
//! [`Transport`], and [`CredentialSource`] traits.

pub mod api;
pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod fake_transport;
pub mod session;
pub mod token;
pub mod transport;

pub use api::AuthApi;
pub use auth::{Authenticator, CredentialSource};
pub use config::{ConnectOptions, RENEWAL_MARGIN_BUFFER, SessionConfig, TransportKind};
pub use connection::{Connection, ConnectionEvent, ConnectionState, RecoveryTime};
pub use error::{Error, Result};
pub use fake_transport::{FakeTransport, FakeTransportController};
pub use session::{SessionEvent, SessionManager};
pub use token::{RENEWAL_RETRY_DELAY, TokenEvent, TokenManager};
pub use transport::{Transport, TransportEvent, TransportHandle};

pub use tether_protocol as protocol;
