//! Scripted fakes shared by the integration suites.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use tether::api::AuthApi;
use tether::auth::CredentialSource;
use tether::error::{Error, Result};
use tether::protocol::{
    AccessCredential, ApiError, LoginCredential, MasterCredential, TokenKind, UserCredential,
};

/// Builds a credential expiring `ttl` from now.
pub fn credential_with_ttl(ttl: Duration) -> AccessCredential {
    let now = SystemTime::now();
    AccessCredential {
        text: "token-0".to_string(),
        session_id: "session-1".to_string(),
        issued_at: now,
        expires_at: now + ttl,
    }
}

/// One scripted endpoint outcome.
#[derive(Debug, Clone)]
pub enum Issue {
    /// A fresh credential expiring `ttl` from the moment it is produced.
    Token(Duration),
    /// A credential violating the expiry-after-issuance invariant.
    Invalid,
    /// The endpoint fails.
    Fail(ApiError),
}

/// Auth endpoints with scripted responses and call recording.
pub struct ScriptedApi {
    login_script: Mutex<VecDeque<Issue>>,
    issue_script: Mutex<VecDeque<Issue>>,
    login_calls: Mutex<Vec<LoginCredential>>,
    issue_calls: Mutex<Vec<TokenKind>>,
    counter: Mutex<u32>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            login_script: Mutex::new(VecDeque::new()),
            issue_script: Mutex::new(VecDeque::new()),
            login_calls: Mutex::new(Vec::new()),
            issue_calls: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
        })
    }

    pub fn script_login(&self, issue: Issue) {
        self.login_script.lock().push_back(issue);
    }

    pub fn script_issue(&self, issue: Issue) {
        self.issue_script.lock().push_back(issue);
    }

    pub fn login_count(&self) -> usize {
        self.login_calls.lock().len()
    }

    pub fn login_calls(&self) -> Vec<LoginCredential> {
        self.login_calls.lock().clone()
    }

    pub fn issue_count(&self) -> usize {
        self.issue_calls.lock().len()
    }

    fn produce(&self, issue: Issue) -> std::result::Result<AccessCredential, ApiError> {
        match issue {
            Issue::Token(ttl) => {
                let mut counter = self.counter.lock();
                *counter += 1;
                let now = SystemTime::now();
                Ok(AccessCredential {
                    text: format!("token-{}", *counter),
                    session_id: "session-1".to_string(),
                    issued_at: now,
                    expires_at: now + ttl,
                })
            }
            Issue::Invalid => {
                let now = SystemTime::now();
                Ok(AccessCredential {
                    text: "broken".to_string(),
                    session_id: "session-1".to_string(),
                    issued_at: now,
                    expires_at: now,
                })
            }
            Issue::Fail(err) => Err(err),
        }
    }
}

#[async_trait]
impl AuthApi for ScriptedApi {
    async fn login(
        &self,
        credential: &LoginCredential,
    ) -> std::result::Result<AccessCredential, ApiError> {
        self.login_calls.lock().push(credential.clone());
        let next = self.login_script.lock().pop_front();
        match next {
            Some(issue) => self.produce(issue),
            None => Err(ApiError::Protocol("unscripted login call".to_string())),
        }
    }

    async fn issue_token(
        &self,
        kind: TokenKind,
    ) -> std::result::Result<AccessCredential, ApiError> {
        self.issue_calls.lock().push(kind);
        let next = self.issue_script.lock().pop_front();
        match next {
            Some(issue) => self.produce(issue),
            None => Err(ApiError::Protocol("unscripted issue call".to_string())),
        }
    }

    async fn issue_master_token(
        &self,
        workspace_id: &str,
    ) -> std::result::Result<MasterCredential, ApiError> {
        Ok(MasterCredential {
            text: "minted-master".to_string(),
            workspace_id: workspace_id.to_string(),
        })
    }
}

/// Credential source handing out numbered identifiers and recording the
/// previous-failure hints it was shown.
pub struct ScriptedSource {
    previous: Mutex<Vec<Option<String>>>,
    counter: Mutex<u32>,
    fail_with: Mutex<Option<String>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            previous: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
            fail_with: Mutex::new(None),
        })
    }

    /// Makes every following query fail.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock() = Some(message.into());
    }

    pub fn query_count(&self) -> usize {
        self.previous.lock().len()
    }

    /// Previous-failure hints, in query order.
    pub fn shown_failures(&self) -> Vec<Option<String>> {
        self.previous.lock().clone()
    }
}

#[async_trait]
impl CredentialSource for ScriptedSource {
    async fn user_credential(&self, previous: Option<&Error>) -> Result<UserCredential> {
        self.previous.lock().push(previous.map(|e| e.to_string()));
        if let Some(message) = &*self.fail_with.lock() {
            return Err(Error::CredentialSource(message.clone()));
        }
        let mut counter = self.counter.lock();
        *counter += 1;
        Ok(UserCredential {
            login_id: format!("user-{}", *counter),
            login_password: format!("pw-{}", *counter),
        })
    }
}

/// Enables log capture for failing runs (`RUST_LOG=tether=debug`).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Lets spawned tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Drains everything currently buffered in a broadcast receiver.
pub fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}
