//! Login orchestration.
//!
//! [`Authenticator`] turns identifiers into an issued access credential.
//! Credentials that the server rejects are re-requested from the
//! [`CredentialSource`] (so a prompt can show "previous attempt failed")
//! and the login is retried, bounded by an explicit counter. Network and
//! server failures are surfaced immediately; retrying those here would
//! duplicate the connection layer's own retry semantics.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::api::AuthApi;
use crate::error::{Error, Result};
use tether_protocol::{AccessCredential, LoginCredential, MasterCredential, UserCredential};

/// Supplies login identifiers on demand, e.g. from a credential prompt.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Asks for fresh identifiers. `previous` carries the failure of the
    /// preceding attempt, if any, so the source can surface it.
    async fn user_credential(&self, previous: Option<&Error>) -> Result<UserCredential>;
}

/// Bounded per-login-sequence rejection counter. Not persisted; a new
/// login sequence starts from zero.
#[derive(Debug)]
struct RetryState {
    attempts: u32,
    limit: u32,
}

impl RetryState {
    fn new(limit: u32) -> Self {
        Self { attempts: 0, limit }
    }

    /// Records a rejection. True while another attempt may be made.
    fn register_rejection(&mut self) -> bool {
        self.attempts += 1;
        self.attempts < self.limit
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Obtains a valid access credential despite bounded credential mistakes.
pub struct Authenticator {
    api: Arc<dyn AuthApi>,
    source: Arc<dyn CredentialSource>,
    master: Option<MasterCredential>,
    max_retries: u32,
}

impl Authenticator {
    pub fn new(
        api: Arc<dyn AuthApi>,
        source: Arc<dyn CredentialSource>,
        master: Option<MasterCredential>,
        max_retries: u32,
    ) -> Self {
        Self {
            api,
            source,
            master,
            max_retries,
        }
    }

    /// Assembles login identifiers.
    ///
    /// With a master credential configured the credential source is
    /// bypassed entirely; master login either succeeds or fails fatally
    /// and never needs an interactive retry. Otherwise the source is
    /// queried, with the previous failure passed along for display.
    pub async fn credential(&self, previous: Option<&Error>) -> Result<LoginCredential> {
        if let Some(master) = &self.master {
            debug!(target: "tether.auth", workspace_id = %master.workspace_id, "using master credential");
            return Ok(LoginCredential::from_master(master));
        }
        let user = self.source.user_credential(previous).await?;
        Ok(LoginCredential::from_user(user))
    }

    /// Performs the login handshake starting from `credential`, retrying
    /// rejected credentials with fresh ones from the source, up to the
    /// configured bound.
    pub async fn login(&self, credential: LoginCredential) -> Result<AccessCredential> {
        let mut retry = RetryState::new(self.max_retries);
        let mut credential = credential;
        loop {
            match self.api.login(&credential).await {
                Ok(issued) => {
                    issued.validate()?;
                    debug!(
                        target: "tether.auth",
                        session_id = %issued.session_id,
                        "login complete"
                    );
                    return Ok(issued);
                }
                Err(api_err) if api_err.is_auth_rejected() => {
                    let err = Error::from(api_err);
                    if self.master.is_some() {
                        // a rejected master token cannot be fixed by
                        // prompting the user
                        error!(target: "tether.auth", error = %err, "master credential rejected");
                        return Err(err);
                    }
                    if !retry.register_rejection() {
                        warn!(
                            target: "tether.auth",
                            attempts = retry.attempts(),
                            "login retry limit reached"
                        );
                        return Err(Error::TooManyLoginFailures {
                            attempts: retry.attempts(),
                        });
                    }
                    warn!(
                        target: "tether.auth",
                        attempt = retry.attempts(),
                        error = %err,
                        "login rejected, asking for fresh credentials"
                    );
                    credential = self.credential(Some(&err)).await?;
                }
                Err(api_err) => {
                    // network conditions are the connection layer's
                    // retry domain, not this one's
                    return Err(api_err.into());
                }
            }
        }
    }

    /// The start-path composition: assemble identifiers, then log in.
    pub async fn authenticate(&self) -> Result<AccessCredential> {
        let credential = self.credential(None).await?;
        self.login(credential).await
    }

    /// Mints a long-lived credential scoped to `workspace_id`.
    pub async fn issue_master_token(&self, workspace_id: &str) -> Result<MasterCredential> {
        let master = self.api.issue_master_token(workspace_id).await?;
        debug!(target: "tether.auth", %workspace_id, "master token issued");
        Ok(master)
    }
}
