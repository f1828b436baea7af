//! Access credential lifecycle.
//!
//! [`TokenManager`] owns the current access credential and keeps it fresh:
//! every installed credential arms a renewal timer that fires one safety
//! margin before expiry, and renewal outcomes are classified into
//! "retry shortly" and "credential lost". Observers follow the lifecycle
//! through [`TokenEvent`]s:
//!
//! * `Updated` - a credential was installed, renewal is scheduled
//! * `Retry` - a renewal attempt failed transiently and will be retried
//! * `Lost` - renewal failed for good; the application must log in again

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::api::AuthApi;
use crate::error::{Error, Result};
use tether_protocol::{AccessCredential, TokenKind};

/// Delay before retrying a renewal that failed transiently.
pub const RENEWAL_RETRY_DELAY: Duration = Duration::from_secs(5);

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Access credential lifecycle notifications.
#[derive(Debug, Clone)]
pub enum TokenEvent {
    /// A credential was installed and its renewal scheduled.
    Updated(AccessCredential),
    /// Renewal failed transiently; another attempt is scheduled.
    Retry(Error),
    /// Renewal failed for good. No further automatic attempts are made;
    /// the application should start a fresh login.
    Lost(Error),
}

struct Inner {
    credential: Option<AccessCredential>,
    /// Bumped by every install and by `dispose()`; renewal callbacks
    /// carrying a stale generation are ignored.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Owns the access credential and schedules its proactive renewal.
///
/// Cheap to clone; clones share the same credential and timer state.
#[derive(Clone)]
pub struct TokenManager {
    api: Arc<dyn AuthApi>,
    margin: Duration,
    retry_delay: Duration,
    events: broadcast::Sender<TokenEvent>,
    inner: Arc<Mutex<Inner>>,
}

impl TokenManager {
    /// Creates a manager renewing through `api`, scheduling each renewal
    /// `margin` before the credential expires.
    pub fn new(api: Arc<dyn AuthApi>, margin: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            margin,
            retry_delay: RENEWAL_RETRY_DELAY,
            events,
            inner: Arc::new(Mutex::new(Inner {
                credential: None,
                generation: 0,
                timer: None,
            })),
        }
    }

    /// Overrides the delay before a transiently-failed renewal is retried.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Subscribes to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the currently held credential.
    pub fn current(&self) -> Option<AccessCredential> {
        self.inner.lock().credential.clone()
    }

    /// Safety margin subtracted from the TTL when scheduling renewal.
    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Installs a new credential, superseding the previous one and its
    /// pending renewal timer.
    ///
    /// Fails without installing anything when the credential's remaining
    /// TTL is below the safety margin: a renewal could not complete before
    /// expiry, which means the issuing server's token lifetime is
    /// misconfigured (at least 2 minutes, usually 10, is expected).
    pub fn update_access_credential(&self, credential: AccessCredential) -> Result<()> {
        credential.validate()?;
        let ttl = credential.remaining_ttl(SystemTime::now());
        if ttl < self.margin {
            return Err(Error::TokenTooShortLived {
                ttl_ms: ttl.as_millis() as u64,
                margin_ms: self.margin.as_millis() as u64,
            });
        }

        {
            let mut inner = self.inner.lock();
            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            inner.generation += 1;
            inner.credential = Some(credential.clone());
        }

        debug!(
            target: "tether.token",
            session_id = %credential.session_id,
            ttl_ms = ttl.as_millis() as u64,
            "access credential updated"
        );
        let _ = self.events.send(TokenEvent::Updated(credential));

        // ttl == expiry - now, so the timer fires margin before expiry
        self.arm(ttl - self.margin);
        Ok(())
    }

    /// Cancels any pending renewal and clears the held credential.
    /// Idempotent; emits nothing.
    pub fn dispose(&self) {
        let timer = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.credential = None;
            inner.timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
        }
    }

    /// Arms the renewal timer to fire after `delay`, replacing any pending
    /// timer. Emits `Lost` instead when the credential would expire before
    /// the timer fires.
    fn arm(&self, delay: Duration) {
        let mut inner = self.inner.lock();
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        let Some(credential) = inner.credential.clone() else {
            return;
        };

        let ttl = credential.remaining_ttl(SystemTime::now());
        if ttl < delay {
            let err = Error::RenewalOverdue {
                ttl_ms: ttl.as_millis() as u64,
                delay_ms: delay.as_millis() as u64,
            };
            drop(inner);
            debug!(target: "tether.token", error = %err, "cannot schedule renewal");
            let _ = self.events.send(TokenEvent::Lost(err));
            return;
        }

        debug!(
            target: "tether.token",
            delay_ms = delay.as_millis() as u64,
            ttl_ms = ttl.as_millis() as u64,
            "next renewal scheduled"
        );
        let generation = inner.generation;
        let manager = self.clone();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.renew(generation).await;
        }));
    }

    async fn renew(&self, generation: u64) {
        if self.inner.lock().generation != generation {
            return;
        }
        debug!(target: "tether.token", "start renewing access credential");
        let result = self.api.issue_token(TokenKind::Access).await;
        if self.inner.lock().generation != generation {
            // disposed or superseded while the request was in flight
            return;
        }
        match result {
            Ok(credential) => {
                debug!(
                    target: "tether.token",
                    session_id = %credential.session_id,
                    "new access credential arrived"
                );
                if let Err(err) = self.update_access_credential(credential) {
                    // a too-short lifetime is a server configuration
                    // problem, not a retryable condition
                    error!(target: "tether.token", error = %err, "renewed credential is unusable");
                    let _ = self.events.send(TokenEvent::Lost(err));
                }
            }
            Err(api_err) if api_err.is_transient() => {
                let err = Error::from(api_err);
                warn!(target: "tether.token", error = %err, "could not renew access credential, will retry");
                let _ = self.events.send(TokenEvent::Retry(err));
                self.arm(self.retry_delay);
            }
            Err(api_err) => {
                let err = Error::from(api_err);
                error!(target: "tether.token", error = %err, "server refused to renew access credential");
                let _ = self.events.send(TokenEvent::Lost(err));
            }
        }
    }
}
