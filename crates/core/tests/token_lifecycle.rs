//! Credential renewal scheduling and failure classification.
//!
//! All suites run on a paused clock; `advance` moves the timer wheel and
//! `settle` lets the renewal task run to completion.

mod common;

use std::time::Duration;

use tokio::time::advance;

use common::{credential_with_ttl, drain, settle, Issue, ScriptedApi};
use tether::protocol::ApiError;
use tether::{Error, TokenEvent, TokenManager};

const MARGIN: Duration = Duration::from_secs(60);

fn manager(api: &std::sync::Arc<ScriptedApi>) -> TokenManager {
    common::init_tracing();
    TokenManager::new(api.clone(), MARGIN)
}

fn updated_count(events: &[TokenEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, TokenEvent::Updated(_)))
        .count()
}

#[tokio::test(start_paused = true)]
async fn renewal_fires_at_ttl_minus_margin() {
    let api = ScriptedApi::new();
    api.script_issue(Issue::Token(Duration::from_secs(600)));
    let tokens = manager(&api);

    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(600)))
        .unwrap();

    // due at 540s; two seconds early nothing must have fired
    advance(Duration::from_secs(538)).await;
    settle().await;
    assert_eq!(api.issue_count(), 0);

    advance(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(api.issue_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn successful_renewal_reinstalls_and_reschedules() {
    let api = ScriptedApi::new();
    api.script_issue(Issue::Token(Duration::from_secs(600)));
    let tokens = manager(&api);
    let mut events = tokens.subscribe();

    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(600)))
        .unwrap();

    advance(Duration::from_secs(545)).await;
    settle().await;

    let seen = drain(&mut events);
    assert_eq!(updated_count(&seen), 2);
    assert_eq!(tokens.current().unwrap().text, "token-1");
}

#[tokio::test(start_paused = true)]
async fn repeated_updates_leave_a_single_pending_timer() {
    let api = ScriptedApi::new();
    api.script_issue(Issue::Token(Duration::from_secs(600)));
    let tokens = manager(&api);

    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(600)))
        .unwrap();
    // supersedes the first schedule entirely
    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(1200)))
        .unwrap();

    // past the first credential's due time: its timer must be gone
    advance(Duration::from_secs(600)).await;
    settle().await;
    assert_eq!(api.issue_count(), 0);

    // up to the second credential's due time (1140s)
    advance(Duration::from_secs(545)).await;
    settle().await;
    assert_eq!(api.issue_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn short_ttl_is_a_synchronous_configuration_error() {
    let api = ScriptedApi::new();
    let tokens = manager(&api);
    let mut events = tokens.subscribe();

    let err = tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(30)))
        .unwrap_err();
    assert!(matches!(err, Error::TokenTooShortLived { .. }));
    assert!(tokens.current().is_none());

    advance(Duration::from_secs(3600)).await;
    settle().await;
    assert_eq!(api.issue_count(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_renewal_failure_retries_after_fixed_delay() {
    let api = ScriptedApi::new();
    api.script_issue(Issue::Fail(ApiError::Timeout("renewal timed out".into())));
    api.script_issue(Issue::Token(Duration::from_secs(600)));
    let tokens = manager(&api);
    let mut events = tokens.subscribe();

    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(600)))
        .unwrap();

    advance(Duration::from_secs(545)).await;
    settle().await;
    assert_eq!(api.issue_count(), 1);
    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(e, TokenEvent::Retry(_))));
    assert!(!seen.iter().any(|e| matches!(e, TokenEvent::Lost(_))));

    // fixed 5s retry delay
    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(api.issue_count(), 2);
    let seen = drain(&mut events);
    assert_eq!(updated_count(&seen), 1);
}

#[tokio::test(start_paused = true)]
async fn refused_renewal_is_lost_without_further_attempts() {
    let api = ScriptedApi::new();
    api.script_issue(Issue::Fail(ApiError::Server {
        status: 403,
        message: "refused".into(),
    }));
    let tokens = manager(&api);
    let mut events = tokens.subscribe();

    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(600)))
        .unwrap();

    advance(Duration::from_secs(545)).await;
    settle().await;
    assert_eq!(api.issue_count(), 1);
    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(e, TokenEvent::Lost(_))));

    advance(Duration::from_secs(3600)).await;
    settle().await;
    assert_eq!(api.issue_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn renewed_credential_with_short_ttl_is_lost_not_retried() {
    let api = ScriptedApi::new();
    api.script_issue(Issue::Token(Duration::from_secs(30)));
    let tokens = manager(&api);
    let mut events = tokens.subscribe();

    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(600)))
        .unwrap();

    advance(Duration::from_secs(545)).await;
    settle().await;

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(
        e,
        TokenEvent::Lost(Error::TokenTooShortLived { .. })
    )));

    advance(Duration::from_secs(3600)).await;
    settle().await;
    assert_eq!(api.issue_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn overdue_rearm_is_lost_instead_of_firing_after_expiry() {
    let api = ScriptedApi::new();
    api.script_issue(Issue::Fail(ApiError::Timeout("renewal timed out".into())));
    // retry delay far beyond the credential's remaining lifetime
    let tokens = TokenManager::new(api.clone(), Duration::from_secs(5))
        .with_retry_delay(Duration::from_secs(600));
    let mut events = tokens.subscribe();

    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(8)))
        .unwrap();

    advance(Duration::from_secs(4)).await;
    settle().await;

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(e, TokenEvent::Retry(_))));
    assert!(seen
        .iter()
        .any(|e| matches!(e, TokenEvent::Lost(Error::RenewalOverdue { .. }))));

    advance(Duration::from_secs(3600)).await;
    settle().await;
    assert_eq!(api.issue_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_the_pending_renewal() {
    let api = ScriptedApi::new();
    let tokens = manager(&api);

    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(600)))
        .unwrap();
    tokens.dispose();

    advance(Duration::from_secs(3600)).await;
    settle().await;
    assert_eq!(api.issue_count(), 0);
    assert!(tokens.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn dispose_twice_behaves_like_once() {
    let api = ScriptedApi::new();
    let tokens = manager(&api);
    tokens
        .update_access_credential(credential_with_ttl(Duration::from_secs(600)))
        .unwrap();

    let mut events = tokens.subscribe();
    tokens.dispose();
    tokens.dispose();

    advance(Duration::from_secs(3600)).await;
    settle().await;
    assert!(tokens.current().is_none());
    assert!(drain(&mut events).is_empty());
}
