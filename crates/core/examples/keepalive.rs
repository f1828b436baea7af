// Session keepalive example - wiring the session layer end to end.
//
// This example demonstrates:
// - Configuring and starting a session (login -> credential -> connection)
// - Observing lifecycle notifications from each component
// - Recovery-time bounds for the configured reconnection options
// - Stopping the session in reverse order
//
// Note: the realtime transport here is the in-memory fake, driven by
// hand. A real embedding supplies its transport library behind the
// `Transport` trait and never touches the controller.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use tether::protocol::{
    AccessCredential, ApiError, LoginCredential, MasterCredential, TokenKind, UserCredential,
};
use tether::{
    AuthApi, CredentialSource, FakeTransport, SessionConfig, SessionManager, TransportEvent,
};

struct DemoApi;

#[async_trait]
impl AuthApi for DemoApi {
    async fn login(&self, credential: &LoginCredential) -> Result<AccessCredential, ApiError> {
        println!("   service: login as {}", credential.login_id);
        Ok(fresh_credential())
    }

    async fn issue_token(&self, kind: TokenKind) -> Result<AccessCredential, ApiError> {
        println!("   service: reissuing {kind} credential");
        Ok(fresh_credential())
    }

    async fn issue_master_token(&self, workspace_id: &str) -> Result<MasterCredential, ApiError> {
        Ok(MasterCredential {
            text: "demo-master".to_string(),
            workspace_id: workspace_id.to_string(),
        })
    }
}

fn fresh_credential() -> AccessCredential {
    let now = SystemTime::now();
    AccessCredential {
        text: "demo-token".to_string(),
        session_id: "demo-session".to_string(),
        issued_at: now,
        expires_at: now + Duration::from_secs(600),
    }
}

struct DemoPrompt;

#[async_trait]
impl CredentialSource for DemoPrompt {
    async fn user_credential(
        &self,
        previous: Option<&tether::Error>,
    ) -> tether::Result<UserCredential> {
        if let Some(err) = previous {
            println!("   prompt: previous attempt failed: {err}");
        }
        Ok(UserCredential {
            login_id: "demo-user".to_string(),
            login_password: "demo-password".to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SessionConfig::new("https://workspace.example.com", "ws-demo")?;
    let (transport, controller) = FakeTransport::new();
    let manager = Arc::new(SessionManager::new(
        config,
        Arc::new(DemoApi),
        Arc::new(DemoPrompt),
        Arc::new(transport),
    ));

    let mut session_events = manager.subscribe();
    let mut connection_events = manager.connection().subscribe();

    println!("starting session...");
    let start = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.start().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.emit(TransportEvent::Connect);
    start.await??;

    while let Ok(event) = session_events.try_recv() {
        println!("session event: {event:?}");
    }

    let recovery = manager.connection().recovery_time();
    println!(
        "recovery bounds: best {:?}, worst {:?}",
        recovery.best, recovery.worst
    );

    // a network blip the transport recovers from on its own
    println!("simulating a dropped connection...");
    controller.emit(TransportEvent::Disconnect("network blip".to_string()));
    controller.emit(TransportEvent::ReconnectAttempt(1));
    controller.emit(TransportEvent::Reconnect);
    tokio::time::sleep(Duration::from_millis(50)).await;

    while let Ok(event) = connection_events.try_recv() {
        println!("connection event: {event:?}");
    }

    println!("stopping session...");
    manager.stop().await?;
    while let Ok(event) = session_events.try_recv() {
        println!("session event: {event:?}");
    }

    Ok(())
}
