//! Seam to the generated REST call wrappers.
//!
//! The session layer treats the REST surface as an opaque request/response
//! API; embedders hand in whatever client the service ships. Failures are
//! reported as [`ApiError`] so the session layer can classify them.

use async_trait::async_trait;

use tether_protocol::{AccessCredential, ApiError, LoginCredential, MasterCredential, TokenKind};

/// Auth endpoints the session layer consumes.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Performs the login handshake, returning the issued credential.
    async fn login(&self, credential: &LoginCredential) -> Result<AccessCredential, ApiError>;

    /// Reissues a credential of the given kind for the current session.
    async fn issue_token(&self, kind: TokenKind) -> Result<AccessCredential, ApiError>;

    /// Mints a long-lived credential scoped to a workspace.
    async fn issue_master_token(&self, workspace_id: &str) -> Result<MasterCredential, ApiError>;
}
