//! Credential types issued and consumed by the auth endpoints.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Login id sent when a master token carries the actual authentication.
/// The server ignores the pair entirely in that case.
pub const PLACEHOLDER_LOGIN_ID: &str = "tether-client";
/// Password counterpart of [`PLACEHOLDER_LOGIN_ID`].
pub const PLACEHOLDER_LOGIN_PASSWORD: &str = "unused";

/// Short-lived signed token authorizing API and transport access.
///
/// Issued by the login and token endpoints; immutable once issued.
/// Renewal replaces the whole value, it never mutates one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCredential {
    /// Opaque signed token text.
    pub text: String,
    /// Server-assigned session identifier.
    pub session_id: String,
    /// Issuance timestamp (wire format: epoch milliseconds).
    #[serde(with = "epoch_millis")]
    pub issued_at: SystemTime,
    /// Expiry timestamp (wire format: epoch milliseconds).
    #[serde(with = "epoch_millis")]
    pub expires_at: SystemTime,
}

impl AccessCredential {
    /// Checks the issuance invariant: expiry must be strictly after issuance.
    pub fn validate(&self) -> Result<(), InvalidCredential> {
        if self.expires_at > self.issued_at {
            Ok(())
        } else {
            Err(InvalidCredential {
                issued_at_ms: epoch_millis::to_millis(self.issued_at),
                expires_at_ms: epoch_millis::to_millis(self.expires_at),
            })
        }
    }

    /// Time left until expiry, measured from `now`. Zero when already expired.
    pub fn remaining_ttl(&self, now: SystemTime) -> Duration {
        self.expires_at.duration_since(now).unwrap_or(Duration::ZERO)
    }
}

/// Credential that violates the expiry-after-issuance invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("credential expiry ({expires_at_ms} ms) is not after issuance ({issued_at_ms} ms)")]
pub struct InvalidCredential {
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
}

/// Long-lived credential that can mint access credentials without
/// interactive login. Provided once at configuration time, never refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterCredential {
    /// Opaque signed token text.
    pub text: String,
    /// Workspace the credential is scoped to.
    pub workspace_id: String,
}

/// Identifiers obtained from a credential source (e.g. a login prompt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredential {
    pub login_id: String,
    pub login_password: String,
}

/// Request body of the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCredential {
    pub login_id: String,
    pub login_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_token: Option<String>,
}

impl LoginCredential {
    /// Assembles a login request carried by a master token. The id/password
    /// pair is filled with placeholder values the server ignores.
    pub fn from_master(master: &MasterCredential) -> Self {
        Self {
            login_id: PLACEHOLDER_LOGIN_ID.to_string(),
            login_password: PLACEHOLDER_LOGIN_PASSWORD.to_string(),
            master_token: Some(master.text.clone()),
        }
    }

    /// Assembles a login request from interactively supplied identifiers.
    pub fn from_user(user: UserCredential) -> Self {
        Self {
            login_id: user.login_id,
            login_password: user.login_password,
            master_token: None,
        }
    }
}

/// Kind of credential a token endpoint is asked to (re)issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Access,
    Master,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "ACCESS"),
            Self::Master => write!(f, "MASTER"),
        }
    }
}

/// Epoch-millisecond (de)serialization for [`SystemTime`] fields.
pub mod epoch_millis {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn to_millis(time: SystemTime) -> u64 {
        time.duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(to_millis(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn credential(issued_ms: u64, expires_ms: u64) -> AccessCredential {
        AccessCredential {
            text: "signed-token".to_string(),
            session_id: "session-1".to_string(),
            issued_at: UNIX_EPOCH + Duration::from_millis(issued_ms),
            expires_at: UNIX_EPOCH + Duration::from_millis(expires_ms),
        }
    }

    #[test]
    fn validate_rejects_expiry_at_or_before_issuance() {
        assert!(credential(1_000, 2_000).validate().is_ok());
        assert!(credential(2_000, 2_000).validate().is_err());
        assert!(credential(2_000, 1_000).validate().is_err());
    }

    #[test]
    fn remaining_ttl_is_zero_after_expiry() {
        let cred = credential(0, 60_000);
        let before = UNIX_EPOCH + Duration::from_millis(20_000);
        let after = UNIX_EPOCH + Duration::from_millis(90_000);
        assert_eq!(cred.remaining_ttl(before), Duration::from_millis(40_000));
        assert_eq!(cred.remaining_ttl(after), Duration::ZERO);
    }

    #[test]
    fn wire_format_uses_camel_case_and_epoch_millis() {
        let json = r#"{
            "text": "tok",
            "sessionId": "s-9",
            "issuedAt": 1000,
            "expiresAt": 601000
        }"#;
        let cred: AccessCredential = serde_json::from_str(json).unwrap();
        assert_eq!(cred.session_id, "s-9");
        assert_eq!(cred.remaining_ttl(cred.issued_at), Duration::from_secs(600));

        let value = serde_json::to_value(&cred).unwrap();
        assert_eq!(value["issuedAt"], 1000);
        assert_eq!(value["expiresAt"], 601_000);
    }

    #[test]
    fn master_login_carries_placeholder_identity() {
        let master = MasterCredential {
            text: "master-token".to_string(),
            workspace_id: "ws-1".to_string(),
        };
        let login = LoginCredential::from_master(&master);
        assert_eq!(login.login_id, PLACEHOLDER_LOGIN_ID);
        assert_eq!(login.master_token.as_deref(), Some("master-token"));

        let value = serde_json::to_value(&login).unwrap();
        assert_eq!(value["masterToken"], "master-token");
    }

    #[test]
    fn user_login_omits_master_token_field() {
        let login = LoginCredential::from_user(UserCredential {
            login_id: "alice".to_string(),
            login_password: "secret".to_string(),
        });
        let value = serde_json::to_value(&login).unwrap();
        assert!(value.get("masterToken").is_none());
    }

    #[test]
    fn token_kind_serializes_screaming() {
        assert_eq!(serde_json::to_value(TokenKind::Access).unwrap(), "ACCESS");
        assert_eq!(TokenKind::Master.to_string(), "MASTER");
    }
}
