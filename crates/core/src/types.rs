use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cryptographically random session identifier, opaque to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated user session.
///
/// Created on a successful callback, mutated on token refresh, deleted on
/// logout or expiry. Only the id ever leaves the server (in the cookie).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Stable user identifier from the IdP (`sub`).
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Raw claim set from the ID token, possibly enriched by userinfo.
    pub claims: Value,
    pub issued_at: DateTime<Utc>,
    pub absolute_expires_at: DateTime<Utc>,
    /// Slides forward on activity, capped by `absolute_expires_at`.
    pub idle_expires_at: DateTime<Utc>,
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
}

impl Session {
    /// The identity attached to allowed requests.
    pub fn identity(&self) -> Identity {
        Identity {
            subject: self.subject.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            claims: self.claims.clone(),
        }
    }
}

/// User identity exposed to the wrapped application; never contains
/// token material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub claims: Value,
}

/// PKCE and return-path data stored for one in-flight login attempt.
///
/// Keyed by the single-use state nonce; consumed atomically on callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowState {
    pub pkce_verifier: String,
    pub created_at: DateTime<Utc>,
    /// Path to redirect to after successful authentication.
    pub return_to: Option<String>,
}
