use thiserror::Error;

/// Error taxonomy for the authentication flow.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Forged, replayed or expired CSRF state nonce.
    #[error("invalid OIDC state parameter")]
    InvalidState,

    /// Token endpoint failure. Transient failures (timeout, 5xx) are
    /// retried a bounded number of times before surfacing.
    #[error("token exchange failed: {message}")]
    TokenExchange { message: String, transient: bool },

    /// Issuer, audience or expiry mismatch on the ID token.
    #[error("invalid ID token: {0}")]
    InvalidToken(String),

    #[error("missing required claim: {0}")]
    MissingClaim(String),

    /// Session or flow store unreachable. Never treated as "no session".
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Userinfo fetch failed; login degrades to ID-token claims.
    #[error("userinfo request failed: {0}")]
    UserInfoUnavailable(String),

    /// Session absent, expired, or invalidated by a failed refresh.
    #[error("session expired")]
    SessionExpired,

    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Whether the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::TokenExchange {
                transient: true,
                ..
            } | AuthError::StoreUnavailable(_)
        )
    }
}
