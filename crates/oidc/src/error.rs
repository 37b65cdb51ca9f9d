//! HTTP mapping for flow errors.
//!
//! Flow errors never leak provider internals to the end user: bodies are
//! generic, details go to the log.

use authgate_core::AuthError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Status code for an auth error, shared by the middleware decisions and
/// handler responses.
pub fn status_for(err: &AuthError) -> u16 {
    match err {
        AuthError::InvalidState => 400,
        AuthError::InvalidToken(_) | AuthError::MissingClaim(_) | AuthError::SessionExpired => 401,
        AuthError::TokenExchange { .. } | AuthError::UserInfoUnavailable(_) => 502,
        AuthError::StoreUnavailable(_) => 503,
        AuthError::Config(_) => 500,
    }
}

/// Wrapper so application handlers that call into the controller can
/// return auth errors directly.
#[derive(Debug)]
pub struct HttpAuthError(pub AuthError);

impl From<AuthError> for HttpAuthError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpAuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(status_for(&self.0)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self.0 {
            AuthError::InvalidState => "Invalid authentication state",
            AuthError::InvalidToken(_) | AuthError::MissingClaim(_) => "Authentication failed",
            AuthError::SessionExpired => "Session expired",
            AuthError::TokenExchange { .. } | AuthError::UserInfoUnavailable(_) => {
                tracing::error!(error = %self.0, "identity provider error");
                "Authentication provider error"
            }
            AuthError::StoreUnavailable(_) => {
                tracing::error!(error = %self.0, "session store unavailable");
                "Service temporarily unavailable"
            }
            AuthError::Config(_) => {
                tracing::error!(error = %self.0, "configuration error");
                "Server configuration error"
            }
        };

        (status, message).into_response()
    }
}
