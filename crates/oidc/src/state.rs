//! Shared state for the axum integration.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::AuthConfig;
use crate::controller::OidcController;
use crate::middleware::AuthMiddleware;

/// Shared state handed to the interception layer and extractors.
#[derive(Clone)]
pub struct AuthState {
    middleware: Arc<AuthMiddleware>,
}

impl AuthState {
    pub fn new(controller: OidcController) -> Self {
        Self {
            middleware: Arc::new(AuthMiddleware::new(Arc::new(controller))),
        }
    }

    pub fn middleware(&self) -> &AuthMiddleware {
        &self.middleware
    }

    pub fn controller(&self) -> &Arc<OidcController> {
        self.middleware.controller()
    }

    pub fn config(&self) -> &AuthConfig {
        self.middleware.controller().config()
    }
}

/// Allows AuthState to be extracted from a parent state.
impl<S> FromRef<S> for AuthState
where
    S: AsRef<AuthState>,
{
    fn from_ref(state: &S) -> Self {
        state.as_ref().clone()
    }
}
