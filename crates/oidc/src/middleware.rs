//! Per-request interception state machine.
//!
//! Transport-free: the host framework hands in [`RequestFacts`] and
//! materializes the returned [`Decision`]. The axum adapter in
//! [`crate::intercept`] is one such materialization.

use std::sync::Arc;
use std::time::Duration;

use authgate_core::{matches_excluded_path, AuthError, Identity, SessionId};

use crate::controller::{CallbackParams, OidcController};
use crate::error::status_for;

/// The facts about an inbound request the middleware needs to decide.
#[derive(Debug, Clone)]
pub struct RequestFacts {
    /// Uppercase HTTP method, e.g. `GET`.
    pub method: String,
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    /// Value of the session cookie, if the client sent one.
    pub session_cookie: Option<String>,
}

/// Session-cookie value and lifetime; attributes come from configuration
/// at materialization time.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub value: String,
    pub max_age: Duration,
}

/// What to do with the session cookie in the response.
#[derive(Debug, Clone)]
pub enum CookieAction {
    None,
    Set(SessionCookie),
    Clear,
}

/// Structured outcome of interception, materialized by the host framework.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Hand the request to the wrapped application, with the identity
    /// attached when the request is authenticated.
    Allow { identity: Option<Identity> },
    Redirect {
        location: String,
        cookie: CookieAction,
    },
    Reject { status: u16, cookie: CookieAction },
}

/// Request interceptor implementing the per-request decision logic:
/// excluded paths pass through, flow endpoints delegate to the
/// controller, everything else requires a live session.
///
/// Holds no per-request mutable state; everything cross-request lives in
/// the stores behind the controller.
pub struct AuthMiddleware {
    controller: Arc<OidcController>,
}

impl AuthMiddleware {
    pub fn new(controller: Arc<OidcController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<OidcController> {
        &self.controller
    }

    /// Decides what happens to one inbound request.
    pub async fn handle(&self, request: &RequestFacts) -> Decision {
        let config = self.controller.config();

        // 1. Excluded paths bypass authentication entirely.
        if matches_excluded_path(&config.excluded_paths, &request.path) {
            return Decision::Allow { identity: None };
        }

        if request.path == config.login_path {
            return self.login(request).await;
        }
        if request.path == config.callback_path {
            return self.callback(request).await;
        }
        if request.path == config.logout_path {
            return self.logout(request).await;
        }

        self.authenticate(request).await
    }

    async fn login(&self, request: &RequestFacts) -> Decision {
        if request.method != "GET" {
            return Decision::Reject {
                status: 405,
                cookie: CookieAction::None,
            };
        }
        let requested = query_param(request.query.as_deref(), "return_to");
        match self.controller.begin_login(requested.as_deref()).await {
            Ok(url) => Decision::Redirect {
                location: url.to_string(),
                cookie: CookieAction::None,
            },
            Err(err) => reject(err, CookieAction::None),
        }
    }

    async fn callback(&self, request: &RequestFacts) -> Decision {
        if request.method != "GET" {
            return Decision::Reject {
                status: 405,
                cookie: CookieAction::None,
            };
        }
        let query = request.query.as_deref();
        let (Some(code), Some(state)) =
            (query_param(query, "code"), query_param(query, "state"))
        else {
            tracing::warn!("callback missing code or state parameter");
            return Decision::Reject {
                status: 400,
                cookie: CookieAction::None,
            };
        };

        match self
            .controller
            .handle_callback(&CallbackParams { code, state })
            .await
        {
            Ok(outcome) => Decision::Redirect {
                location: outcome.redirect_to,
                cookie: CookieAction::Set(SessionCookie {
                    value: outcome.session.id.to_string(),
                    max_age: self.controller.config().absolute_ttl,
                }),
            },
            // No cookie is ever set on a failed callback, and the
            // callback answers its failures in the 400 class: the code
            // and state came in on the redirect, so a rejected exchange
            // is a bad request, not a gateway fault. Only a store
            // outage stays a server error.
            Err(err) => {
                let status = match status_for(&err) {
                    status if status < 500 => status,
                    _ if matches!(err, AuthError::StoreUnavailable(_)) => 503,
                    _ => 400,
                };
                reject_with(status, err, CookieAction::None)
            }
        }
    }

    async fn logout(&self, request: &RequestFacts) -> Decision {
        let session_id = request
            .session_cookie
            .clone()
            .map(SessionId::new);
        match self.controller.logout(session_id.as_ref()).await {
            Ok(outcome) => Decision::Redirect {
                location: outcome.redirect_to,
                cookie: CookieAction::Clear,
            },
            Err(err) => reject(err, CookieAction::None),
        }
    }

    async fn authenticate(&self, request: &RequestFacts) -> Decision {
        let Some(value) = request.session_cookie.as_deref() else {
            return self.redirect_to_login(request);
        };
        let id = SessionId::new(value.to_string());

        match self.controller.resolve_session(&id).await {
            Ok(Some(session)) => match self.controller.refresh_if_needed(session).await {
                Ok(session) => Decision::Allow {
                    identity: Some(session.identity()),
                },
                Err(AuthError::SessionExpired) => self.redirect_to_login(request),
                Err(err) => reject(err, CookieAction::None),
            },
            Ok(None) => self.redirect_to_login(request),
            Err(err) => reject(err, CookieAction::None),
        }
    }

    /// Redirects to login-start with the current path remembered as the
    /// post-login destination.
    fn redirect_to_login(&self, request: &RequestFacts) -> Decision {
        let config = self.controller.config();
        let destination = match request.query.as_deref() {
            Some(query) => format!("{}?{}", request.path, query),
            None => request.path.clone(),
        };
        let location = format!(
            "{}?return_to={}",
            config.login_path,
            urlencoding::encode(&destination)
        );
        // A cookie that did not resolve to a session is stale; drop it.
        let cookie = if request.session_cookie.is_some() {
            CookieAction::Clear
        } else {
            CookieAction::None
        };
        Decision::Redirect { location, cookie }
    }
}

fn reject(err: AuthError, cookie: CookieAction) -> Decision {
    let status = status_for(&err);
    reject_with(status, err, cookie)
}

fn reject_with(status: u16, err: AuthError, cookie: CookieAction) -> Decision {
    if status >= 500 {
        tracing::error!(error = %err, status, "request rejected");
    } else {
        tracing::warn!(error = %err, status, "request rejected");
    }
    Decision::Reject { status, cookie }
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
