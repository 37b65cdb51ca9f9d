//! Axum materialization of the interception state machine.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::{AuthConfig, SameSitePolicy};
use crate::middleware::{CookieAction, Decision, RequestFacts};
use crate::state::AuthState;

/// The middleware entry point for axum.
///
/// Attach it in front of the application:
///
/// ```rust,ignore
/// use axum::{middleware, Router};
/// use authgate_oidc::{intercept, AuthState};
///
/// let app = Router::new()
///     .route("/", get(home))
///     .layer(middleware::from_fn_with_state(auth_state, intercept));
/// ```
pub async fn intercept(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let facts = RequestFacts {
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        session_cookie: jar
            .get(&state.config().cookie.name)
            .map(|cookie| cookie.value().to_string()),
    };

    match state.middleware().handle(&facts).await {
        Decision::Allow { identity } => {
            if let Some(identity) = identity {
                request.extensions_mut().insert(identity);
            }
            next.run(request).await
        }
        Decision::Redirect { location, cookie } => {
            let jar = apply_cookie(jar, cookie, state.config());
            (jar, Redirect::to(&location)).into_response()
        }
        Decision::Reject { status, cookie } => {
            let jar = apply_cookie(jar, cookie, state.config());
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (jar, status).into_response()
        }
    }
}

fn apply_cookie(jar: CookieJar, action: CookieAction, config: &AuthConfig) -> CookieJar {
    match action {
        CookieAction::None => jar,
        CookieAction::Set(session_cookie) => {
            let mut cookie = Cookie::build((config.cookie.name.clone(), session_cookie.value))
                .path("/")
                .http_only(true)
                .secure(config.cookie.secure)
                .same_site(match config.cookie.same_site {
                    SameSitePolicy::Lax => SameSite::Lax,
                    SameSitePolicy::Strict => SameSite::Strict,
                })
                .max_age(time::Duration::seconds(
                    session_cookie.max_age.as_secs() as i64
                ))
                .build();
            if let Some(domain) = config.cookie.domain.clone() {
                cookie.set_domain(domain);
            }
            jar.add(cookie)
        }
        CookieAction::Clear => {
            // The removal cookie must match the attributes the session
            // cookie was set with, or browsers keep the original.
            let mut removal = Cookie::from(config.cookie.name.clone());
            removal.set_path("/");
            if let Some(domain) = config.cookie.domain.clone() {
                removal.set_domain(domain);
            }
            jar.remove(removal)
        }
    }
}
