//! Test support: an in-process mock identity provider and a flow harness.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use authgate_oidc::{AuthConfig, AuthState, MemoryStore, OidcController, ProviderEndpoints};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use url::Url;

pub const ISSUER: &str = "https://idp.test";
pub const CLIENT_ID: &str = "client-1";

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Knobs controlling how the mock IdP behaves, adjustable mid-test.
pub struct IdpBehavior {
    pub subject: String,
    pub email: String,
    pub name: String,
    /// Mint the ID token for a different audience.
    pub audience_override: Option<String>,
    /// Mint an ID token whose `exp` is in the past.
    pub issue_expired_token: bool,
    /// Userinfo reports a different subject than the ID token.
    pub userinfo_subject_override: Option<String>,
    pub fail_userinfo: bool,
    /// Respond 503 from the token endpoint this many times.
    pub token_failures_remaining: u32,
    pub last_token_request: Option<HashMap<String, String>>,
}

impl Default for IdpBehavior {
    fn default() -> Self {
        Self {
            subject: "user-1".to_string(),
            email: "user@example.com".to_string(),
            name: "User One".to_string(),
            audience_override: None,
            issue_expired_token: false,
            userinfo_subject_override: None,
            fail_userinfo: false,
            token_failures_remaining: 0,
            last_token_request: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct IdpHandle(Arc<Mutex<IdpBehavior>>);

impl IdpHandle {
    pub fn set(&self, tweak: impl FnOnce(&mut IdpBehavior)) {
        let mut behavior = self.0.lock().unwrap();
        tweak(&mut behavior);
    }

    pub fn last_token_request(&self) -> Option<HashMap<String, String>> {
        self.0.lock().unwrap().last_token_request.clone()
    }
}

pub struct MockIdp {
    pub base_url: Url,
    pub handle: IdpHandle,
}

/// Starts the mock IdP on an ephemeral port.
pub async fn spawn_idp() -> MockIdp {
    let handle = IdpHandle::default();
    let app = Router::new()
        .route("/token", post(token_endpoint))
        .route("/userinfo", get(userinfo_endpoint))
        .with_state(handle.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockIdp {
        base_url: Url::parse(&format!("http://{addr}")).unwrap(),
        handle,
    }
}

async fn token_endpoint(
    State(handle): State<IdpHandle>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let mut behavior = handle.0.lock().unwrap();
    behavior.last_token_request = Some(params.clone());

    if behavior.token_failures_remaining > 0 {
        behavior.token_failures_remaining -= 1;
        return (StatusCode::SERVICE_UNAVAILABLE, "try again later").into_response();
    }

    match params.get("grant_type").map(String::as_str) {
        Some("authorization_code") | Some("refresh_token") => {
            let refreshing = params.get("grant_type").map(String::as_str)
                == Some("refresh_token");
            let now = Utc::now().timestamp();
            let exp = if behavior.issue_expired_token {
                now - 3600
            } else {
                now + 300
            };
            let audience = behavior
                .audience_override
                .clone()
                .unwrap_or_else(|| CLIENT_ID.to_string());

            let id_token = encode(
                &Header::default(),
                &json!({
                    "iss": ISSUER,
                    "aud": audience,
                    "sub": behavior.subject,
                    "exp": exp,
                    "iat": now,
                    "email": behavior.email,
                    "name": behavior.name,
                }),
                &EncodingKey::from_secret(b"mock-idp-key"),
            )
            .unwrap();

            let access_token = if refreshing {
                "access-refreshed"
            } else {
                "access-initial"
            };
            Json(json!({
                "access_token": access_token,
                "id_token": id_token,
                "refresh_token": "refresh-1",
                "expires_in": 3600,
                "token_type": "Bearer",
            }))
            .into_response()
        }
        Some(TOKEN_EXCHANGE_GRANT) => {
            let audience = params.get("audience").cloned().unwrap_or_default();
            Json(json!({
                "access_token": format!("exchanged-for-{audience}"),
                "expires_in": 300,
                "token_type": "Bearer",
            }))
            .into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "unsupported_grant_type").into_response(),
    }
}

async fn userinfo_endpoint(State(handle): State<IdpHandle>, headers: HeaderMap) -> Response {
    let behavior = handle.0.lock().unwrap();

    if behavior.fail_userinfo {
        return (StatusCode::INTERNAL_SERVER_ERROR, "userinfo down").into_response();
    }

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Bearer "));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let subject = behavior
        .userinfo_subject_override
        .clone()
        .unwrap_or_else(|| behavior.subject.clone());
    Json(json!({
        "sub": subject,
        "email": behavior.email,
        "name": behavior.name,
        "locale": "en-US",
    }))
    .into_response()
}

pub struct Harness {
    pub idp: MockIdp,
    pub store: Arc<MemoryStore>,
    pub state: AuthState,
}

pub async fn harness() -> Harness {
    harness_with(|_| {}).await
}

/// Builds a controller wired to a fresh mock IdP and in-memory store.
pub async fn harness_with(tweak: impl FnOnce(&mut AuthConfig)) -> Harness {
    init_tracing();

    let idp = spawn_idp().await;
    let mut config = AuthConfig::new(
        ProviderEndpoints {
            issuer: ISSUER.to_string(),
            authorization_endpoint: idp.base_url.join("/authorize").unwrap(),
            token_endpoint: idp.base_url.join("/token").unwrap(),
            userinfo_endpoint: idp.base_url.join("/userinfo").unwrap(),
        },
        CLIENT_ID,
        "secret-1",
        Url::parse("http://app.test/auth/callback").unwrap(),
    );
    config.cookie.secure = false;
    config.excluded_paths = vec!["/healthz".to_string(), "/public/*".to_string()];
    tweak(&mut config);

    let store = Arc::new(MemoryStore::new());
    let controller = OidcController::new(config, store.clone(), store.clone()).unwrap();

    Harness {
        idp,
        store,
        state: AuthState::new(controller),
    }
}

/// Extracts a query parameter from an authorization URL.
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
