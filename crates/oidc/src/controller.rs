//! The authorization-code flow.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use authgate_core::{
    calculate_expiry, generate_session_id, generate_state, is_session_expired, truncate_for_log,
    validate_return_to, AuthError, FlowState, FlowStateStore, Result, Session, SessionId,
    SessionStore,
};
use chrono::Utc;
use oauth2::PkceCodeChallenge;
use serde_json::Value;
use url::Url;

use crate::config::AuthConfig;
use crate::provider::{ProviderClient, TokenResponse};

/// Query parameters delivered by the IdP callback.
#[derive(Debug, Clone)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// Outcome of a successful callback.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub session: Session,
    /// The path originally requested before login, or the configured default.
    pub redirect_to: String,
}

/// Outcome of logout.
#[derive(Debug, Clone)]
pub struct LogoutOutcome {
    pub redirect_to: String,
}

/// Serializes token refresh per session id so two concurrent requests
/// never both spend the same refresh token.
#[derive(Default)]
struct RefreshLocks {
    inner: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl RefreshLocks {
    fn acquire(&self, id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.retain(|_, weak| weak.strong_count() > 0);
        match map.get(id.as_str()).and_then(Weak::upgrade) {
            Some(existing) => existing,
            None => {
                let lock = Arc::new(tokio::sync::Mutex::new(()));
                map.insert(id.as_str().to_string(), Arc::downgrade(&lock));
                lock
            }
        }
    }
}

/// Owns the authorization-code flow: builds the authorization redirect,
/// validates and consumes callback parameters, performs token exchange
/// and userinfo retrieval, and creates/destroys sessions.
///
/// Never touches the transport layer; it returns structured outcomes the
/// middleware materializes into HTTP responses.
pub struct OidcController {
    config: Arc<AuthConfig>,
    sessions: Arc<dyn SessionStore>,
    flows: Arc<dyn FlowStateStore>,
    provider: ProviderClient,
    refresh_locks: RefreshLocks,
}

impl OidcController {
    /// Validates the configuration and builds the controller.
    pub fn new(
        config: AuthConfig,
        sessions: Arc<dyn SessionStore>,
        flows: Arc<dyn FlowStateStore>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let provider = ProviderClient::new(config.clone())?;
        Ok(Self {
            config,
            sessions,
            flows,
            provider,
            refresh_locks: RefreshLocks::default(),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Starts a login attempt: persists the flow state under a fresh
    /// state nonce and returns the IdP authorization URL.
    pub async fn begin_login(&self, requested_path: Option<&str>) -> Result<Url> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let state = generate_state();

        // Only same-site relative paths survive as the post-login target.
        let return_to = requested_path
            .and_then(validate_return_to)
            .map(String::from);

        let flow = FlowState {
            pkce_verifier: pkce_verifier.secret().to_string(),
            created_at: Utc::now(),
            return_to,
        };
        self.flows
            .create(&state, &flow, self.config.flow_ttl)
            .await?;

        let mut url = self.config.provider.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("code_challenge", pkce_challenge.as_str())
            .append_pair("code_challenge_method", "S256");

        tracing::debug!(state = truncate_for_log(&state, 8), "login started");
        Ok(url)
    }

    /// Validates the provider callback, exchanges the code for tokens and
    /// creates a session.
    pub async fn handle_callback(&self, params: &CallbackParams) -> Result<CallbackOutcome> {
        let flow = self.flows.consume(&params.state).await?.ok_or_else(|| {
            tracing::warn!(
                state = truncate_for_log(&params.state, 8),
                "callback with unknown, expired or replayed state"
            );
            AuthError::InvalidState
        })?;

        let tokens = self
            .provider
            .exchange_code(&params.code, &flow.pkce_verifier)
            .await?;
        let id_token_raw = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::InvalidToken("no ID token in token response".to_string()))?;
        let id_token = crate::token::validate_id_token(
            id_token_raw,
            &self.config.provider.issuer,
            &self.config.client_id,
        )?;

        let mut claims = id_token.raw;
        let mut email = id_token.email;
        let mut name = id_token.name;

        // Userinfo is best-effort enrichment; a mismatched subject is not.
        if let Some(access_token) = tokens.access_token.as_deref() {
            match self.provider.fetch_userinfo(access_token).await {
                Ok(userinfo) => {
                    let userinfo_sub = userinfo.get("sub").and_then(Value::as_str);
                    if userinfo_sub.is_some_and(|sub| sub != id_token.subject) {
                        return Err(AuthError::InvalidToken(
                            "userinfo subject does not match ID token".to_string(),
                        ));
                    }
                    if let (Some(merged), Some(extra)) = (claims.as_object_mut(), userinfo.as_object())
                    {
                        for (key, value) in extra {
                            merged.insert(key.clone(), value.clone());
                        }
                    }
                    email = userinfo
                        .get("email")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .or(email);
                    name = userinfo
                        .get("name")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .or(name);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "userinfo fetch failed, using ID-token claims");
                }
            }
        }

        let now = Utc::now();
        let session = Session {
            id: generate_session_id(),
            subject: id_token.subject,
            email,
            name,
            claims,
            issued_at: now,
            absolute_expires_at: calculate_expiry(now, self.config.absolute_ttl),
            idle_expires_at: calculate_expiry(now, self.config.idle_ttl),
            access_token: tokens.access_token,
            access_token_expires_at: tokens
                .expires_in
                .map(|secs| calculate_expiry(now, Duration::from_secs(secs))),
            refresh_token: tokens.refresh_token,
        };
        self.sessions
            .put(&session, self.config.absolute_ttl)
            .await?;

        let redirect_to = flow
            .return_to
            .unwrap_or_else(|| self.config.default_return_to.clone());
        tracing::info!(subject = %session.subject, "login completed");

        Ok(CallbackOutcome {
            session,
            redirect_to,
        })
    }

    /// Deletes the session unconditionally. Deleting an absent id is not
    /// an error, so logout is idempotent.
    pub async fn logout(&self, session_id: Option<&SessionId>) -> Result<LogoutOutcome> {
        if let Some(id) = session_id {
            self.sessions.delete(id).await?;
            tracing::debug!("session deleted on logout");
        }
        Ok(LogoutOutcome {
            redirect_to: self.config.post_logout_redirect.clone(),
        })
    }

    /// Resolves a cookie value to a live session, enforcing expiry and
    /// sliding the idle window forward.
    pub async fn resolve_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let Some(mut session) = self.sessions.get(id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if is_session_expired(&session, now) {
            self.sessions.delete(id).await?;
            return Ok(None);
        }

        let idle_expires_at =
            calculate_expiry(now, self.config.idle_ttl).min(session.absolute_expires_at);
        self.sessions.touch(id, idle_expires_at).await?;
        session.idle_expires_at = idle_expires_at;

        Ok(Some(session))
    }

    /// Refreshes the access token if it is near expiry and a refresh
    /// token is present. A failed refresh invalidates the session rather
    /// than leaving it half-updated.
    pub async fn refresh_if_needed(&self, session: Session) -> Result<Session> {
        if !self.needs_refresh(&session) {
            return Ok(session);
        }

        let lock = self.refresh_locks.acquire(&session.id);
        let _guard = lock.lock().await;

        // Another request may have refreshed while we waited on the lock.
        let current = self
            .sessions
            .get(&session.id)
            .await?
            .ok_or(AuthError::SessionExpired)?;
        if !self.needs_refresh(&current) {
            return Ok(current);
        }
        let Some(refresh_token) = current.refresh_token.clone() else {
            return Ok(current);
        };

        match self.provider.refresh(&refresh_token).await {
            Ok(tokens) => {
                let updated = apply_refresh(current, tokens);
                let remaining = (updated.absolute_expires_at - Utc::now())
                    .to_std()
                    .unwrap_or_default();
                self.sessions.put(&updated, remaining).await?;
                tracing::debug!(subject = %updated.subject, "access token refreshed");
                Ok(updated)
            }
            Err(err) => {
                tracing::warn!(
                    subject = %current.subject,
                    error = %err,
                    "token refresh failed, invalidating session"
                );
                self.sessions.delete(&current.id).await?;
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// RFC 8693 token exchange: trades the session's access token for one
    /// scoped to a downstream `audience`.
    pub async fn exchange_for_audience(
        &self,
        session_id: &SessionId,
        audience: &str,
    ) -> Result<String> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(AuthError::SessionExpired)?;
        let subject_token = session.access_token.as_deref().ok_or_else(|| {
            AuthError::TokenExchange {
                message: "session holds no access token".to_string(),
                transient: false,
            }
        })?;

        let tokens = self
            .provider
            .exchange_for_audience(subject_token, audience)
            .await?;
        tokens
            .access_token
            .ok_or_else(|| AuthError::TokenExchange {
                message: "no access token in exchange response".to_string(),
                transient: false,
            })
    }

    fn needs_refresh(&self, session: &Session) -> bool {
        if session.refresh_token.is_none() {
            return false;
        }
        match session.access_token_expires_at {
            Some(at) => {
                let leeway = chrono::Duration::from_std(self.config.refresh_leeway)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                at <= Utc::now() + leeway
            }
            None => false,
        }
    }
}

fn apply_refresh(mut session: Session, tokens: TokenResponse) -> Session {
    let now = Utc::now();
    if tokens.access_token.is_some() {
        session.access_token = tokens.access_token;
    }
    // calculate_expiry saturates, so an absurd expires_in can never
    // wrap into the past and force a refresh on every request.
    session.access_token_expires_at = tokens
        .expires_in
        .map(|secs| calculate_expiry(now, Duration::from_secs(secs)));
    // Some IdPs rotate the refresh token on every use.
    if tokens.refresh_token.is_some() {
        session.refresh_token = tokens.refresh_token;
    }
    session
}
