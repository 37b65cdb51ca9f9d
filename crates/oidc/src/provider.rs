//! HTTP client for the configured identity provider.

use std::sync::Arc;
use std::time::Duration;

use authgate_core::AuthError;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;

use crate::config::AuthConfig;

/// RFC 8693 token-exchange grant type.
const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Bounded retry for transient token-endpoint failures.
const TOKEN_ATTEMPTS: u32 = 2;
const TOKEN_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Successful response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Client for the token and userinfo endpoints of the configured IdP.
pub struct ProviderClient {
    http: reqwest::Client,
    config: Arc<AuthConfig>,
}

impl ProviderClient {
    /// Builds the client. Redirect following stays off: the token and
    /// userinfo endpoints must answer directly.
    pub fn new(config: Arc<AuthConfig>) -> Result<Self, AuthError> {
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        let redirect_uri = self.config.redirect_uri.to_string();
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code_verifier", pkce_verifier),
        ];
        self.token_request_with_retry(&params).await
    }

    /// Exchanges a refresh token for new tokens.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.token_request_with_retry(&params).await
    }

    /// RFC 8693 exchange of an access token for one scoped to `audience`.
    pub async fn exchange_for_audience(
        &self,
        subject_token: &str,
        audience: &str,
    ) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("subject_token", subject_token),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
            ("audience", audience),
        ];
        self.token_request(&params).await
    }

    /// Fetches the userinfo document with the access token.
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<Value, AuthError> {
        let response = self
            .http
            .get(self.config.provider.userinfo_endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::UserInfoUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::UserInfoUnavailable(format!(
                "userinfo endpoint returned {status}"
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AuthError::UserInfoUnavailable(format!("malformed userinfo body: {e}")))
    }

    async fn token_request_with_retry(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, AuthError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.token_request(params).await {
                Err(err) if err.is_transient() && attempt < TOKEN_ATTEMPTS => {
                    tracing::debug!(attempt, error = %err, "transient token endpoint failure, retrying");
                    tokio::time::sleep(TOKEN_RETRY_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(self.config.provider.token_endpoint.clone())
            .header(ACCEPT, "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange {
                message: e.to_string(),
                transient: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if !status.is_success() {
            // Raw provider bodies go to the log, never to callers.
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                %status,
                body = authgate_core::truncate_for_log(&body, 256),
                "token endpoint returned an error"
            );
            return Err(AuthError::TokenExchange {
                message: format!("token endpoint returned {status}"),
                transient: status.is_server_error(),
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::TokenExchange {
                message: format!("malformed token response: {e}"),
                transient: false,
            })
    }
}
