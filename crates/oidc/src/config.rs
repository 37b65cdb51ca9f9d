use std::time::Duration;

use authgate_core::AuthError;
use url::Url;

/// Endpoints of the configured identity provider.
///
/// Exactly one IdP is configured per instance; endpoints are supplied
/// explicitly rather than discovered.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// Expected `iss` value in ID tokens.
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub userinfo_endpoint: Url,
}

/// `SameSite` attribute for the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSitePolicy {
    Lax,
    Strict,
}

/// Session cookie settings. The cookie always carries `HttpOnly` and
/// `Path=/`; `Secure` is configurable only for deployments that
/// terminate TLS upstream.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSitePolicy,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "session".to_string(),
            domain: None,
            secure: true,
            same_site: SameSitePolicy::Lax,
        }
    }
}

/// Complete auth configuration.
///
/// Immutable and supplied by the embedding application at construction
/// time; this library never reads environment variables or files.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub provider: ProviderEndpoints,
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with the IdP.
    pub redirect_uri: Url,
    /// Requested scopes, in order. Must include `openid`.
    pub scopes: Vec<String>,
    pub cookie: CookieConfig,
    pub absolute_ttl: Duration,
    pub idle_ttl: Duration,
    /// TTL for in-flight login attempts. Minutes, not hours.
    pub flow_ttl: Duration,
    /// Refresh the access token when it is within this window of expiry.
    pub refresh_leeway: Duration,
    /// Timeout for outbound calls to the IdP.
    pub http_timeout: Duration,
    /// Path patterns that bypass authentication (exact or `prefix/*`).
    pub excluded_paths: Vec<String>,
    pub login_path: String,
    pub callback_path: String,
    pub logout_path: String,
    pub post_logout_redirect: String,
    /// Where to send users after login when no return path was remembered.
    pub default_return_to: String,
}

impl AuthConfig {
    /// Creates a configuration with library defaults for everything not
    /// passed explicitly. Adjust fields before handing it to
    /// [`crate::OidcController::new`], which validates it.
    pub fn new(
        provider: ProviderEndpoints,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        let callback_path = redirect_uri.path().to_string();
        Self {
            provider,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            cookie: CookieConfig::default(),
            absolute_ttl: Duration::from_secs(24 * 60 * 60),
            idle_ttl: Duration::from_secs(2 * 60 * 60),
            flow_ttl: Duration::from_secs(10 * 60),
            refresh_leeway: Duration::from_secs(60),
            http_timeout: Duration::from_secs(10),
            excluded_paths: Vec::new(),
            login_path: "/auth/login".to_string(),
            callback_path,
            logout_path: "/auth/logout".to_string(),
            post_logout_redirect: "/".to_string(),
            default_return_to: "/".to_string(),
        }
    }

    /// Checks invariants the flow depends on.
    pub fn validate(&self) -> Result<(), AuthError> {
        if !self.scopes.iter().any(|s| s == "openid") {
            return Err(AuthError::Config(
                "scopes must include 'openid'".to_string(),
            ));
        }
        for (label, path) in [
            ("login_path", &self.login_path),
            ("callback_path", &self.callback_path),
            ("logout_path", &self.logout_path),
        ] {
            if !path.starts_with('/') {
                return Err(AuthError::Config(format!("{label} must start with '/'")));
            }
        }
        if self.login_path == self.callback_path
            || self.login_path == self.logout_path
            || self.callback_path == self.logout_path
        {
            return Err(AuthError::Config(
                "login, callback and logout paths must be distinct".to_string(),
            ));
        }
        if self.idle_ttl > self.absolute_ttl {
            return Err(AuthError::Config(
                "idle_ttl must not exceed absolute_ttl".to_string(),
            ));
        }
        if self.flow_ttl.is_zero() || self.http_timeout.is_zero() {
            return Err(AuthError::Config(
                "flow_ttl and http_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> ProviderEndpoints {
        ProviderEndpoints {
            issuer: "https://idp.test".to_string(),
            authorization_endpoint: Url::parse("https://idp.test/authorize").unwrap(),
            token_endpoint: Url::parse("https://idp.test/token").unwrap(),
            userinfo_endpoint: Url::parse("https://idp.test/userinfo").unwrap(),
        }
    }

    fn config() -> AuthConfig {
        AuthConfig::new(
            endpoints(),
            "client-1",
            "secret-1",
            Url::parse("https://app.test/auth/callback").unwrap(),
        )
    }

    #[test]
    fn defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn callback_path_defaults_to_redirect_uri_path() {
        assert_eq!(config().callback_path, "/auth/callback");
    }

    #[test]
    fn rejects_missing_openid_scope() {
        let mut config = config();
        config.scopes = vec!["email".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_colliding_flow_paths() {
        let mut config = config();
        config.logout_path.clone_from(&config.login_path);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_idle_ttl_above_absolute_ttl() {
        let mut config = config();
        config.idle_ttl = config.absolute_ttl + Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_relative_flow_paths() {
        let mut config = config();
        config.login_path = "auth/login".to_string();
        assert!(config.validate().is_err());
    }
}
