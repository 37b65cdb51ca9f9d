//! ID-token claim validation.

use authgate_core::AuthError;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde_json::Value;

/// Claims extracted from a validated ID token.
#[derive(Debug, Clone)]
pub struct IdToken {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// The full claim set, kept for the session.
    pub raw: Value,
}

/// Validates issuer, audience and expiry of an ID token and extracts its
/// claims.
///
/// The token arrives directly from the token endpoint over TLS, so trust
/// is established by the exchange itself plus these claim checks; JWS
/// signature verification against provider keys is deliberately not
/// performed here.
pub fn validate_id_token(token: &str, issuer: &str, client_id: &str) -> Result<IdToken, AuthError> {
    let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[client_id]);
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

    let data = decode::<Value>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    let raw = data.claims;

    let subject = raw
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthError::MissingClaim("sub".to_string()))?
        .to_string();
    let email = raw.get("email").and_then(Value::as_str).map(String::from);
    let name = raw.get("name").and_then(Value::as_str).map(String::from);

    Ok(IdToken {
        subject,
        email,
        name,
        raw,
    })
}
