//! C1: Identity Gate.
//!
//! Verifies the bearer credential and resolves a `user_id`/`roles`/`expires_at`
//! triple. Every component below this layer receives that identifier
//! explicitly — nothing downstream performs an ambient lookup.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Resolved identity for one authenticated call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthContext {
    pub user_id: String,
    pub roles: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    Missing,
    Malformed,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("auth error: {kind:?} ({detail})")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub detail: String,
}

impl AuthError {
    fn missing() -> Self {
        Self { kind: AuthErrorKind::Missing, detail: "no Authorization header".to_string() }
    }

    fn malformed(detail: impl Into<String>) -> Self {
        Self { kind: AuthErrorKind::Malformed, detail: detail.into() }
    }

    fn expired() -> Self {
        Self { kind: AuthErrorKind::Expired, detail: "token expired".to_string() }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    #[serde(default)]
    roles: Vec<String>,
}

/// Verification contract. Keycloak itself is an external collaborator (§1);
/// this trait is the seam a live RS256/JWKS-backed implementation would fill
/// in — only the HS256 dev/test verifier is implemented here.
pub trait JwtVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AuthContext, AuthError>;
}

/// HS256 shared-secret verifier for tests and local development.
pub struct StaticKeyJwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl StaticKeyJwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }
}

impl JwtVerifier for StaticKeyJwtVerifier {
    fn verify(&self, token: &str) -> Result<AuthContext, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::expired(),
                _ => AuthError::malformed(e.to_string()),
            }
        })?;
        let expires_at = DateTime::from_timestamp(data.claims.exp, 0)
            .ok_or_else(|| AuthError::malformed("exp claim out of range"))?;
        Ok(AuthContext { user_id: data.claims.sub, roles: data.claims.roles, expires_at })
    }
}

/// Extracts and verifies the bearer token from the request's headers.
pub struct IdentityGate {
    verifier: Arc<dyn JwtVerifier>,
}

impl IdentityGate {
    pub fn new(verifier: Arc<dyn JwtVerifier>) -> Self {
        Self { verifier }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let header = headers.get(axum::http::header::AUTHORIZATION).ok_or_else(AuthError::missing)?;
        let value = header
            .to_str()
            .map_err(|_| AuthError::malformed("Authorization header is not valid UTF-8"))?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| AuthError::malformed("Authorization header must be 'Bearer <token>'"))?;
        if token.trim().is_empty() {
            return Err(AuthError::malformed("empty bearer token"));
        }
        let ctx = self.verifier.verify(token)?;
        if ctx.expires_at < Utc::now() {
            return Err(AuthError::expired());
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, exp: i64, secret: &str) -> String {
        let claims = serde_json::json!({ "sub": sub, "exp": exp, "roles": ["agent"] });
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn missing_header_rejected() {
        let gate = IdentityGate::new(Arc::new(StaticKeyJwtVerifier::new("secret")));
        let headers = HeaderMap::new();
        assert_eq!(gate.authenticate(&headers).unwrap_err().kind, AuthErrorKind::Missing);
    }

    #[test]
    fn malformed_scheme_rejected() {
        let gate = IdentityGate::new(Arc::new(StaticKeyJwtVerifier::new("secret")));
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(gate.authenticate(&headers).unwrap_err().kind, AuthErrorKind::Malformed);
    }

    #[test]
    fn valid_token_resolves_user() {
        let gate = IdentityGate::new(Arc::new(StaticKeyJwtVerifier::new("secret")));
        let exp = (Utc::now() + chrono::Duration::hours(1)).timestamp();
        let token = token_for("user-1", exp, "secret");
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        let ctx = gate.authenticate(&headers).unwrap();
        assert_eq!(ctx.user_id, "user-1");
        assert_eq!(ctx.roles, vec!["agent".to_string()]);
    }

    #[test]
    fn expired_token_rejected() {
        let gate = IdentityGate::new(Arc::new(StaticKeyJwtVerifier::new("secret")));
        let exp = (Utc::now() - chrono::Duration::hours(1)).timestamp();
        let token = token_for("user-1", exp, "secret");
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(gate.authenticate(&headers).unwrap_err().kind, AuthErrorKind::Expired);
    }

    #[test]
    fn wrong_secret_rejected() {
        let gate = IdentityGate::new(Arc::new(StaticKeyJwtVerifier::new("secret")));
        let exp = (Utc::now() + chrono::Duration::hours(1)).timestamp();
        let token = token_for("user-1", exp, "other-secret");
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(gate.authenticate(&headers).unwrap_err().kind, AuthErrorKind::Malformed);
    }
}
