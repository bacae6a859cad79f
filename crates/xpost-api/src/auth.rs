//! Bearer session token verification.
//!
//! Session issuance lives in the account service; this API only verifies.
//! A token is `{owner_id}.{expires_unix}.{signature}` where the signature is
//! HMAC-SHA256 over `{owner_id}.{expires_unix}`, base64url without padding.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub owner_id: String,
}

/// Verifies HMAC-signed session tokens.
pub struct TokenVerifier {
    mac: HmacSha256,
}

impl TokenVerifier {
    /// Create a verifier from the shared signing secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        // HMAC accepts keys of any length
        let mac = HmacSha256::new_from_slice(secret.as_ref()).expect("HMAC key of any length");
        Self { mac }
    }

    /// Create from the `AUTH_TOKEN_SECRET` environment variable.
    pub fn from_env() -> Result<Self, std::env::VarError> {
        Ok(Self::new(std::env::var("AUTH_TOKEN_SECRET")?))
    }

    /// Sign a token for `owner_id`, valid for `ttl_secs` seconds.
    ///
    /// The API never issues sessions; this exists for operator tooling and
    /// tests.
    pub fn issue(&self, owner_id: &str, ttl_secs: u64) -> String {
        let expires = Utc::now().timestamp() + ttl_secs as i64;
        let payload = format!("{}.{}", owner_id, expires);
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}", payload, signature)
    }

    /// Verify a token and return the authenticated user.
    pub fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        // Owner IDs may themselves contain dots; split from the right.
        let mut parts = token.rsplitn(3, '.');
        let (signature, expires, owner_id) = match (parts.next(), parts.next(), parts.next()) {
            (Some(sig), Some(exp), Some(owner)) if !owner.is_empty() => (sig, exp, owner),
            _ => return Err(ApiError::unauthorized("Malformed session token")),
        };

        let expires_at: i64 = expires
            .parse()
            .map_err(|_| ApiError::unauthorized("Malformed session token"))?;
        if expires_at < Utc::now().timestamp() {
            return Err(ApiError::unauthorized("Session expired"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| ApiError::unauthorized("Malformed session token"))?;

        let mut mac = self.mac.clone();
        mac.update(format!("{}.{}", owner_id, expires_at).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ApiError::unauthorized("Invalid session token"))?;

        Ok(AuthUser {
            owner_id: owner_id.to_string(),
        })
    }
}

/// Axum extractor for authenticated user.
#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        state.tokens.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_verify_round_trip() {
        let verifier = TokenVerifier::new("test-secret");
        let token = verifier.issue("user-1", 3600);
        let user = verifier.verify(&token).unwrap();
        assert_eq!(user.owner_id, "user-1");
    }

    #[test]
    fn test_owner_id_with_dots() {
        let verifier = TokenVerifier::new("test-secret");
        let token = verifier.issue("org.team.user", 3600);
        let user = verifier.verify(&token).unwrap();
        assert_eq!(user.owner_id, "org.team.user");
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = TokenVerifier::new("test-secret");
        let expires = Utc::now().timestamp() - 10;
        let payload = format!("user-1.{}", expires);
        let mut mac = HmacSha256::new_from_slice(b"test-secret").unwrap();
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        let token = format!("{}.{}", payload, signature);

        let err = verifier.verify(&token).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let verifier = TokenVerifier::new("test-secret");
        let token = verifier.issue("user-1", 3600);
        let tampered = token.replacen("user-1", "user-2", 1);
        assert!(verifier.verify(&tampered).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenVerifier::new("secret-a").issue("user-1", 3600);
        assert!(TokenVerifier::new("secret-b").verify(&token).is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        let verifier = TokenVerifier::new("test-secret");
        assert!(verifier.verify("garbage").is_err());
        assert!(verifier.verify("a.b").is_err());
        assert!(verifier.verify("").is_err());
    }
}
