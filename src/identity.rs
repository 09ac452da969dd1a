use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ReciboError;
use crate::router::ReciboState;

/// Claims read from an inbound bearer token. `sub` is the stable user
/// identity every downstream record is keyed by.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    email: Option<String>,
}

/// A verified per-request identity. There are exactly two outcomes for any
/// request: this struct, or rejection. No shared or default identity exists.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Validates bearer tokens against the configured signing secret.
/// When no secret is configured, every request is rejected outright;
/// misconfiguration must never pool users under one identity.
#[derive(Clone)]
pub struct IdentityVerifier {
    secret: Option<String>,
    audience: Option<String>,
}

impl IdentityVerifier {
    pub fn new(secret: Option<String>, audience: Option<String>) -> Self {
        Self { secret, audience }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, ReciboError> {
        let Some(secret) = self.secret.as_deref() else {
            warn!("identity verification unconfigured; rejecting request");
            return Err(ReciboError::Unauthenticated);
        };

        let mut validation = Validation::new(Algorithm::HS256);
        match self.audience.as_deref() {
            Some(aud) => validation.set_audience(&[aud]),
            // issuer tokens do not always carry an audience
            None => validation.validate_aud = false,
        }

        let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map_err(|e| {
                debug!(error = %e, "bearer token rejected");
                ReciboError::Unauthenticated
            })?;

        Ok(AuthUser {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }
}

impl FromRequestParts<ReciboState> for AuthUser {
    type Rejection = ReciboError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ReciboState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(ReciboError::Unauthenticated)?;
        let token = auth
            .trim()
            .strip_prefix("Bearer ")
            .or_else(|| auth.trim().strip_prefix("bearer "))
            .ok_or(ReciboError::Unauthenticated)?;
        state.verifier.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
        email: Option<String>,
    }

    fn mint(secret: &str, sub: &str, exp: i64) -> String {
        encode(
            &Header::default(),
            &TestClaims {
                sub: sub.to_string(),
                exp,
                email: None,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn valid_token_yields_subject() {
        let verifier = IdentityVerifier::new(Some("s3cret".into()), None);
        let user = verifier.verify(&mint("s3cret", "user-1", far_future())).unwrap();
        assert_eq!(user.user_id, "user-1");
    }

    #[test]
    fn same_subject_yields_same_identity() {
        let verifier = IdentityVerifier::new(Some("s3cret".into()), None);
        let a = verifier.verify(&mint("s3cret", "user-1", far_future())).unwrap();
        let b = verifier.verify(&mint("s3cret", "user-1", far_future())).unwrap();
        assert_eq!(a.user_id, b.user_id);
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let verifier = IdentityVerifier::new(Some("s3cret".into()), None);
        let err = verifier
            .verify(&mint("other-secret", "user-1", far_future()))
            .unwrap_err();
        assert!(matches!(err, ReciboError::Unauthenticated));
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = IdentityVerifier::new(Some("s3cret".into()), None);
        let expired = chrono::Utc::now().timestamp() - 3600;
        let err = verifier.verify(&mint("s3cret", "user-1", expired)).unwrap_err();
        assert!(matches!(err, ReciboError::Unauthenticated));
    }

    #[test]
    fn unconfigured_secret_rejects_every_token() {
        let verifier = IdentityVerifier::new(None, None);
        let err = verifier.verify(&mint("s3cret", "user-1", far_future())).unwrap_err();
        assert!(matches!(err, ReciboError::Unauthenticated));
    }

    #[test]
    fn malformed_token_is_rejected() {
        let verifier = IdentityVerifier::new(Some("s3cret".into()), None);
        assert!(matches!(
            verifier.verify("not-a-jwt").unwrap_err(),
            ReciboError::Unauthenticated
        ));
    }
}
