//! Bearer-token authentication.
//!
//! One credential format for both surfaces: REST requests carry it in the
//! `Authorization` header, WebSocket connects pass it as a query parameter
//! (browsers cannot set headers on WS upgrades). Signature and expiry are
//! checked once; the subject becomes the connection identity.

use actix_web::{http::header::AUTHORIZATION, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{SessionRole, SessionUser};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub role: SessionRole,
    /// Expiry (unix timestamp), enforced by the decoder
    pub exp: i64,
}

/// Validate signature + expiry and extract claims (HS256).
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// Build the connection identity from validated claims.
///
/// A malformed subject is an internal identity-resolution failure, distinct
/// from a bad signature.
pub fn session_user_from_claims(claims: &Claims) -> Result<SessionUser, AppError> {
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Internal)?;
    Ok(SessionUser {
        user_id,
        display_name: claims.name.clone(),
        role: claims.role,
    })
}

/// Authenticated user extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthedUser(pub SessionUser);

fn bearer_from_request(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

impl FromRequest for AuthedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let result = (|| {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or(AppError::Internal)?;
            let token = bearer_from_request(req).ok_or(AppError::Unauthorized)?;
            let claims = verify_jwt(&token, &state.config.jwt_secret)?;
            session_user_from_claims(&claims)
        })();

        ready(result.map(AuthedUser).map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn issue(claims: &Claims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims() -> Claims {
        Claims {
            sub: Uuid::new_v4().to_string(),
            name: "Grace".into(),
            role: SessionRole::Instructor,
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        }
    }

    #[test]
    fn test_verify_round_trip() {
        let claims = valid_claims();
        let token = issue(&claims);
        let decoded = verify_jwt(&token, SECRET).unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.name, "Grace");
        assert_eq!(decoded.role, SessionRole::Instructor);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue(&valid_claims());
        assert!(matches!(
            verify_jwt(&token, "other-secret"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = valid_claims();
        claims.exp = (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp();
        let token = issue(&claims);
        assert!(matches!(
            verify_jwt(&token, SECRET),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_role_defaults_to_member() {
        // Tokens minted before roles existed carry no role claim
        #[derive(Serialize)]
        struct LegacyClaims<'a> {
            sub: &'a str,
            name: &'a str,
            exp: i64,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &LegacyClaims {
                sub: &Uuid::new_v4().to_string(),
                name: "Old Timer",
                exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let claims = verify_jwt(&token, SECRET).unwrap();
        assert_eq!(claims.role, SessionRole::Member);
    }

    #[test]
    fn test_bad_subject_is_identity_failure() {
        let mut claims = valid_claims();
        claims.sub = "not-a-uuid".into();
        assert!(matches!(
            session_user_from_claims(&claims),
            Err(AppError::Internal)
        ));
    }
}
