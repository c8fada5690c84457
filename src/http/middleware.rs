//! Authentication middleware and JWT verification

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::app::AppState;
use crate::util::time::unix_secs;

type HmacSha256 = Hmac<Sha256>;

/// Session token claims minted by the auth provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
    #[serde(default)]
    pub aud: Option<String>,
}

/// Verify an HS256 JWT and extract its claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken);
    };

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: JwtClaims =
        serde_json::from_slice(&payload).map_err(|_| AuthError::InvalidToken)?;

    if claims.exp < unix_secs() {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Resolve a session token to the participant it identifies
pub fn validate_session_token(token: &str, secret: &str) -> Result<Uuid, AuthError> {
    verify_jwt(token, secret).map(|claims| claims.sub)
}

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::InvalidFormat => StatusCode::BAD_REQUEST,
            AuthError::MissingHeader | AuthError::InvalidToken | AuthError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
        };

        (status, self.to_string()).into_response()
    }
}

/// Identity attached to authenticated requests
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

/// Middleware to require a bearer session token
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|rejection| {
        if rejection.is_missing() {
            AuthError::MissingHeader
        } else {
            AuthError::InvalidFormat
        }
    })?;

    let claims = verify_jwt(bearer.token(), &state.config.jwt_secret)?;

    request.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.sub,
    });

    Ok(next.run(request).await)
}

/// Mint a token the way the auth provider does
#[cfg(test)]
pub(crate) fn issue_test_token(user_id: Uuid, secret: &str, exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = JwtClaims {
        sub: user_id,
        exp,
        iat: unix_secs(),
        aud: Some("authenticated".to_string()),
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.{}", header, payload).as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{}.{}.{}", header, payload, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn valid_token_yields_subject() {
        let user = Uuid::new_v4();
        let token = issue_test_token(user, SECRET, unix_secs() + 60);
        assert_eq!(validate_session_token(&token, SECRET), Ok(user));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_test_token(Uuid::new_v4(), SECRET, unix_secs() + 60);
        assert_eq!(
            verify_jwt(&token, "other-secret").unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_test_token(Uuid::new_v4(), SECRET, unix_secs() - 1);
        assert_eq!(verify_jwt(&token, SECRET).unwrap_err(), AuthError::TokenExpired);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.##"] {
            assert_eq!(
                verify_jwt(token, SECRET).unwrap_err(),
                AuthError::InvalidToken,
                "{token}"
            );
        }

        let token = issue_test_token(Uuid::new_v4(), SECRET, unix_secs() + 60);
        let tampered = token.replacen('.', ".e30", 1);
        assert_eq!(verify_jwt(&tampered, SECRET).unwrap_err(), AuthError::InvalidToken);
    }
}
