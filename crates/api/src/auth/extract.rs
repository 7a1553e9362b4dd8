//! Request authentication
//!
//! [`AuthUser`] is the axum extractor protected handlers take as an
//! argument. It resolves the access token (Authorization header first, then
//! the access cookie), verifies it as the access kind and loads the user.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::auth::jwt::{TokenError, TokenKind};
use crate::auth::store::CredentialStore;
use crate::auth::ACCESS_TOKEN_COOKIE;
use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
}

/// Resolve the access token from the request. A bearer header wins over the
/// cookie so API clients can override a stale browser session.
pub(crate) fn access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    cookie_value(headers, ACCESS_TOKEN_COOKIE)
}

/// Pull a single cookie out of the Cookie header
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        if parts.next() == Some(name) {
            return parts.next().map(|v| v.to_string());
        }
    }
    None
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let token = access_token(&parts.headers).ok_or_else(|| {
            ApiError::Unauthorized("No access token provided".to_string())
        })?;

        let claims = state
            .codec
            .verify(&token, TokenKind::Access)
            .map_err(|e| match e {
                TokenError::Expired => ApiError::Unauthorized("Token expired".to_string()),
                TokenError::WrongKind => {
                    ApiError::Unauthorized("Invalid token type".to_string())
                }
                _ => ApiError::Unauthorized("Invalid token".to_string()),
            })?;

        let user = state
            .store
            .find_user_by_id(claims.sub)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "User lookup failed during authentication");
                ApiError::Internal
            })?
            .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

        Ok(AuthUser {
            user_id: user.id,
            email: user.email,
            username: user.username,
        })
    }
}
