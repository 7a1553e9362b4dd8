//! Authentication routes

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use animuse_shared::{OAuthProvider, User};

use crate::auth::jwt::{ACCESS_TOKEN_TTL, REFRESH_TOKEN_TTL};
use crate::auth::sessions::IssuedTokens;
use crate::auth::store::CredentialStore;
use crate::auth::{extract::cookie_value, AuthUser, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Request/Response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub oauth_providers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// =============================================================================
// Validation
// =============================================================================

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Collect every field violation, not just the first
fn validate_signup(req: &SignupRequest) -> ApiResult<()> {
    let mut problems = Vec::new();
    if !is_valid_email(&req.email) {
        problems.push("email must be a valid email address");
    }
    if req.username.len() < 3 || req.username.len() > 30 {
        problems.push("username must be between 3 and 30 characters");
    }
    if req.password.len() < 8 {
        problems.push("password must be at least 8 characters");
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(problems.join("; ")))
    }
}

fn validate_login(req: &LoginRequest) -> ApiResult<()> {
    let mut problems = Vec::new();
    if !is_valid_email(&req.email) {
        problems.push("email must be a valid email address");
    }
    if req.password.is_empty() {
        problems.push("password must not be empty");
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(problems.join("; ")))
    }
}

// =============================================================================
// Cookies
// =============================================================================

fn build_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    let secure_attr = if secure { "Secure; " } else { "" };
    format!("{name}={value}; HttpOnly; {secure_attr}SameSite=Strict; Path=/; Max-Age={max_age}")
}

type CookieHeaders = AppendHeaders<[(HeaderName, String); 2]>;

fn auth_cookies(state: &AppState, tokens: &IssuedTokens) -> CookieHeaders {
    let secure = state.config.is_production();
    AppendHeaders([
        (
            header::SET_COOKIE,
            build_cookie(
                ACCESS_TOKEN_COOKIE,
                &tokens.access,
                ACCESS_TOKEN_TTL.whole_seconds(),
                secure,
            ),
        ),
        (
            header::SET_COOKIE,
            build_cookie(
                REFRESH_TOKEN_COOKIE,
                &tokens.refresh,
                REFRESH_TOKEN_TTL.whole_seconds(),
                secure,
            ),
        ),
    ])
}

fn clear_cookies(state: &AppState) -> CookieHeaders {
    let secure = state.config.is_production();
    AppendHeaders([
        (
            header::SET_COOKIE,
            build_cookie(ACCESS_TOKEN_COOKIE, "", 0, secure),
        ),
        (
            header::SET_COOKIE,
            build_cookie(REFRESH_TOKEN_COOKIE, "", 0, secure),
        ),
    ])
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    if !state.config.enable_signup {
        return Err(ApiError::Validation(
            "Registration is currently disabled".to_string(),
        ));
    }
    validate_signup(&req)?;

    let auth = state
        .sessions
        .signup(&req.email, &req.username, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        auth_cookies(&state, &auth.tokens),
        Json(AuthResponse {
            user: UserResponse::from(&auth.user),
            message: "Signup successful".to_string(),
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_login(&req)?;

    let auth = state.sessions.login(&req.email, &req.password).await?;

    Ok((
        auth_cookies(&state, &auth.tokens),
        Json(AuthResponse {
            user: UserResponse::from(&auth.user),
            message: "Login successful".to_string(),
        }),
    ))
}

/// POST /api/auth/logout
///
/// Public and idempotent: clearing an absent session is still a success.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let token = cookie_value(&headers, REFRESH_TOKEN_COOKIE);
    state.sessions.logout(token.as_deref()).await?;

    Ok((
        clear_cookies(&state),
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    ))
}

/// POST /api/auth/logout-all
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    state.sessions.logout_all(user.user_id).await?;

    Ok((
        clear_cookies(&state),
        Json(MessageResponse {
            message: "All sessions revoked".to_string(),
        }),
    ))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let token = cookie_value(&headers, REFRESH_TOKEN_COOKIE)
        .ok_or_else(|| ApiError::Unauthorized("No refresh token provided".to_string()))?;

    let tokens = state.sessions.refresh(&token).await?;

    Ok((
        auth_cookies(&state, &tokens),
        Json(MessageResponse {
            message: "Token refreshed successfully".to_string(),
        }),
    ))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<MeResponse>> {
    let identities = state
        .store
        .list_oauth_identities(user.user_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(MeResponse {
        id: user.user_id,
        email: user.email,
        username: user.username,
        oauth_providers: identities.into_iter().map(|i| i.provider).collect(),
    }))
}

/// GET /api/auth/oauth/:provider
///
/// Provider callback: exchanges the code, signs the user in and redirects
/// back to the frontend with the session cookies set.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> ApiResult<impl IntoResponse> {
    let provider = OAuthProvider::parse(&provider)
        .ok_or_else(|| ApiError::Validation("Unknown OAuth provider".to_string()))?;

    let code = match (query.code.as_deref(), query.state.as_deref()) {
        (Some(code), Some(_)) if !code.is_empty() => code,
        _ => {
            return Err(ApiError::Validation(
                "Missing authorization code or state".to_string(),
            ))
        }
    };

    let profile = state.oauth.fetch_profile(provider, code).await?;
    let auth = state.sessions.oauth_login(provider, profile).await?;

    let destination = format!("{}/auth/callback?success=true", state.config.frontend_url);
    Ok((
        auth_cookies(&state, &auth.tokens),
        Redirect::to(&destination),
    ))
}
