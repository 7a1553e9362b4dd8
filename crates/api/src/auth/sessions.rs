//! Session lifecycle orchestration
//!
//! [`SessionManager`] owns signup, login, OAuth login, refresh rotation and
//! logout. It is generic over the credential store so the flows can be
//! tested without a database.

use std::sync::Arc;

use animuse_shared::{OAuthProvider, User};
use rand::Rng;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::cipher::EncryptedSecret;
use crate::auth::jwt::{TokenCodec, TokenKind, REFRESH_TOKEN_TTL};
use crate::auth::oauth::OAuthProfile;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::store::{CredentialStore, NewUser, StoreError};
use crate::error::{ApiError, ApiResult};

const USERNAME_ATTEMPTS: u32 = 5;

/// A freshly minted access/refresh pair; the refresh half is already
/// registered in the store
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access: String,
    pub refresh: String,
}

/// Result of a successful signup, login or OAuth login
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub tokens: IssuedTokens,
}

pub struct SessionManager<S> {
    store: Arc<S>,
    codec: TokenCodec,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => ApiError::Conflict(format!("{field} already exists")),
            StoreError::Database(e) => {
                tracing::error!("Credential store error: {:?}", e);
                ApiError::Internal
            }
        }
    }
}

impl<S: CredentialStore> SessionManager<S> {
    pub fn new(store: Arc<S>, codec: TokenCodec) -> Self {
        Self { store, codec }
    }

    /// Mint an access/refresh pair and register the refresh half
    async fn issue_tokens(&self, user_id: Uuid, email: &str) -> ApiResult<IssuedTokens> {
        let access = self
            .codec
            .mint(user_id, email, TokenKind::Access)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to mint access token");
                ApiError::Internal
            })?;
        let refresh = self
            .codec
            .mint(user_id, email, TokenKind::Refresh)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to mint refresh token");
                ApiError::Internal
            })?;

        let expires_at = OffsetDateTime::now_utc() + REFRESH_TOKEN_TTL;
        self.store
            .create_refresh_token(user_id, &refresh, expires_at)
            .await?;

        Ok(IssuedTokens { access, refresh })
    }

    /// Register a new password account
    pub async fn signup(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> ApiResult<AuthenticatedUser> {
        let email = email.to_lowercase();
        let password_hash = hash_password(password).map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ApiError::Internal
        })?;

        // No existence pre-check: the unique indexes are the arbiter, so two
        // concurrent signups cannot both succeed
        let user = self
            .store
            .create_user(NewUser {
                email,
                username: username.to_string(),
                password_hash: Some(password_hash),
                oauth: None,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    ApiError::Conflict("Email or username already exists".to_string())
                }
                other => other.into(),
            })?;

        tracing::info!(user_id = %user.id, "User signed up");
        let tokens = self.issue_tokens(user.id, &user.email).await?;
        Ok(AuthenticatedUser { user, tokens })
    }

    /// Password login
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<AuthenticatedUser> {
        let email = email.to_lowercase();
        let user = self.store.find_user_by_email(&email).await?.ok_or_else(|| {
            tracing::warn!(email = %email, "Login attempt for unknown email");
            ApiError::Unauthorized("Invalid email or password".to_string())
        })?;

        let Some(password_hash) = user.password_hash.as_deref() else {
            tracing::warn!(user_id = %user.id, "Password login on OAuth-only account");
            return Err(ApiError::Unauthorized(
                "Please use OAuth to sign in".to_string(),
            ));
        };

        let valid = verify_password(password, password_hash).map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Stored password hash is unreadable");
            ApiError::Internal
        })?;
        if !valid {
            tracing::warn!(user_id = %user.id, "Login with wrong password");
            return Err(ApiError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }

        tracing::info!(user_id = %user.id, "User logged in");
        let tokens = self.issue_tokens(user.id, &user.email).await?;
        Ok(AuthenticatedUser { user, tokens })
    }

    /// Log in (or register) via an OAuth provider profile
    pub async fn oauth_login(
        &self,
        provider: OAuthProvider,
        profile: OAuthProfile,
    ) -> ApiResult<AuthenticatedUser> {
        let email = profile.email.to_lowercase();

        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                self.create_oauth_user(provider, &profile, &email)
                    .await?
            }
        };

        // Linking is idempotent: repeat logins with the same identity leave
        // exactly one row
        self.store
            .link_oauth_identity(user.id, provider, &profile.provider_id)
            .await?;

        tracing::info!(user_id = %user.id, %provider, "OAuth login");
        let tokens = self.issue_tokens(user.id, &user.email).await?;
        Ok(AuthenticatedUser { user, tokens })
    }

    async fn create_oauth_user(
        &self,
        provider: OAuthProvider,
        profile: &OAuthProfile,
        email: &str,
    ) -> ApiResult<User> {
        for attempt in 0..USERNAME_ATTEMPTS {
            let username = generate_username(&profile.name, attempt);
            let result = self
                .store
                .create_user(NewUser {
                    email: email.to_string(),
                    username,
                    password_hash: None,
                    oauth: Some((provider, profile.provider_id.clone())),
                })
                .await;

            match result {
                Ok(user) => {
                    tracing::info!(user_id = %user.id, %provider, "OAuth account created");
                    return Ok(user);
                }
                // Another login for the same email won the race; use theirs
                Err(StoreError::Conflict("email")) => {
                    return self
                        .store
                        .find_user_by_email(email)
                        .await?
                        .ok_or(ApiError::Internal);
                }
                // Username taken, try again with a fresh suffix. Other
                // conflicts (a provider identity already linked elsewhere)
                // propagate as-is.
                Err(StoreError::Conflict("username")) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        tracing::error!(%provider, "Exhausted username generation attempts");
        Err(ApiError::Internal)
    }

    /// Rotate a refresh token: the presented token is consumed and a new
    /// pair is issued. Reuse of a consumed token always fails.
    pub async fn refresh(&self, token: &str) -> ApiResult<IssuedTokens> {
        let claims = self
            .codec
            .verify(token, TokenKind::Refresh)
            .map_err(|_| ApiError::Unauthorized("Invalid refresh token".to_string()))?;

        let owner = self
            .store
            .take_refresh_token(token)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid refresh token".to_string()))?;

        if owner != claims.sub {
            tracing::warn!(claimed = %claims.sub, stored = %owner, "Refresh token owner mismatch");
            return Err(ApiError::Unauthorized("Invalid refresh token".to_string()));
        }

        self.issue_tokens(claims.sub, &claims.email).await
    }

    /// Forget a refresh token. Idempotent: an absent or invalid token is
    /// not an error.
    pub async fn logout(&self, token: Option<&str>) -> ApiResult<()> {
        if let Some(token) = token {
            self.store.delete_refresh_token(token).await?;
        }
        Ok(())
    }

    /// Revoke every refresh token the user holds
    pub async fn logout_all(&self, user_id: Uuid) -> ApiResult<u64> {
        let revoked = self
            .store
            .delete_all_refresh_tokens_for_user(user_id)
            .await?;
        tracing::info!(user_id = %user_id, revoked, "Revoked all sessions");
        Ok(revoked)
    }

    /// Replace the user's stored encrypted API key
    pub async fn store_api_key(
        &self,
        user_id: Uuid,
        secret: &EncryptedSecret,
    ) -> ApiResult<()> {
        self.store
            .upsert_api_key(user_id, &secret.ciphertext, &secret.iv)
            .await?;
        Ok(())
    }

    pub async fn find_api_key(&self, user_id: Uuid) -> ApiResult<Option<EncryptedSecret>> {
        let record = self.store.find_api_key(user_id).await?;
        Ok(record.map(|r| EncryptedSecret {
            ciphertext: r.ciphertext,
            iv: r.iv,
        }))
    }

    /// Remove the stored key. Idempotent: removing an absent key is a
    /// success.
    pub async fn remove_api_key(&self, user_id: Uuid) -> ApiResult<()> {
        if self.store.delete_api_key(user_id).await? {
            tracing::info!(user_id = %user_id, "Removed stored API key");
        }
        Ok(())
    }
}

/// Derive a username from an OAuth display name: lowercase, whitespace
/// stripped, random numeric suffix. Later attempts draw from a wider range.
fn generate_username(name: &str, attempt: u32) -> String {
    let base: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let base = if base.is_empty() { "user".to_string() } else { base };

    let mut rng = rand::thread_rng();
    let suffix: u32 = if attempt == 0 {
        rng.gen_range(0..1000)
    } else {
        rng.gen_range(0..1_000_000)
    };
    format!("{base}{suffix}")
}
