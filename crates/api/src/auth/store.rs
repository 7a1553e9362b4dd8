//! Credential persistence
//!
//! The [`CredentialStore`] trait is the seam between the session layer and
//! the database: session logic is written against the trait, the Postgres
//! implementation lives here, and tests supply an in-memory store.

use animuse_shared::{ApiKeyRecord, OAuthIdentity, OAuthProvider, RefreshTokenRecord, User};
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated; the payload names the field
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Input for user creation
///
/// `oauth` carries the identity to link in the same transaction, so a new
/// account always lands with either a password hash or a linked identity.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Must already be lowercased
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub oauth: Option<(OAuthProvider, String)>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    // Users
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    // OAuth identities
    async fn list_oauth_identities(&self, user_id: Uuid) -> Result<Vec<OAuthIdentity>, StoreError>;
    /// Linking the same (provider, provider_id) to the same user twice is a
    /// no-op
    async fn link_oauth_identity(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> Result<(), StoreError>;

    // Refresh tokens
    async fn create_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;
    /// Expired rows are treated as absent
    async fn find_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;
    /// Atomically claim and remove a live refresh token, returning its owner.
    /// At most one of any number of concurrent callers gets `Some`.
    async fn take_refresh_token(&self, token: &str) -> Result<Option<Uuid>, StoreError>;
    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError>;
    async fn delete_all_refresh_tokens_for_user(&self, user_id: Uuid)
        -> Result<u64, StoreError>;
    async fn delete_expired_refresh_tokens(&self) -> Result<u64, StoreError>;

    // Encrypted API keys
    async fn upsert_api_key(
        &self,
        user_id: Uuid,
        ciphertext: &str,
        iv: &str,
    ) -> Result<(), StoreError>;
    async fn find_api_key(&self, user_id: Uuid) -> Result<Option<ApiKeyRecord>, StoreError>;
    async fn delete_api_key(&self, user_id: Uuid) -> Result<bool, StoreError>;
}

/// Postgres-backed credential store
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a unique violation onto the field it protects
fn conflict_field(err: &sqlx::Error) -> Option<&'static str> {
    let db_err = err.as_database_error()?;
    if db_err.code().as_deref() != Some("23505") {
        return None;
    }
    match db_err.constraint() {
        Some("users_email_key") => Some("email"),
        Some("users_username_key") => Some("username"),
        Some("user_oauth_identities_provider_provider_id_key") => Some("identity"),
        _ => Some("resource"),
    }
}

fn map_conflict(err: sqlx::Error) -> StoreError {
    match conflict_field(&err) {
        Some(field) => StoreError::Conflict(field),
        None => StoreError::Database(err),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, username, password_hash, created_at, updated_at
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, username, password_hash, created_at, updated_at
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (email, username, password_hash)
             VALUES ($1, $2, $3)
             RETURNING id, email, username, password_hash, created_at, updated_at",
        )
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_conflict)?;

        if let Some((provider, provider_id)) = &new_user.oauth {
            sqlx::query(
                "INSERT INTO user_oauth_identities (user_id, provider, provider_id)
                 VALUES ($1, $2, $3)",
            )
            .bind(user.id)
            .bind(provider.as_str())
            .bind(provider_id)
            .execute(&mut *tx)
            .await
            .map_err(map_conflict)?;
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn list_oauth_identities(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OAuthIdentity>, StoreError> {
        let identities = sqlx::query_as::<_, OAuthIdentity>(
            "SELECT user_id, provider, provider_id, created_at
             FROM user_oauth_identities
             WHERE user_id = $1
             ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(identities)
    }

    async fn link_oauth_identity(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_oauth_identities (user_id, provider, provider_id)
             VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, expires_at)
             VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, token, expires_at, created_at
             FROM refresh_tokens
             WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn take_refresh_token(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        // Single-statement claim: of two concurrent callers, exactly one
        // sees the row
        let user_id: Option<(Uuid,)> = sqlx::query_as(
            "DELETE FROM refresh_tokens
             WHERE token = $1 AND expires_at > NOW()
             RETURNING user_id",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id.map(|(id,)| id))
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_refresh_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_refresh_tokens(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_api_key(
        &self,
        user_id: Uuid,
        ciphertext: &str,
        iv: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO api_keys (user_id, ciphertext, iv)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id) DO UPDATE
             SET ciphertext = EXCLUDED.ciphertext,
                 iv = EXCLUDED.iv,
                 updated_at = NOW()",
        )
        .bind(user_id)
        .bind(ciphertext)
        .bind(iv)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_api_key(&self, user_id: Uuid) -> Result<Option<ApiKeyRecord>, StoreError> {
        let record = sqlx::query_as::<_, ApiKeyRecord>(
            "SELECT user_id, ciphertext, iv, created_at, updated_at
             FROM api_keys WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete_api_key(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    async fn test_store() -> PgCredentialStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = animuse_shared::db::create_pool(&url, 3)
            .await
            .expect("Failed to create pool");
        PgCredentialStore::new(pool)
    }

    fn unique_suffix() -> String {
        Uuid::new_v4().simple().to_string()
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_user_uniqueness() {
        let store = test_store().await;
        let suffix = unique_suffix();

        let user = store
            .create_user(NewUser {
                email: format!("dup-{suffix}@example.com"),
                username: format!("dup-{suffix}"),
                password_hash: Some("$2b$12$fakehash".to_string()),
                oauth: None,
            })
            .await
            .expect("Failed to create user");

        let result = store
            .create_user(NewUser {
                email: user.email.clone(),
                username: format!("other-{suffix}"),
                password_hash: Some("$2b$12$fakehash".to_string()),
                oauth: None,
            })
            .await;
        assert!(matches!(result, Err(StoreError::Conflict("email"))));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_duplicate_oauth_identity_is_conflict() {
        let store = test_store().await;
        let suffix = unique_suffix();
        let provider_id = format!("gh-{suffix}");

        store
            .create_user(NewUser {
                email: format!("id1-{suffix}@example.com"),
                username: format!("id1-{suffix}"),
                password_hash: None,
                oauth: Some((OAuthProvider::Github, provider_id.clone())),
            })
            .await
            .expect("Failed to create user");

        // The identity insert inside the transaction surfaces as a Conflict
        // too, not a bare database error
        let result = store
            .create_user(NewUser {
                email: format!("id2-{suffix}@example.com"),
                username: format!("id2-{suffix}"),
                password_hash: None,
                oauth: Some((OAuthProvider::Github, provider_id)),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Conflict("identity"))));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_take_refresh_token_is_single_use() {
        let store = test_store().await;
        let suffix = unique_suffix();

        let user = store
            .create_user(NewUser {
                email: format!("rot-{suffix}@example.com"),
                username: format!("rot-{suffix}"),
                password_hash: Some("$2b$12$fakehash".to_string()),
                oauth: None,
            })
            .await
            .expect("Failed to create user");

        let token = format!("refresh-{suffix}");
        let expires = OffsetDateTime::now_utc() + Duration::days(7);
        store
            .create_refresh_token(user.id, &token, expires)
            .await
            .expect("Failed to store token");

        assert_eq!(
            store.take_refresh_token(&token).await.expect("take"),
            Some(user.id)
        );
        assert_eq!(store.take_refresh_token(&token).await.expect("take"), None);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_expired_tokens_are_absent() {
        let store = test_store().await;
        let suffix = unique_suffix();

        let user = store
            .create_user(NewUser {
                email: format!("exp-{suffix}@example.com"),
                username: format!("exp-{suffix}"),
                password_hash: Some("$2b$12$fakehash".to_string()),
                oauth: None,
            })
            .await
            .expect("Failed to create user");

        let token = format!("expired-{suffix}");
        let expires = OffsetDateTime::now_utc() - Duration::minutes(1);
        store
            .create_refresh_token(user.id, &token, expires)
            .await
            .expect("Failed to store token");

        assert!(store
            .find_refresh_token(&token)
            .await
            .expect("find")
            .is_none());
        assert_eq!(store.take_refresh_token(&token).await.expect("take"), None);
        assert!(store.delete_expired_refresh_tokens().await.expect("sweep") >= 1);
    }
}
