//! Common types used across AniMuse

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// OAuth providers
// =============================================================================

/// Supported OAuth identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }

    /// Parse a provider from a path segment or stored column value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "google" => Some(OAuthProvider::Google),
            "github" => Some(OAuthProvider::Github),
            _ => None,
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Persisted records
// =============================================================================

/// Account record
///
/// `password_hash` is absent for OAuth-only accounts. Every user has either a
/// password hash or at least one row in `user_oauth_identities`; creation
/// paths guarantee this.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercase
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Whether this account can sign in with a password at all
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// A third-party identity linked to a user
///
/// `provider` is stored as text; use [`OAuthProvider::parse`] at the
/// boundary.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OAuthIdentity {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A registered (unexpired, unused) refresh token
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// Encrypted third-party API secret, one per user
///
/// `ciphertext` is base64, `iv` is hex. Decryption happens transiently per
/// request; plaintext is never stored or cached.
#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyRecord {
    pub user_id: Uuid,
    pub ciphertext: String,
    pub iv: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_roundtrip() {
        assert_eq!(OAuthProvider::parse("google"), Some(OAuthProvider::Google));
        assert_eq!(OAuthProvider::parse("github"), Some(OAuthProvider::Github));
        assert_eq!(OAuthProvider::parse("gitlab"), None);
        assert_eq!(OAuthProvider::Google.as_str(), "google");
    }
}
