//! JWT token generation and validation

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Access token lifetime
pub const ACCESS_TOKEN_TTL: Duration = Duration::minutes(15);
/// Refresh token lifetime
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(7);

/// JWT claims structure for AniMuse-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Email
    pub email: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// Token kind (access or refresh)
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn ttl(self) -> Duration {
        match self {
            TokenKind::Access => ACCESS_TOKEN_TTL,
            TokenKind::Refresh => REFRESH_TOKEN_TTL,
        }
    }

    fn other(self) -> Self {
        match self {
            TokenKind::Access => TokenKind::Refresh,
            TokenKind::Refresh => TokenKind::Access,
        }
    }
}

/// Token codec for minting and verifying the two token kinds
///
/// Access and refresh tokens are signed with separate secrets, so a token of
/// one kind can never pass verification as the other even if the embedded
/// `kind` claim were forged.
#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenCodec {
    /// Create a new token codec from the two signing secrets
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
        }
    }

    fn encoding_key(&self, kind: TokenKind) -> &EncodingKey {
        match kind {
            TokenKind::Access => &self.access_encoding,
            TokenKind::Refresh => &self.refresh_encoding,
        }
    }

    fn decoding_key(&self, kind: TokenKind) -> &DecodingKey {
        match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        }
    }

    /// Mint a token of the given kind for a user
    pub fn mint(&self, user_id: Uuid, email: &str, kind: TokenKind) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + kind.ttl();

        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            kind,
        };

        // Explicit algorithm prevents algorithm confusion attacks
        encode(&Header::new(Algorithm::HS256), &claims, self.encoding_key(kind))
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Validate and decode a token, requiring the expected kind
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        match decode::<Claims>(token, self.decoding_key(expected), &validation) {
            Ok(data) => {
                // The embedded claim is authoritative even when both kinds
                // happen to share a secret
                if data.claims.kind != expected {
                    return Err(TokenError::WrongKind);
                }
                Ok(data.claims)
            }
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(TokenError::Expired),
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    // A valid token of the other kind is a kind mismatch,
                    // anything else is a forgery
                    let other = expected.other();
                    match decode::<Claims>(token, self.decoding_key(other), &validation) {
                        Ok(data) if data.claims.kind == other => Err(TokenError::WrongKind),
                        _ => Err(TokenError::Invalid),
                    }
                }
                _ => Err(TokenError::Invalid),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Wrong token kind")]
    WrongKind,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}
