//! Authentication and credential lifecycle

pub mod cipher;
pub mod extract;
pub mod jwt;
pub mod oauth;
pub mod password;
pub mod sessions;
pub mod store;

pub use cipher::{CipherError, EncryptedSecret, SecretCipher};
pub use extract::AuthUser;
pub use jwt::{Claims, TokenCodec, TokenError, TokenKind};
pub use oauth::{OAuthClient, OAuthProfile};
pub use sessions::{AuthenticatedUser, IssuedTokens, SessionManager};
pub use store::{CredentialStore, NewUser, PgCredentialStore, StoreError};

/// Cookie carrying the short-lived access token
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
/// Cookie carrying the rotating refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";
