//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::{
    CipherError, OAuthClient, PgCredentialStore, SecretCipher, SessionManager, TokenCodec,
};
use crate::config::Config;

/// Session manager specialized to the Postgres-backed store
pub type Sessions = SessionManager<PgCredentialStore>;

/// Shared application state, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub store: Arc<PgCredentialStore>,
    pub codec: Arc<TokenCodec>,
    pub cipher: Arc<SecretCipher>,
    pub oauth: Arc<OAuthClient>,
    pub sessions: Arc<Sessions>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Result<Self, CipherError> {
        let codec = TokenCodec::new(&config.jwt_access_secret, &config.jwt_refresh_secret);
        // Key length was validated at config load; this re-checks before any
        // crypto happens
        let cipher = SecretCipher::new(&config.encryption_key)?;
        let oauth = OAuthClient::new(&config);
        let store = Arc::new(PgCredentialStore::new(pool.clone()));
        let sessions = Arc::new(SessionManager::new(store.clone(), codec.clone()));

        Ok(Self {
            pool,
            config: Arc::new(config),
            store,
            codec: Arc::new(codec),
            cipher: Arc::new(cipher),
            oauth: Arc::new(oauth),
            sessions,
        })
    }
}
