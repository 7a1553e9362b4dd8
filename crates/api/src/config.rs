//! Application configuration

use std::env;

/// Deployment environment, controls cookie security attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub environment: Environment,
    pub frontend_url: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub encryption_key: String, // 32-byte key for stored API secret encryption

    // OAuth providers (empty client id disables the provider)
    pub google_client_id: String,
    pub google_client_secret: String,
    pub github_client_id: String,
    pub github_client_secret: String,

    // Feature flags
    pub enable_signup: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            environment: match env::var("ENVIRONMENT").as_deref() {
                Ok("production") => Environment::Production,
                _ => Environment::Development,
            },
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Authentication
            jwt_access_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                // Ensure JWT signing keys are cryptographically strong
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_refresh_secret: {
                let secret = env::var("JWT_REFRESH_SECRET")
                    .map_err(|_| ConfigError::Missing("JWT_REFRESH_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_REFRESH_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            // AES-256 key - generate with: openssl rand -base64 24 (then trim to 32 chars)
            encryption_key: {
                let key = env::var("ENCRYPTION_KEY")
                    .map_err(|_| ConfigError::Missing("ENCRYPTION_KEY"))?;

                // A wrong-length key must fail at startup, not at first use
                if key.len() != 32 {
                    return Err(ConfigError::InvalidEncryptionKey(
                        "ENCRYPTION_KEY must be exactly 32 bytes",
                    ));
                }

                key
            },

            // OAuth
            google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            github_client_id: env::var("GITHUB_CLIENT_ID").unwrap_or_default(),
            github_client_secret: env::var("GITHUB_CLIENT_SECRET").unwrap_or_default(),

            // Feature flags
            enable_signup: env::var("ENABLE_SIGNUP")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid encryption key: {0}")]
    InvalidEncryptionKey(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
