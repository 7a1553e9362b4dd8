//! Password hashing and verification

use bcrypt::{hash, verify};

/// bcrypt cost factor
///
/// Stored hashes were produced at cost 12; changing this only affects newly
/// created accounts.
pub const BCRYPT_COST: u32 = 12;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}

/// Hash a password with bcrypt
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash(password, BCRYPT_COST).map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hashed: &str) -> Result<bool, PasswordError> {
    verify(password, hashed).map_err(|e| PasswordError::InvalidHash(e.to_string()))
}
