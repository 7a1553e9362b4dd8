//! Encrypted AniList API key routes
//!
//! The submitted key is encrypted before it touches the database and only
//! decrypted transiently while serving a request.

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthUser, EncryptedSecret, SecretCipher};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn default_store_permanently() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreKeyRequest {
    pub api_key: String,
    #[serde(default = "default_store_permanently")]
    pub store_permanently: bool,
}

#[derive(Debug, Serialize)]
pub struct KeyStatusResponse {
    pub configured: bool,
    /// Last four characters of the key, for the settings page
    pub key_preview: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Decrypt a stored key for this request only. A blob that no longer
/// decrypts is a fault of the stored material, not of the caller.
fn decrypt_stored_key(
    cipher: &SecretCipher,
    secret: &EncryptedSecret,
    user_id: Uuid,
) -> ApiResult<String> {
    cipher.decrypt(secret).map_err(|e| {
        tracing::error!(user_id = %user_id, error = %e, "Stored API key is undecryptable");
        ApiError::Upstream("Stored API key could not be decrypted".to_string())
    })
}

/// POST /api/anilist/key
pub async fn store_key(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<StoreKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    let api_key = req.api_key.trim();
    if api_key.is_empty() {
        return Err(ApiError::Validation("API key is required".to_string()));
    }

    let encrypted = state.cipher.encrypt(api_key);
    state.sessions.store_api_key(user.user_id, &encrypted).await?;

    tracing::info!(
        user_id = %user.user_id,
        permanent = req.store_permanently,
        "Stored encrypted API key"
    );
    Ok(Json(MessageResponse {
        message: "API key stored successfully".to_string(),
    }))
}

/// GET /api/anilist/key
pub async fn key_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<KeyStatusResponse>> {
    let Some(secret) = state.sessions.find_api_key(user.user_id).await? else {
        return Ok(Json(KeyStatusResponse {
            configured: false,
            key_preview: None,
        }));
    };

    let plaintext = decrypt_stored_key(&state.cipher, &secret, user.user_id)?;

    let preview = plaintext
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<String>();
    Ok(Json(KeyStatusResponse {
        configured: true,
        key_preview: Some(format!("\u{2022}\u{2022}\u{2022}\u{2022}{preview}")),
    }))
}

/// DELETE /api/anilist/key
///
/// Idempotent: deleting a key that was never stored is still a success.
pub async fn remove_key(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    state.sessions.remove_api_key(user.user_id).await?;

    Ok(Json(MessageResponse {
        message: "API key removed".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undecryptable_key_is_an_upstream_fault() {
        let cipher =
            SecretCipher::new("0123456789abcdef0123456789abcdef").expect("Failed to create cipher");
        let secret = EncryptedSecret {
            ciphertext: "!!not base64!!".to_string(),
            iv: "00".repeat(16),
        };

        let result = decrypt_stored_key(&cipher, &secret, Uuid::new_v4());
        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }

    #[test]
    fn test_intact_key_decrypts_for_the_request() {
        let cipher =
            SecretCipher::new("0123456789abcdef0123456789abcdef").expect("Failed to create cipher");
        let secret = cipher.encrypt("anilist-api-key-12345");

        let plaintext =
            decrypt_stored_key(&cipher, &secret, Uuid::new_v4()).expect("Failed to decrypt");
        assert_eq!(plaintext, "anilist-api-key-12345");
    }
}
