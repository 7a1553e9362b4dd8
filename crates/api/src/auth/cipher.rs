//! At-rest encryption for user-supplied API secrets
//!
//! AES-256-CBC with PKCS#7 padding. Every encryption draws a fresh random
//! 16-byte IV; the IV is stored beside the ciphertext and is not itself
//! secret, but reusing one across records is never valid.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Key size in bytes (256 bits)
const KEY_SIZE: usize = 32;
/// IV size in bytes (the AES block size)
const IV_SIZE: usize = 16;

/// An encrypted secret as it is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    /// Base64-encoded ciphertext
    pub ciphertext: String,
    /// Hex-encoded initialization vector
    pub iv: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption key must be exactly {KEY_SIZE} bytes")]
    InvalidKey,
    // Deliberately unspecific: callers never learn which stage failed
    #[error("Decryption failed")]
    Decryption,
}

/// Symmetric cipher over a single long-lived key
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; KEY_SIZE],
}

impl SecretCipher {
    /// Create a cipher from the configured key, which must be exactly
    /// 32 bytes
    pub fn new(key: &str) -> Result<Self, CipherError> {
        let bytes = key.as_bytes();
        if bytes.len() != KEY_SIZE {
            return Err(CipherError::InvalidKey);
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Encrypt a plaintext secret under a fresh random IV
    pub fn encrypt(&self, plaintext: &str) -> EncryptedSecret {
        let mut iv = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        EncryptedSecret {
            ciphertext: BASE64.encode(ciphertext),
            iv: hex::encode(iv),
        }
    }

    /// Decrypt a stored secret
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, CipherError> {
        let ciphertext = BASE64
            .decode(&secret.ciphertext)
            .map_err(|_| CipherError::Decryption)?;
        let iv_bytes = hex::decode(&secret.iv).map_err(|_| CipherError::Decryption)?;
        if iv_bytes.len() != IV_SIZE {
            return Err(CipherError::Decryption);
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&iv_bytes);

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CipherError::Decryption)?;

        // Empty output means the stored blob was not produced by this key
        if plaintext.is_empty() {
            return Err(CipherError::Decryption);
        }
        String::from_utf8(plaintext).map_err(|_| CipherError::Decryption)
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}
