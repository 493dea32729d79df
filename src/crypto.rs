//! Token encryption module using AES-256-GCM
//!
//! Encrypts access tokens, refresh tokens, and integration client secrets
//! before they touch the database. Ciphertexts carry a version byte so legacy
//! plaintext rows keep working, and AAD binds each ciphertext to the row that
//! owns it.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::platforms::Platform;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// How many leading characters `mask_secret` leaves visible.
const MASK_VISIBLE_CHARS: usize = 6;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// AAD for a connection row's token fields.
///
/// Keyed on the owning (user, platform) pair, which is stable across upserts.
pub fn connection_aad(user_id: Uuid, platform: Platform) -> String {
    format!("{}|{}", user_id, platform)
}

/// AAD for an integration settings row's client secret.
pub fn settings_aad(platform: Platform) -> String {
    format!("integration_settings|{}", platform)
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    // Fresh random nonce for every encryption
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Wire format: version byte, nonce, then ciphertext+tag
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
///
/// Payloads without the version marker are legacy plaintext and are returned
/// unchanged.
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED {
        return Ok(ciphertext.to_vec());
    }

    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let body = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(body.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(nonce, Payload { msg: body, aad })
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload is using the encrypted format
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

/// Encrypt a single token string under the given AAD.
pub fn encrypt_token(key: &CryptoKey, aad: &str, token: &str) -> Result<Vec<u8>, CryptoError> {
    encrypt_bytes(key, aad.as_bytes(), token.as_bytes())
}

/// Decrypt a single token field, tolerating legacy plaintext payloads.
pub fn decrypt_token(key: &CryptoKey, aad: &str, ciphertext: &[u8]) -> Result<String, CryptoError> {
    if is_encrypted_payload(ciphertext) {
        let bytes = decrypt_bytes(key, aad.as_bytes(), ciphertext)?;
        String::from_utf8(bytes)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
    } else {
        String::from_utf8(ciphertext.to_vec())
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
    }
}

/// Type alias for encrypted token-pair result
type EncryptedTokens = Result<(Option<Vec<u8>>, Option<Vec<u8>>), CryptoError>;

/// Encrypt an access/refresh token pair under one AAD.
pub fn encrypt_token_pair(
    key: &CryptoKey,
    aad: &str,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> EncryptedTokens {
    let access = access_token
        .map(|token| encrypt_token(key, aad, token))
        .transpose()?;
    let refresh = refresh_token
        .map(|token| encrypt_token(key, aad, token))
        .transpose()?;
    Ok((access, refresh))
}

/// Type alias for decrypted token-pair result
type DecryptedTokens = Result<(Option<String>, Option<String>), CryptoError>;

/// Decrypt an access/refresh token pair under one AAD.
pub fn decrypt_token_pair(
    key: &CryptoKey,
    aad: &str,
    access_ciphertext: Option<&[u8]>,
    refresh_ciphertext: Option<&[u8]>,
) -> DecryptedTokens {
    let access = access_ciphertext
        .map(|ct| decrypt_token(key, aad, ct))
        .transpose()?;
    let refresh = refresh_ciphertext
        .map(|ct| decrypt_token(key, aad, ct))
        .transpose()?;
    Ok((access, refresh))
}

/// Display form of a secret for admin UIs: first few characters, then an
/// ellipsis. Short secrets are masked entirely.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= MASK_VISIBLE_CHARS {
        return "*".repeat(MASK_VISIBLE_CHARS);
    }
    let prefix: String = secret.chars().take(MASK_VISIBLE_CHARS).collect();
    format!("{}...", prefix)
}
