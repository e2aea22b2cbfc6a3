//! Envelope encryption for parish gateway secret keys.
//!
//! A per-parish data encryption key (DEK) is derived from the master key with
//! HKDF, then the secret is sealed with AES-256-GCM.
//!
//! Format of encrypted data: MAGIC (4 bytes) || nonce (12 bytes) || ciphertext

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use secrecy::SecretString;
use sha2::Sha256;

use crate::error::{AppError, Result};

/// Nonce size for AES-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Master key size (256 bits for AES-256)
const MASTER_KEY_SIZE: usize = 32;

/// Magic bytes to identify encrypted data
const ENCRYPTED_MAGIC: &[u8] = b"ENC1";

/// Holds the master encryption key. Parish DEKs are derived from it.
#[derive(Clone)]
pub struct MasterKey {
    key: [u8; MASTER_KEY_SIZE],
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

impl MasterKey {
    /// Create a MasterKey from a base64-encoded string.
    /// The decoded key must be exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::Internal(format!("Invalid master key encoding: {}", e)))?;

        if decoded.len() != MASTER_KEY_SIZE {
            return Err(AppError::Internal(format!(
                "Master key must be {} bytes, got {}",
                MASTER_KEY_SIZE,
                decoded.len()
            )));
        }

        let mut key = [0u8; MASTER_KEY_SIZE];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }

    /// Generate a new random master key, base64-encoded.
    pub fn generate() -> String {
        use rand::RngCore;
        use rand::rngs::OsRng;
        let mut key = [0u8; MASTER_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Create a MasterKey from raw bytes.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Returns true if the blob carries the encryption magic header.
    pub fn is_encrypted(data: &[u8]) -> bool {
        data.len() > ENCRYPTED_MAGIC.len() + NONCE_SIZE && data.starts_with(ENCRYPTED_MAGIC)
    }

    fn derive_dek(&self, parish_id: &str) -> Result<[u8; 32]> {
        let hk = Hkdf::<Sha256>::new(Some(b"parish-donations-v1"), &self.key);
        let mut dek = [0u8; 32];
        hk.expand(parish_id.as_bytes(), &mut dek)
            .map_err(|e| AppError::Internal(format!("Key derivation failed: {}", e)))?;
        Ok(dek)
    }

    /// Encrypt a parish's gateway secret key for storage.
    pub fn encrypt_secret(&self, parish_id: &str, secret: &str) -> Result<Vec<u8>> {
        use rand::RngCore;
        use rand::rngs::OsRng;

        let dek = self.derive_dek(parish_id)?;
        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, secret.as_bytes())
            .map_err(|e| AppError::Internal(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(ENCRYPTED_MAGIC.len() + NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(ENCRYPTED_MAGIC);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt a parish's gateway secret key. The DEK is bound to `parish_id`,
    /// so a blob copied onto another parish row fails to open.
    pub fn decrypt_secret(&self, parish_id: &str, encrypted: &[u8]) -> Result<SecretString> {
        if !Self::is_encrypted(encrypted) {
            return Err(AppError::Internal(
                "Invalid encrypted data format (missing magic bytes)".into(),
            ));
        }

        let dek = self.derive_dek(parish_id)?;
        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        let nonce_start = ENCRYPTED_MAGIC.len();
        let nonce_end = nonce_start + NONCE_SIZE;
        let nonce = Nonce::from_slice(&encrypted[nonce_start..nonce_end]);
        let ciphertext = &encrypted[nonce_end..];

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| AppError::Internal(format!("Decryption failed: {}", e)))?;

        let secret = String::from_utf8(plaintext)
            .map_err(|_| AppError::Internal("Decrypted secret is not valid UTF-8".into()))?;

        Ok(SecretString::from(secret))
    }
}
