//! Credential vault — AES-256-GCM seal/open for relay passwords.
//!
//! Sealed format: base64(nonce ‖ ciphertext ‖ tag) with a fresh 96-bit
//! random nonce per seal and GCM's 128-bit authentication tag. Decryption
//! fails closed on any tamper or truncation.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::SecretString;

use crate::error::VaultError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Authenticated-encryption vault for account credentials.
///
/// The engine never holds plaintext secrets except transiently: `open`
/// returns a [`SecretString`] that is zeroized on drop.
pub struct Vault {
    cipher: Aes256Gcm,
}

impl Vault {
    /// Create a vault from raw 32-byte key material.
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        if key.len() != KEY_LEN {
            return Err(VaultError::InvalidKeyLength(key.len()));
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::Crypto)?;
        Ok(Self { cipher })
    }

    /// Create a vault from a base64-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, VaultError> {
        let key = BASE64.decode(encoded.trim().as_bytes())?;
        Self::new(&key)
    }

    /// Encrypt a secret for storage.
    pub fn seal(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Crypto)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a stored secret. Fails closed on tag mismatch.
    pub fn open(&self, sealed: &str) -> Result<SecretString, VaultError> {
        let blob = BASE64.decode(sealed.as_bytes())?;
        if blob.len() <= NONCE_LEN {
            return Err(VaultError::Crypto);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::Crypto)?;
        let secret = String::from_utf8(plaintext).map_err(|_| VaultError::Crypto)?;
        Ok(SecretString::from(secret))
    }
}
