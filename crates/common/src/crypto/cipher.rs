//! File content encryption using AES-256-GCM
//!
//! Wire format of an encrypted blob:
//!
//! ```text
//! base64( nonce (12 bytes) || ciphertext || tag (16 bytes) )
//! ```
//!
//! A fresh random nonce is drawn for every call to `encrypt`. The pairwise
//!  key is static per user pair, so nonce reuse would break both
//!  confidentiality and authentication of everything shared between them.

use std::fmt;
use std::ops::Deref;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;
/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;
/// Size of an AES-256 key in bytes
pub const SHARED_KEY_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// Wrong key, corrupted or tampered ciphertext. Never retried.
    #[error("authentication failed: wrong key or tampered ciphertext")]
    AuthenticationFailed,
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

/// A 256-bit pairwise key shared by two users
///
/// Produced by ECDH + HKDF (see `exchange`) and cached in the relay so the
///  derivation only runs the first time two users interact.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; SHARED_KEY_SIZE]);

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

impl Deref for SharedKey {
    type Target = [u8; SHARED_KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SHARED_KEY_SIZE]> for SharedKey {
    fn from(bytes: [u8; SHARED_KEY_SIZE]) -> Self {
        SharedKey(bytes)
    }
}

impl SharedKey {
    /// Create a key from a byte slice
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the slice is not exactly `SHARED_KEY_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, CipherError> {
        let bytes: [u8; SHARED_KEY_SIZE] = data.try_into().map_err(|_| {
            CipherError::MalformedInput(format!(
                "invalid key size, expected {}, got {}",
                SHARED_KEY_SIZE,
                data.len()
            ))
        })?;
        Ok(bytes.into())
    }

    /// Parse the base64 form stored in the relay's `shared_key` field
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CipherError::MalformedInput(format!("base64: {}", e)))?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Encrypt `plaintext` under this key. See [`encrypt`].
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob, CipherError> {
        encrypt(self, plaintext)
    }

    /// Decrypt a blob produced by [`SharedKey::encrypt`]. See [`decrypt`].
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>, CipherError> {
        decrypt(self, blob.as_bytes())
    }
}

/// Base64 text of `nonce || ciphertext || tag`, the payload handed to the relay
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    /// Wrap bytes downloaded from the relay
    ///
    /// Only checks that the payload is text; the base64 body and the
    ///  ciphertext are validated by `decrypt`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        std::str::from_utf8(bytes)
            .map(|s| EncryptedBlob(s.to_string()))
            .map_err(|_| CipherError::MalformedInput("blob is not base64 text".to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }

    /// The nonce this blob was sealed with
    pub fn nonce(&self) -> Result<[u8; NONCE_SIZE], CipherError> {
        let raw = decode_raw(self.as_bytes())?;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&raw[..NONCE_SIZE]);
        Ok(nonce)
    }
}

/// Encrypt with AES-256-GCM under a fresh random nonce
///
/// # Errors
///
/// Returns `MalformedInput` only if the system RNG fails or the
///  plaintext exceeds the AES-GCM length limit.
pub fn encrypt(key: &SharedKey, plaintext: &[u8]) -> Result<EncryptedBlob, CipherError> {
    let cipher = Aes256Gcm::new(&Key::<Aes256Gcm>::from(key.0));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce_bytes)
        .map_err(|e| CipherError::MalformedInput(format!("failed to generate nonce: {}", e)))?;
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CipherError::MalformedInput("plaintext too large".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(nonce.as_ref());
    out.extend_from_slice(&ciphertext);

    Ok(EncryptedBlob(STANDARD.encode(out)))
}

/// Decrypt and authenticate a base64 encoded blob
///
/// # Errors
///
/// - `MalformedInput` if the payload is not base64 or is too short to hold
///   a nonce and a tag
/// - `AuthenticationFailed` if the tag does not verify. No plaintext is
///   returned in that case.
pub fn decrypt(key: &SharedKey, encoded: &[u8]) -> Result<Vec<u8>, CipherError> {
    let raw = decode_raw(encoded)?;
    let (nonce_bytes, sealed) = raw.split_at(NONCE_SIZE);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(&Key::<Aes256Gcm>::from(key.0));
    cipher
        .decrypt(&Nonce::from(nonce), sealed)
        .map_err(|_| CipherError::AuthenticationFailed)
}

fn decode_raw(encoded: &[u8]) -> Result<Vec<u8>, CipherError> {
    let trimmed = std::str::from_utf8(encoded)
        .map_err(|_| CipherError::MalformedInput("blob is not base64 text".to_string()))?
        .trim();
    let raw = STANDARD
        .decode(trimmed)
        .map_err(|e| CipherError::MalformedInput(format!("base64: {}", e)))?;
    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::MalformedInput(format!(
            "blob too short: {} bytes, need at least {}",
            raw.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }
    Ok(raw)
}
