//! HMAC-SHA256 integrity tags
//!
//! For channels where a shared symmetric key, rather than a signature,
//!  is the trust anchor.

use std::path::Path;

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::cipher::{SharedKey, SHARED_KEY_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// Size of an HMAC-SHA256 tag in bytes
pub const TAG_SIZE: usize = 32;

/// HKDF info used to split an integrity key off a pairwise key, so the
///  AES-GCM key is never reused as a MAC key
const INTEGRITY_KEY_INFO: &[u8] = b"vault:file-integrity:v1";

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("invalid HMAC key")]
    InvalidKey,
    #[error("integrity i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compute HMAC-SHA256 of `data` under `key`
pub fn compute_tag(key: &[u8], data: &[u8]) -> Result<[u8; TAG_SIZE], IntegrityError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| IntegrityError::InvalidKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Check `tag` against HMAC-SHA256 of `data` under `key`.
///
/// The comparison is constant time.
pub fn verify_tag(tag: &[u8], key: &[u8], data: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

/// Compute a tag over the contents of a file
pub async fn compute_file_tag(key: &[u8], path: &Path) -> Result<[u8; TAG_SIZE], IntegrityError> {
    let data = tokio::fs::read(path).await?;
    compute_tag(key, &data)
}

/// Verify a tag over the contents of a file
pub async fn verify_file_tag(tag: &[u8], key: &[u8], path: &Path) -> Result<bool, IntegrityError> {
    let data = tokio::fs::read(path).await?;
    Ok(verify_tag(tag, key, &data))
}

/// Derive the MAC key attached to shares between a pair of users
pub fn integrity_key(shared_key: &SharedKey) -> Result<[u8; SHARED_KEY_SIZE], IntegrityError> {
    let hk = Hkdf::<Sha256>::new(None, shared_key.bytes());
    let mut okm = [0u8; SHARED_KEY_SIZE];
    hk.expand(INTEGRITY_KEY_INFO, &mut okm)
        .map_err(|_| IntegrityError::InvalidKey)?;
    Ok(okm)
}
