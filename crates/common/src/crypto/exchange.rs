//! Pairwise key agreement: ECDH over P-256 followed by HKDF-SHA256
//!
//! 1. Decode the counterparty's public key (base64 SPKI on the wire)
//! 2. Multiply it by our private scalar; keep the x-coordinate
//! 3. HKDF-SHA256 (no salt, no info) expands it to a 32 byte AES key
//!
//! Both sides arrive at the same key, which is what lets the recipient
//!  decrypt without the sender ever transmitting key material.

use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::cipher::{SharedKey, SHARED_KEY_SIZE};
use super::keys::{PrivateKey, PublicKey};

#[derive(Debug, thiserror::Error)]
pub enum KeyExchangeError {
    #[error("counterparty public key is not a valid P-256 point")]
    InvalidPublicKey,
    #[error("key agreement produced a degenerate shared secret")]
    AgreementFailed,
}

/// Derive the pairwise key from our private key and the counterparty's
///  raw public key bytes (SPKI DER, or a SEC1 point).
///
/// `derive_shared_key(a.private, b.public) == derive_shared_key(b.private, a.public)`
pub fn derive_shared_key(
    my_private_key: &PrivateKey,
    counterparty_public_key: &[u8],
) -> Result<SharedKey, KeyExchangeError> {
    let counterparty =
        PublicKey::decode(counterparty_public_key).map_err(|_| KeyExchangeError::InvalidPublicKey)?;
    derive_with_public_key(my_private_key, &counterparty)
}

/// Same as [`derive_shared_key`] for a key taken straight from a relay
///  record, i.e. base64 text.
pub fn derive_shared_key_base64(
    my_private_key: &PrivateKey,
    counterparty_public_key: &str,
) -> Result<SharedKey, KeyExchangeError> {
    let counterparty = PublicKey::from_base64(counterparty_public_key)
        .map_err(|_| KeyExchangeError::InvalidPublicKey)?;
    derive_with_public_key(my_private_key, &counterparty)
}

/// Derive the pairwise key from an already decoded public key
pub fn derive_with_public_key(
    my_private_key: &PrivateKey,
    counterparty: &PublicKey,
) -> Result<SharedKey, KeyExchangeError> {
    let shared = p256::ecdh::diffie_hellman(
        my_private_key.inner().to_nonzero_scalar(),
        counterparty.inner().as_affine(),
    );
    let x = shared.raw_secret_bytes();

    // reject an all-zero shared x-coordinate
    if bool::from(x.as_slice().ct_eq(&[0u8; SHARED_KEY_SIZE])) {
        return Err(KeyExchangeError::AgreementFailed);
    }

    let hk = Hkdf::<Sha256>::new(None, x.as_slice());
    let mut okm = [0u8; SHARED_KEY_SIZE];
    hk.expand(&[], &mut okm)
        .map_err(|_| KeyExchangeError::AgreementFailed)?;
    Ok(SharedKey::from(okm))
}
