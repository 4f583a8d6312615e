//! ECDSA (P-256, SHA-256) signatures over file content
//!
//! Signatures are computed over the plaintext before encryption and checked
//!  over the plaintext recovered after decryption. They prove who wrote the
//!  content, independently of who was able to decrypt it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use p256::ecdsa::{
    signature::{RandomizedSigner, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use rand_core::OsRng;

use super::keys::{PrivateKey, PublicKey};

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("public key encoding is invalid")]
    InvalidKeyEncoding,
}

/// A DER encoded ECDSA signature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSignature(Vec<u8>);

impl From<Vec<u8>> for FileSignature {
    fn from(bytes: Vec<u8>) -> Self {
        FileSignature(bytes)
    }
}

impl FileSignature {
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded.trim()).map(FileSignature)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Sign `data` with a randomized ECDSA signature.
///
/// Two signatures over the same data are not expected to be byte-identical.
pub fn sign(private_key: &PrivateKey, data: &[u8]) -> FileSignature {
    let signing_key = SigningKey::from(private_key.inner());
    let signature: Signature = signing_key.sign_with_rng(&mut OsRng, data);
    FileSignature(signature.to_der().as_bytes().to_vec())
}

/// Returns true iff `signature` is a valid DER signature by `public_key`
///  over exactly `data`. Malformed signatures simply fail to verify.
pub fn verify(public_key: &PublicKey, data: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = Signature::from_der(signature) else {
        return false;
    };
    VerifyingKey::from(public_key.inner())
        .verify(data, &signature)
        .is_ok()
}

/// Verify using the base64 forms stored in a shared file record.
///
/// # Errors
///
/// Only an undecodable public key is an error; every other problem,
///  including a garbled signature, is reported as `Ok(false)`.
pub fn verify_encoded(
    public_key: &str,
    data: &[u8],
    signature: &str,
) -> Result<bool, SignatureError> {
    let public_key =
        PublicKey::from_base64(public_key).map_err(|_| SignatureError::InvalidKeyEncoding)?;
    let Ok(signature) = FileSignature::from_base64(signature) else {
        return Ok(false);
    };
    Ok(verify(&public_key, data, signature.as_bytes()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::keys::IdentityKeyPair;

    #[test]
    fn test_sign_and_verify() {
        let pair = IdentityKeyPair::generate();
        let message = b"hello, world!";

        let signature = sign(pair.private(), message);
        assert!(verify(pair.public(), message, signature.as_bytes()));

        // wrong message
        assert!(!verify(pair.public(), b"hello, world?", signature.as_bytes()));

        // wrong key
        let other = IdentityKeyPair::generate();
        assert!(!verify(other.public(), message, signature.as_bytes()));
    }

    #[test]
    fn test_signature_over_other_data() {
        let pair = IdentityKeyPair::generate();
        let signature = sign(pair.private(), b"other data");
        assert!(!verify(pair.public(), b"data", signature.as_bytes()));
    }

    #[test]
    fn test_empty_and_large_payloads() {
        let pair = IdentityKeyPair::generate();
        for data in [Vec::new(), vec![7u8; 1 << 20]] {
            let signature = sign(pair.private(), &data);
            assert!(verify(pair.public(), &data, signature.as_bytes()));
        }
    }

    #[test]
    fn test_malformed_signature_is_false() {
        let pair = IdentityKeyPair::generate();
        assert!(!verify(pair.public(), b"data", b""));
        assert!(!verify(pair.public(), b"data", b"not der"));

        let mut signature = sign(pair.private(), b"data").as_bytes().to_vec();
        let last = signature.len() - 1;
        signature[last] ^= 0x01;
        assert!(!verify(pair.public(), b"data", &signature));
    }

    #[test]
    fn test_verify_encoded() {
        let pair = IdentityKeyPair::generate();
        let public = pair.public().to_base64().unwrap();
        let signature = sign(pair.private(), b"data").to_base64();

        assert!(verify_encoded(&public, b"data", &signature).unwrap());
        assert!(!verify_encoded(&public, b"tampered", &signature).unwrap());
        assert!(!verify_encoded(&public, b"data", "%%%").unwrap());
        assert!(matches!(
            verify_encoded("not a key", b"data", &signature),
            Err(SignatureError::InvalidKeyEncoding)
        ));
    }

    #[test]
    fn test_signatures_are_der() {
        let pair = IdentityKeyPair::generate();
        let signature = sign(pair.private(), b"data");
        // DER SEQUENCE, at most 72 bytes for P-256
        assert_eq!(signature.as_bytes()[0], 0x30);
        assert!(signature.as_bytes().len() <= 72);
    }
}
