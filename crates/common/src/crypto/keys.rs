use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use p256::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, SecretDocument,
};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

/// Number of SHA-256 bytes kept in a public key fingerprint
pub const FINGERPRINT_SIZE: usize = 16;
/// PEM tag used when exporting a public key
pub const PUBLIC_KEY_PEM_TAG: &str = "PUBLIC KEY";

/// Errors that can occur while encoding or decoding key material
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid private key encoding: {0}")]
    InvalidPrivateKey(String),
    #[error("invalid public key encoding: {0}")]
    InvalidPublicKey(String),
    #[error("key encoding failed: {0}")]
    Encoding(String),
}

/// Public half of a P-256 identity
///
/// The canonical encoding is X.509 SubjectPublicKeyInfo (SPKI) DER. The relay
/// only ever sees it base64 encoded, both in the public directory and in the
/// `authorPublicKey` field of shared file records.
///
/// # Examples
///
/// ```ignore
/// let identity = IdentityKeyPair::generate();
/// let encoded = identity.public().to_base64()?;
/// let decoded = PublicKey::from_base64(&encoded)?;
/// assert_eq!(identity.public(), &decoded);
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(p256::PublicKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fingerprint() {
            Ok(fp) => write!(f, "PublicKey({})", fp),
            Err(_) => write!(f, "PublicKey(<unencodable>)"),
        }
    }
}

impl From<p256::PublicKey> for PublicKey {
    fn from(key: p256::PublicKey) -> Self {
        PublicKey(key)
    }
}

impl PublicKey {
    /// Parse a public key from SPKI DER bytes
    pub fn from_spki_der(bytes: &[u8]) -> Result<Self, KeyError> {
        p256::PublicKey::from_public_key_der(bytes)
            .map(PublicKey)
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
    }

    /// Parse a public key from a SEC1 encoded point (compressed or not)
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        p256::PublicKey::from_sec1_bytes(bytes)
            .map(PublicKey)
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
    }

    /// Parse a public key from its raw transport bytes.
    ///
    /// SPKI DER is what we publish; a bare SEC1 point is accepted
    ///  as a fallback for keys copied out of other tooling.
    pub fn decode(bytes: &[u8]) -> Result<Self, KeyError> {
        Self::from_spki_der(bytes).or_else(|_| Self::from_sec1_bytes(bytes))
    }

    /// Parse a public key from a base64 string holding SPKI (or SEC1) bytes
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::InvalidPublicKey(format!("base64: {}", e)))?;
        Self::decode(&bytes)
    }

    /// Encode as SPKI DER
    pub fn to_spki_der(&self) -> Result<Vec<u8>, KeyError> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| KeyError::Encoding(e.to_string()))
    }

    /// Encode as base64(SPKI DER), the form published to the relay
    pub fn to_base64(&self) -> Result<String, KeyError> {
        Ok(STANDARD.encode(self.to_spki_der()?))
    }

    /// Encode as a PEM document with tag "PUBLIC KEY"
    pub fn to_pem(&self) -> Result<String, KeyError> {
        let pem = pem::Pem::new(PUBLIC_KEY_PEM_TAG, self.to_spki_der()?);
        Ok(pem::encode(&pem))
    }

    /// Short, stable identifier for this key: hex of the first
    ///  `FINGERPRINT_SIZE` bytes of SHA-256 over the SPKI encoding.
    pub fn fingerprint(&self) -> Result<String, KeyError> {
        let digest = Sha256::digest(self.to_spki_der()?);
        Ok(hex::encode(&digest[..FINGERPRINT_SIZE]))
    }

    pub(crate) fn inner(&self) -> &p256::PublicKey {
        &self.0
    }
}

/// Private half of a P-256 identity
///
/// Never leaves local storage. Persisted as raw PKCS#8 DER by the `KeyStore`.
#[derive(Clone)]
pub struct PrivateKey(p256::SecretKey);

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl PrivateKey {
    /// Generate a new random private key using the OS CSPRNG
    pub fn generate() -> Self {
        PrivateKey(p256::SecretKey::random(&mut OsRng))
    }

    /// Parse a private key from PKCS#8 DER bytes
    pub fn from_pkcs8_der(bytes: &[u8]) -> Result<Self, KeyError> {
        p256::SecretKey::from_pkcs8_der(bytes)
            .map(PrivateKey)
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))
    }

    /// Encode as PKCS#8 DER. The returned document is zeroized on drop.
    pub fn to_pkcs8_der(&self) -> Result<SecretDocument, KeyError> {
        self.0
            .to_pkcs8_der()
            .map_err(|e| KeyError::Encoding(e.to_string()))
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    pub(crate) fn inner(&self) -> &p256::SecretKey {
        &self.0
    }
}

/// A local identity key pair
///
/// Created once per installation; the public half is published to the
///  relay directory, the private half is only ever read locally.
#[derive(Clone, Debug)]
pub struct IdentityKeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl From<PrivateKey> for IdentityKeyPair {
    fn from(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }
}

impl IdentityKeyPair {
    /// Generate a fresh key pair
    pub fn generate() -> Self {
        PrivateKey::generate().into()
    }

    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }
}
