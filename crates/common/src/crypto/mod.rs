//! Cryptographic primitives for Vault
//!
//! - **Identity**: one P-256 key pair per user, stored locally by the `KeyStore`
//!   (PKCS#8 / SPKI DER files). The public half is published to the relay.
//! - **Key agreement**: ECDH over P-256, x-coordinate through HKDF-SHA256,
//!   giving a 32 byte key shared by a pair of users.
//! - **Encryption**: AES-256-GCM with a random 96 bit nonce per blob,
//!   transported as base64(nonce || ciphertext || tag).
//! - **Signatures**: randomized ECDSA P-256/SHA-256 over the plaintext.
//! - **Integrity**: HMAC-SHA256 tags for symmetric-key channels.
//!
//! # Share Protocol
//!
//! Alice sharing a file with Bob:
//! 1. Derive (or load the cached) key for the pair (Alice, Bob)
//! 2. Sign the plaintext with Alice's private key
//! 3. Encrypt the plaintext with the pairwise key
//! 4. Upload the blob, then record the signature and Alice's public key
//!
//! Bob derives the same pairwise key from his private key and Alice's
//!  public key, decrypts, and verifies the signature over what he recovered.
//!
//! There is no forward secrecy: the pairwise key is static until either
//!  party regenerates their identity.

mod cipher;
mod exchange;
mod integrity;
mod key_store;
mod keys;
mod signer;

pub use cipher::{
    decrypt, encrypt, CipherError, EncryptedBlob, SharedKey, NONCE_SIZE, SHARED_KEY_SIZE,
    TAG_SIZE,
};
pub use exchange::{
    derive_shared_key, derive_shared_key_base64, derive_with_public_key, KeyExchangeError,
};
pub use integrity::{
    compute_file_tag, compute_tag, integrity_key, verify_file_tag, verify_tag, IntegrityError,
    TAG_SIZE as HMAC_TAG_SIZE,
};
pub use key_store::{KeyStore, KeyStoreError, PRIVATE_KEY_FILE_NAME, PUBLIC_KEY_FILE_NAME};
pub use keys::{IdentityKeyPair, KeyError, PrivateKey, PublicKey, FINGERPRINT_SIZE};
pub use signer::{sign, verify, verify_encoded, FileSignature, SignatureError};
