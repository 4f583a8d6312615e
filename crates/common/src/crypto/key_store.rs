//! Local persistence of the identity key pair
//!
//! Two files live in the store directory:
//! - `private_key.der`: raw PKCS#8 DER
//! - `public_key.der`: raw SPKI DER
//!
//! Neither file is ever sent over the network as-is; the public key is
//!  base64 encoded before it is published to the relay.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::keys::{IdentityKeyPair, KeyError, PrivateKey, PublicKey};

pub const PRIVATE_KEY_FILE_NAME: &str = "private_key.der";
pub const PUBLIC_KEY_FILE_NAME: &str = "public_key.der";

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("no identity key pair found in {0}")]
    NotFound(PathBuf),
    #[error("key pair generation failed: {0}")]
    GenerationFailed(String),
    #[error("stored key material is corrupt: {0}")]
    Corrupt(#[from] KeyError),
    #[error("key store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One lock per key directory, shared by every store opened on it
fn directory_guard(dir: &Path) -> Arc<Mutex<()>> {
    static GUARDS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    GUARDS
        .get_or_init(Default::default)
        .lock()
        .entry(normalize(dir))
        .or_default()
        .clone()
}

/// Canonical form of `dir`, which may not exist yet
fn normalize(dir: &Path) -> PathBuf {
    if let Ok(path) = fs::canonicalize(dir) {
        return path;
    }
    match (dir.parent(), dir.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| dir.to_path_buf()),
        _ => dir.to_path_buf(),
    }
}

/// File-backed store for exactly one identity key pair
///
/// Generation and loading are serialized by a mutex shared by every store
///  opened on the same directory in this process, so a reader never
///  observes a half-written pair.
///
/// `generate_identity` always overwrites existing material. Callers must
///  check `exists` first: regenerating invalidates every pairwise shared key
///  derived with the previous pair.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
    guard: Arc<Mutex<()>>,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            guard: directory_guard(&dir),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE_NAME)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_KEY_FILE_NAME)
    }

    /// Whether a key pair has been generated
    pub fn exists(&self) -> bool {
        let _lock = self.guard.lock();
        self.private_key_path().exists() && self.public_key_path().exists()
    }

    /// Generate a new key pair and persist it, replacing any existing one
    pub fn generate_identity(&self) -> Result<IdentityKeyPair, KeyStoreError> {
        let _lock = self.guard.lock();

        let pair = IdentityKeyPair::generate();
        let private_der = pair
            .private()
            .to_pkcs8_der()
            .map_err(|e| KeyStoreError::GenerationFailed(e.to_string()))?;
        let public_der = pair
            .public()
            .to_spki_der()
            .map_err(|e| KeyStoreError::GenerationFailed(e.to_string()))?;

        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.private_key_path(), private_der.as_bytes(), true)?;
        write_atomic(&self.public_key_path(), &public_der, false)?;

        let fingerprint = pair.public().fingerprint().unwrap_or_default();
        tracing::info!(dir = ?self.dir, %fingerprint, "generated identity key pair");
        Ok(pair)
    }

    /// Load the private key
    pub fn load_private_key(&self) -> Result<PrivateKey, KeyStoreError> {
        let _lock = self.guard.lock();
        let bytes = self.read(&self.private_key_path())?;
        Ok(PrivateKey::from_pkcs8_der(&bytes)?)
    }

    /// Load the raw SPKI DER encoding of the public key
    pub fn load_public_key(&self) -> Result<Vec<u8>, KeyStoreError> {
        let _lock = self.guard.lock();
        let bytes = self.read(&self.public_key_path())?;
        // reject garbage early rather than publishing it
        PublicKey::from_spki_der(&bytes)?;
        Ok(bytes)
    }

    /// Load both halves, checking that the public file matches the private key
    pub fn load_identity(&self) -> Result<IdentityKeyPair, KeyStoreError> {
        let _lock = self.guard.lock();
        let private_bytes = self.read(&self.private_key_path())?;
        let public_bytes = self.read(&self.public_key_path())?;

        let pair = IdentityKeyPair::from(PrivateKey::from_pkcs8_der(&private_bytes)?);
        let stored_public = PublicKey::from_spki_der(&public_bytes)?;
        if stored_public != *pair.public() {
            return Err(KeyError::InvalidPublicKey(
                "public key file does not match private key".to_string(),
            )
            .into());
        }
        Ok(pair)
    }

    /// The public key as base64(SPKI DER), ready to publish
    pub fn public_key_base64(&self) -> Result<String, KeyStoreError> {
        let bytes = self.load_public_key()?;
        Ok(PublicKey::from_spki_der(&bytes)?.to_base64()?)
    }

    /// Copy the public key out of the store, as raw DER or PEM
    pub fn export_public_key(&self, dest: &Path, as_pem: bool) -> Result<(), KeyStoreError> {
        let bytes = self.load_public_key()?;
        if as_pem {
            let pem = PublicKey::from_spki_der(&bytes)?.to_pem()?;
            fs::write(dest, pem)?;
        } else {
            fs::write(dest, bytes)?;
        }
        Ok(())
    }

    /// Destroy the local key material. Returns whether anything was removed.
    pub fn reset(&self) -> Result<bool, KeyStoreError> {
        let _lock = self.guard.lock();
        let mut removed = false;
        for path in [self.private_key_path(), self.public_key_path()] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed {
            tracing::warn!(dir = ?self.dir, "identity key pair destroyed");
        }
        Ok(removed)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, KeyStoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(KeyStoreError::NotFound(self.dir.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Write to a sibling temp file and rename over the target
fn write_atomic(path: &Path, bytes: &[u8], private: bool) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = private;
    fs::rename(&tmp, path)
}
