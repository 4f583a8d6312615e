use serde::{Deserialize, Serialize};

use crate::crypto::{IdentityKeyPair, KeyStore, KeyStoreError, PrivateKey, PublicKey};

/// Public profile details published next to the key in the directory
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_ref: String,
}

impl Profile {
    pub fn new(display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            email: email.into(),
            avatar_ref: String::new(),
        }
    }
}

/// The local user: an authenticated user id plus the loaded key pair
///
/// Passed explicitly to everything that needs to sign, derive or publish,
///  so several identities can live in one process (tests run Alice, Bob
///  and Eve side by side).
#[derive(Clone, Debug)]
pub struct Identity {
    user_id: String,
    profile: Profile,
    keys: IdentityKeyPair,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, profile: Profile, keys: IdentityKeyPair) -> Self {
        Self {
            user_id: user_id.into(),
            profile,
            keys,
        }
    }

    /// An identity with freshly generated, unpersisted keys
    pub fn generate(user_id: impl Into<String>, profile: Profile) -> Self {
        Self::new(user_id, profile, IdentityKeyPair::generate())
    }

    /// Load the key pair for `user_id` from a key store
    pub fn load(
        user_id: impl Into<String>,
        profile: Profile,
        store: &KeyStore,
    ) -> Result<Self, KeyStoreError> {
        Ok(Self::new(user_id, profile, store.load_identity()?))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn display_name(&self) -> &str {
        &self.profile.display_name
    }

    pub fn keys(&self) -> &IdentityKeyPair {
        &self.keys
    }

    pub fn private_key(&self) -> &PrivateKey {
        self.keys.private()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public()
    }
}
