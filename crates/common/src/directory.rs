//! The public directory of users and their public keys

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::{KeyError, PublicKey};
use crate::identity::Identity;
use crate::relay::{paths, RecordStore, RelayError, SubscriptionHandle};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("no directory entry for {0}")]
    UnknownUser(String),
    #[error("{0} has not published a public key")]
    NoPublicKey(String),
    #[error("{user} published an invalid public key: {source}")]
    InvalidPublicKey { user: String, source: KeyError },
    #[error("malformed directory entry for {user}: {source}")]
    Malformed {
        user: String,
        source: serde_json::Error,
    },
}

/// One user's entry under `users_public_data/{uid}`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicDirectoryEntry {
    /// Key of the entry, not stored as a field
    #[serde(skip)]
    pub user_id: String,
    #[serde(rename = "name", default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "profileImageUrl", default)]
    pub avatar_ref: String,
    /// Base64 SPKI DER
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl PublicDirectoryEntry {
    pub fn from_identity(identity: &Identity) -> Result<Self, KeyError> {
        let profile = identity.profile();
        Ok(Self {
            user_id: identity.user_id().to_string(),
            display_name: profile.display_name.clone(),
            email: profile.email.clone(),
            avatar_ref: profile.avatar_ref.clone(),
            public_key: Some(identity.public_key().to_base64()?),
        })
    }

    fn from_value(user_id: &str, value: Value) -> Result<Self, DirectoryError> {
        let mut entry: Self =
            serde_json::from_value(value).map_err(|source| DirectoryError::Malformed {
                user: user_id.to_string(),
                source,
            })?;
        entry.user_id = user_id.to_string();
        Ok(entry)
    }

    pub fn has_public_key(&self) -> bool {
        self.public_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    /// Decode the published key
    pub fn decode_public_key(&self) -> Result<PublicKey, DirectoryError> {
        let encoded = self
            .public_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| DirectoryError::NoPublicKey(self.user_id.clone()))?;
        PublicKey::from_base64(encoded).map_err(|source| DirectoryError::InvalidPublicKey {
            user: self.user_id.clone(),
            source,
        })
    }
}

fn parse_entries(directory: Option<Value>) -> Vec<PublicDirectoryEntry> {
    let Some(Value::Object(users)) = directory else {
        return Vec::new();
    };
    let mut entries: Vec<_> = users
        .into_iter()
        .filter_map(|(user_id, value)| {
            PublicDirectoryEntry::from_value(&user_id, value)
                .map_err(|e| tracing::warn!(%user_id, error = %e, "skipping malformed directory entry"))
                .ok()
        })
        .collect();
    entries.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    entries
}

/// Read and publish directory entries through a relay
#[derive(Debug, Clone)]
pub struct Directory<R> {
    relay: R,
}

impl<R: RecordStore> Directory<R> {
    pub fn new(relay: R) -> Self {
        Self { relay }
    }

    /// Publish the identity's profile and public key, replacing the entry
    pub async fn publish(&self, identity: &Identity) -> Result<PublicDirectoryEntry, DirectoryError> {
        let entry = PublicDirectoryEntry::from_identity(identity).map_err(|source| {
            DirectoryError::InvalidPublicKey {
                user: identity.user_id().to_string(),
                source,
            }
        })?;
        let value = serde_json::to_value(&entry).map_err(|source| DirectoryError::Malformed {
            user: entry.user_id.clone(),
            source,
        })?;
        self.relay
            .put(&paths::public_profile(identity.user_id()), value)
            .await?;
        tracing::info!(
            user_id = %identity.user_id(),
            fingerprint = %identity.public_key().fingerprint().unwrap_or_default(),
            "published public key"
        );
        Ok(entry)
    }

    pub async fn fetch(&self, user_id: &str) -> Result<PublicDirectoryEntry, DirectoryError> {
        match self.relay.get_once(&paths::public_profile(user_id)).await? {
            Some(value) => PublicDirectoryEntry::from_value(user_id, value),
            None => Err(DirectoryError::UnknownUser(user_id.to_string())),
        }
    }

    /// Fetch and decode a user's published key
    pub async fn fetch_public_key(&self, user_id: &str) -> Result<PublicKey, DirectoryError> {
        let encoded = self
            .relay
            .get_once(&paths::public_key(user_id))
            .await?
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| DirectoryError::NoPublicKey(user_id.to_string()))?;
        PublicKey::from_base64(&encoded).map_err(|source| DirectoryError::InvalidPublicKey {
            user: user_id.to_string(),
            source,
        })
    }

    /// Whether a user has a key others can share with
    pub async fn has_published(&self, user_id: &str) -> Result<bool, DirectoryError> {
        Ok(self
            .relay
            .get_once(&paths::public_key(user_id))
            .await?
            .and_then(|value| value.as_str().map(|key| !key.is_empty()))
            .unwrap_or(false))
    }

    /// All entries, sorted by display name
    pub async fn list(&self) -> Result<Vec<PublicDirectoryEntry>, DirectoryError> {
        Ok(parse_entries(
            self.relay.get_once(&paths::public_directory()).await?,
        ))
    }

    /// Live view of the directory. Yields the full list on every change.
    pub async fn watch(
        &self,
    ) -> Result<(SubscriptionHandle, BoxStream<'static, Vec<PublicDirectoryEntry>>), DirectoryError>
    {
        let subscription = self.relay.subscribe(&paths::public_directory()).await?;
        let handle = subscription.handle();
        let entries = subscription.into_stream().map(parse_entries).boxed();
        Ok((handle, entries))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identity::Profile;
    use crate::relay::MemoryRelay;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_and_fetch() {
        let relay = MemoryRelay::new();
        let directory = Directory::new(relay.clone());
        let bob = Identity::generate("bob", Profile::new("Bob", "bob@example.com"));

        assert!(!directory.has_published("bob").await.unwrap());
        directory.publish(&bob).await.unwrap();
        assert!(directory.has_published("bob").await.unwrap());

        let entry = directory.fetch("bob").await.unwrap();
        assert_eq!(entry.display_name, "Bob");
        assert_eq!(entry.decode_public_key().unwrap(), *bob.public_key());
        assert_eq!(
            directory.fetch_public_key("bob").await.unwrap(),
            *bob.public_key()
        );

        // stored under the relay's field names
        let stored = relay.get_once(&paths::public_profile("bob")).await.unwrap().unwrap();
        assert_eq!(stored["name"], json!("Bob"));
        assert_eq!(stored["profileImageUrl"], json!(""));
        assert!(stored["public_key"].is_string());
    }

    #[tokio::test]
    async fn test_missing_and_invalid_keys() {
        let relay = MemoryRelay::new();
        let directory = Directory::new(relay.clone());

        assert!(matches!(
            directory.fetch("nobody").await,
            Err(DirectoryError::UnknownUser(_))
        ));
        assert!(matches!(
            directory.fetch_public_key("nobody").await,
            Err(DirectoryError::NoPublicKey(_))
        ));

        relay
            .put(&paths::public_profile("carol"), json!({"name": "Carol", "public_key": "bm90IGEga2V5"}))
            .await
            .unwrap();
        assert!(matches!(
            directory.fetch_public_key("carol").await,
            Err(DirectoryError::InvalidPublicKey { .. })
        ));

        // signed up, never generated keys
        relay
            .put(&paths::public_profile("dave"), json!({"name": "Dave", "email": "d@example.com"}))
            .await
            .unwrap();
        assert!(!directory.has_published("dave").await.unwrap());
        assert!(!directory.fetch("dave").await.unwrap().has_public_key());
    }

    #[tokio::test]
    async fn test_list_and_watch() {
        let relay = MemoryRelay::new();
        let directory = Directory::new(relay.clone());
        let (handle, mut updates) = directory.watch().await.unwrap();
        assert!(updates.next().await.unwrap().is_empty());

        for (id, name) in [("u2", "bob"), ("u1", "Alice")] {
            let identity = Identity::generate(id, Profile::new(name, format!("{}@example.com", id)));
            directory.publish(&identity).await.unwrap();
        }

        let names: Vec<_> = directory
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.display_name)
            .collect();
        assert_eq!(names, vec!["Alice", "bob"]);

        let mut latest = updates.next().await.unwrap();
        while latest.len() < 2 {
            latest = updates.next().await.unwrap();
        }
        assert_eq!(latest[0].user_id, "u1");

        handle.cancel();
        assert!(updates.next().await.is_none());
    }
}
