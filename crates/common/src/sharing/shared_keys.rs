use crate::crypto::{derive_with_public_key, KeyExchangeError, PublicKey, SharedKey};
use crate::directory::{Directory, DirectoryError};
use crate::identity::Identity;
use crate::records::SharedKeyRecord;
use crate::relay::{paths, RecordPath, RecordStore};

use super::error::SharingErrorKind;

/// Where a resolved pairwise key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Read back from the owner's cache on the relay
    Cached,
    /// Freshly derived by ECDH against the directory key and written to the cache
    Derived,
    /// Derived against a key the directory does not vouch for. Never cached.
    Unverified,
}

#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub key: SharedKey,
    pub source: KeySource,
}

impl ResolvedKey {
    /// Whether the counterparty key behind this pairwise key is bound to
    ///  the counterparty's user id
    pub fn is_vouched(&self) -> bool {
        self.source != KeySource::Unverified
    }
}

fn fingerprint(key: &PublicKey) -> Result<String, SharingErrorKind> {
    key.fingerprint()
        .map_err(|_| KeyExchangeError::InvalidPublicKey.into())
}

async fn load_cached<R: RecordStore>(
    relay: &R,
    path: &RecordPath,
    counterparty_id: &str,
    owner_fingerprint: &str,
    counterparty_fingerprint: Option<&str>,
) -> Result<Option<SharedKey>, SharingErrorKind> {
    let Some(value) = relay.get_once(path).await? else {
        return Ok(None);
    };
    match SharedKeyRecord::from_value(value) {
        Ok(record) if record.matches(owner_fingerprint, counterparty_fingerprint) => {
            match SharedKey::from_base64(&record.shared_key) {
                Ok(key) => {
                    tracing::debug!(%counterparty_id, "using cached shared key");
                    return Ok(Some(key));
                }
                Err(e) => {
                    tracing::warn!(%counterparty_id, error = %e, "cached shared key is undecodable")
                }
            }
        }
        Ok(_) => tracing::warn!(
            %counterparty_id,
            "cached shared key was derived from other keys"
        ),
        Err(e) => {
            tracing::warn!(%counterparty_id, error = %e, "cached shared key record is malformed")
        }
    }
    Ok(None)
}

/// Derive against a directory-published key and cache the result
async fn derive_and_cache<R: RecordStore>(
    relay: &R,
    path: &RecordPath,
    identity: &Identity,
    counterparty_id: &str,
    owner_fingerprint: String,
    published: &PublicKey,
) -> Result<ResolvedKey, SharingErrorKind> {
    let key = derive_with_public_key(identity.private_key(), published)?;

    let record = SharedKeyRecord::new(&key, owner_fingerprint, fingerprint(published)?);
    let persisted = match record.to_value() {
        Ok(value) => relay.put(path, value).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    // the key is correct either way; the next share simply derives again
    if let Err(error) = persisted {
        tracing::warn!(%counterparty_id, %error, "failed to cache shared key");
    }

    tracing::info!(%counterparty_id, "derived shared key");
    Ok(ResolvedKey {
        key,
        source: KeySource::Derived,
    })
}

/// Load the pairwise key for sending to `counterparty_id`, deriving it from
///  the directory and caching it when there is no usable cached copy.
///
/// A cached key is only used if it was derived from the current identity
///  key and, with `verify_counterparty_epoch`, from the counterparty's
///  currently published key too.
pub(crate) async fn resolve<R: RecordStore>(
    relay: &R,
    directory: &Directory<R>,
    identity: &Identity,
    counterparty_id: &str,
    verify_counterparty_epoch: bool,
) -> Result<ResolvedKey, SharingErrorKind> {
    let path = paths::shared_key(identity.user_id(), counterparty_id);
    let owner_fingerprint = fingerprint(identity.public_key())?;

    let published = if verify_counterparty_epoch {
        Some(directory.fetch_public_key(counterparty_id).await?)
    } else {
        None
    };
    let published_fingerprint = published.as_ref().map(fingerprint).transpose()?;

    if let Some(key) = load_cached(
        relay,
        &path,
        counterparty_id,
        &owner_fingerprint,
        published_fingerprint.as_deref(),
    )
    .await?
    {
        return Ok(ResolvedKey {
            key,
            source: KeySource::Cached,
        });
    }

    let published = match published {
        Some(key) => key,
        None => directory.fetch_public_key(counterparty_id).await?,
    };
    derive_and_cache(relay, &path, identity, counterparty_id, owner_fingerprint, &published).await
}

/// Load the pairwise key for a file from `author_id` that claims to be
///  sealed against `author_key`.
///
/// The cache is used only if it was derived from `author_key`. Otherwise
///  the key is derived and cached only when `author_key` is the author's
///  published key. Any other key yields an `Unverified` pairwise key that
///  never touches the cache.
pub(crate) async fn resolve_incoming<R: RecordStore>(
    relay: &R,
    directory: &Directory<R>,
    identity: &Identity,
    author_id: &str,
    author_key: &PublicKey,
) -> Result<ResolvedKey, SharingErrorKind> {
    let path = paths::shared_key(identity.user_id(), author_id);
    let owner_fingerprint = fingerprint(identity.public_key())?;
    let author_fingerprint = fingerprint(author_key)?;

    if let Some(key) = load_cached(
        relay,
        &path,
        author_id,
        &owner_fingerprint,
        Some(&author_fingerprint),
    )
    .await?
    {
        return Ok(ResolvedKey {
            key,
            source: KeySource::Cached,
        });
    }

    let published = match directory.fetch_public_key(author_id).await {
        Ok(key) => Some(key),
        Err(DirectoryError::Relay(e)) => return Err(e.into()),
        Err(e) => {
            tracing::warn!(%author_id, error = %e, "author has no usable published key");
            None
        }
    };

    if published.as_ref() == Some(author_key) {
        return derive_and_cache(relay, &path, identity, author_id, owner_fingerprint, author_key)
            .await;
    }

    tracing::warn!(
        %author_id,
        %author_fingerprint,
        "author key is neither cached nor published for this author"
    );
    Ok(ResolvedKey {
        key: derive_with_public_key(identity.private_key(), author_key)?,
        source: KeySource::Unverified,
    })
}
