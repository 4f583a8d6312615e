use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use url::Url;
use uuid::Uuid;

use super::paths::BLOB_PREFIX;
use super::provider::{BlobRef, BlobStore, RecordPath, RecordStore, RelayError};
use super::subscription::Subscription;
use super::tree;

/// File holding the record tree inside the relay directory
pub const RECORDS_FILE_NAME: &str = "records.json";

/// A relay backed by a shared directory
///
/// Records live in a single JSON document, blobs as files under `files/`.
///  Several processes may point at the same directory (e.g. a synced
///  folder); every read goes back to disk, and writes replace the record
///  document atomically. Concurrent writers from different processes can
///  still lose each other's updates.
///
/// ```text
/// <root>/
/// ├── records.json
/// └── files/
///     └── 5f0c...e1
/// ```
#[derive(Debug, Clone)]
pub struct FsRelay {
    inner: Arc<FsRelayInner>,
}

#[derive(Debug)]
struct FsRelayInner {
    root: PathBuf,
    tree: watch::Sender<Value>,
    write_lock: Mutex<()>,
}

fn io_error(context: &Path, err: io::Error) -> RelayError {
    let context = context.display();
    match err.kind() {
        io::ErrorKind::NotFound => RelayError::NotFound(context.to_string()),
        io::ErrorKind::PermissionDenied => RelayError::Unauthorized(context.to_string()),
        _ => RelayError::Network(format!("{}: {}", context, err)),
    }
}

impl FsRelay {
    /// Open (creating if needed) a relay directory
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, RelayError> {
        let root = root.as_ref();
        let blobs = root.join(BLOB_PREFIX);
        tokio::fs::create_dir_all(&blobs)
            .await
            .map_err(|e| io_error(&blobs, e))?;
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| io_error(root, e))?;

        let tree = read_tree(&root).await?;
        let (tree, _) = watch::channel(tree);

        tracing::debug!(root = %root.display(), "opened fs relay");
        Ok(Self {
            inner: Arc::new(FsRelayInner {
                root,
                tree,
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Open a relay and re-read the record document every `interval`, so
    ///  subscriptions see writes made by other processes
    pub async fn open_with_polling(
        root: impl AsRef<Path>,
        interval: Duration,
    ) -> Result<Self, RelayError> {
        let relay = Self::open(root).await?;
        spawn_poller(Arc::downgrade(&relay.inner), interval);
        Ok(relay)
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn blob_path(&self, id: &Uuid) -> PathBuf {
        self.inner.root.join(BLOB_PREFIX).join(id.to_string())
    }
}

impl FsRelayInner {
    /// Re-read the record document and publish it if it changed
    async fn refresh(&self) -> Result<Value, RelayError> {
        let fresh = read_tree(&self.root).await?;
        let snapshot = fresh.clone();
        self.tree.send_if_modified(|current| {
            if *current == fresh {
                return false;
            }
            *current = fresh;
            true
        });
        Ok(snapshot)
    }

    async fn write(&self, tree: Value) -> Result<(), RelayError> {
        let path = self.root.join(RECORDS_FILE_NAME);
        let tmp = self
            .root
            .join(format!(".{}.{}", RECORDS_FILE_NAME, Uuid::new_v4()));
        let data =
            serde_json::to_vec_pretty(&tree).map_err(|e| RelayError::Network(e.to_string()))?;
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;
        self.tree.send_replace(tree);
        Ok(())
    }
}

async fn read_tree(root: &Path) -> Result<Value, RelayError> {
    let path = root.join(RECORDS_FILE_NAME);
    match tokio::fs::read(&path).await {
        Ok(data) => serde_json::from_slice(&data).map_err(|e| {
            RelayError::Network(format!("unreadable record document {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(json!({})),
        Err(e) => Err(io_error(&path, e)),
    }
}

fn spawn_poller(inner: Weak<FsRelayInner>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if let Err(e) = inner.refresh().await {
                tracing::debug!(error = %e, "fs relay refresh failed");
            }
        }
    });
}

#[async_trait]
impl RecordStore for FsRelay {
    async fn put(&self, path: &RecordPath, value: Value) -> Result<(), RelayError> {
        let _guard = self.inner.write_lock.lock().await;
        let mut tree = self.inner.refresh().await?;
        tree::set(&mut tree, path, value);
        self.inner.write(tree).await
    }

    async fn create(&self, path: &RecordPath, value: Value) -> Result<(), RelayError> {
        let _guard = self.inner.write_lock.lock().await;
        let mut tree = self.inner.refresh().await?;
        if tree::get(&tree, path).is_some() {
            return Err(RelayError::Conflict(path.to_string()));
        }
        tree::set(&mut tree, path, value);
        self.inner.write(tree).await
    }

    async fn get_once(&self, path: &RecordPath) -> Result<Option<Value>, RelayError> {
        let tree = self.inner.refresh().await?;
        Ok(tree::get(&tree, path).cloned())
    }

    async fn subscribe(&self, path: &RecordPath) -> Result<Subscription, RelayError> {
        self.inner.refresh().await?;
        Ok(Subscription::new(path.clone(), self.inner.tree.subscribe()))
    }
}

#[async_trait]
impl BlobStore for FsRelay {
    async fn upload(&self, id: Uuid, data: Bytes) -> Result<BlobRef, RelayError> {
        let path = self.blob_path(&id);
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        let url = Url::from_file_path(&path)
            .map_err(|_| RelayError::Network(format!("not a file url: {}", path.display())))?;
        Ok(BlobRef::new(url))
    }

    async fn download(&self, blob: &BlobRef) -> Result<Bytes, RelayError> {
        let id = blob
            .blob_id()
            .ok_or_else(|| RelayError::NotFound(blob.to_string()))?;
        let requested = blob
            .url()
            .to_file_path()
            .map_err(|_| RelayError::NotFound(blob.to_string()))?;
        let path = self.blob_path(&id);
        if requested != path {
            return Err(RelayError::Unauthorized(format!(
                "{} is outside the relay",
                blob
            )));
        }

        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| io_error(&path, e))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_records_persist_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = RecordPath::root().child("users_public_data/bob/name");

        let relay = FsRelay::open(dir.path()).await.unwrap();
        relay.put(&path, json!("Bob")).await.unwrap();

        let reopened = FsRelay::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get_once(&path).await.unwrap(), Some(json!("Bob")));
        assert!(dir.path().join(RECORDS_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_writes_from_other_handles_are_visible() {
        let dir = tempfile::tempdir().unwrap();
        let first = FsRelay::open(dir.path()).await.unwrap();
        let second = FsRelay::open(dir.path()).await.unwrap();

        let path = RecordPath::root().child("a");
        second.create(&path, json!(1)).await.unwrap();
        assert_eq!(first.get_once(&path).await.unwrap(), Some(json!(1)));
        assert!(matches!(
            first.create(&path, json!(2)).await,
            Err(RelayError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_blobs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let relay = FsRelay::open(dir.path()).await.unwrap();
        let id = Uuid::new_v4();

        let blob = relay
            .upload(id, Bytes::from_static(b"ciphertext"))
            .await
            .unwrap();
        assert_eq!(blob.url().scheme(), "file");
        assert_eq!(blob.blob_id(), Some(id));
        assert_eq!(
            relay.download(&blob).await.unwrap(),
            Bytes::from_static(b"ciphertext")
        );

        let missing = BlobRef::new(Url::from_file_path(relay.blob_path(&Uuid::new_v4())).unwrap());
        assert!(matches!(
            relay.download(&missing).await,
            Err(RelayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_blobs_outside_relay() {
        let dir = tempfile::tempdir().unwrap();
        let relay = FsRelay::open(dir.path().join("relay")).await.unwrap();

        let outside = dir.path().join(Uuid::new_v4().to_string());
        tokio::fs::write(&outside, b"secret").await.unwrap();
        let blob = BlobRef::new(Url::from_file_path(&outside).unwrap());

        assert!(matches!(
            relay.download(&blob).await,
            Err(RelayError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_polling_subscription_sees_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = FsRelay::open_with_polling(dir.path(), Duration::from_millis(20))
            .await
            .unwrap();
        let writer = FsRelay::open(dir.path()).await.unwrap();

        let path = RecordPath::root().child("inbox");
        let mut subscription = watcher.subscribe(&path).await.unwrap();
        assert_eq!(subscription.next().await, Some(None));

        writer.put(&path.child("f1"), json!("x")).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap();
        assert_eq!(next, Some(Some(json!({"f1": "x"}))));
    }
}
