use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::watch;
use url::Url;
use uuid::Uuid;

use super::paths::BLOB_PREFIX;
use super::provider::{BlobRef, BlobStore, RecordPath, RecordStore, RelayError};
use super::subscription::Subscription;
use super::tree;

const MEMORY_BLOB_BASE: &str = "memory://relay/";

/// Relay operations, for targeting injected faults and delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    Create,
    GetOnce,
    Subscribe,
    Upload,
    Download,
}

/// An error the relay will return instead of performing an operation
#[derive(Debug, Clone)]
pub struct Fault {
    operation: Operation,
    prefix: Option<RecordPath>,
    error: RelayError,
    /// `None` fails forever
    remaining: Option<usize>,
}

impl Fault {
    /// Fail the next matching operation once
    pub fn new(operation: Operation, error: RelayError) -> Self {
        Self {
            operation,
            prefix: None,
            error,
            remaining: Some(1),
        }
    }

    /// Only match record operations at or below `prefix`
    pub fn at(mut self, prefix: RecordPath) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn times(mut self, count: usize) -> Self {
        self.remaining = Some(count.max(1));
        self
    }

    pub fn always(mut self) -> Self {
        self.remaining = None;
        self
    }

    fn matches(&self, operation: Operation, path: Option<&RecordPath>) -> bool {
        if self.operation != operation {
            return false;
        }
        match (&self.prefix, path) {
            (None, _) => true,
            (Some(prefix), Some(path)) => path.starts_with(prefix),
            (Some(_), None) => false,
        }
    }
}

/// In-memory relay holding the record tree and blobs in process
///
/// Clones share state, so a test can hand the same relay to several users.
///  Faults and delays can be injected per operation to exercise failures.
#[derive(Debug, Clone)]
pub struct MemoryRelay {
    inner: Arc<MemoryRelayInner>,
}

#[derive(Debug)]
struct MemoryRelayInner {
    tree: watch::Sender<Value>,
    blobs: RwLock<HashMap<Uuid, Bytes>>,
    faults: Mutex<Vec<Fault>>,
    delays: Mutex<HashMap<Operation, Duration>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        let (tree, _) = watch::channel(json!({}));
        Self {
            inner: Arc::new(MemoryRelayInner {
                tree,
                blobs: RwLock::new(HashMap::new()),
                faults: Mutex::new(Vec::new()),
                delays: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn inject(&self, fault: Fault) {
        self.inner.faults.lock().push(fault);
    }

    pub fn clear_faults(&self) {
        self.inner.faults.lock().clear();
    }

    /// Make every `operation` take at least `delay`
    pub fn delay(&self, operation: Operation, delay: Duration) {
        self.inner.delays.lock().insert(operation, delay);
    }

    /// A copy of the whole record tree
    pub fn snapshot(&self) -> Value {
        self.inner.tree.borrow().clone()
    }

    pub fn blob_count(&self) -> usize {
        self.inner.blobs.read().len()
    }

    pub fn blob(&self, id: &Uuid) -> Option<Bytes> {
        self.inner.blobs.read().get(id).cloned()
    }

    /// Rewrite a stored blob in place. Returns false if there is no such blob.
    pub fn tamper_blob(&self, id: &Uuid, tamper: impl FnOnce(&mut Vec<u8>)) -> bool {
        let mut blobs = self.inner.blobs.write();
        let Some(blob) = blobs.get_mut(id) else {
            return false;
        };
        let mut data = blob.to_vec();
        tamper(&mut data);
        *blob = Bytes::from(data);
        true
    }

    fn blob_ref(id: &Uuid) -> Result<BlobRef, RelayError> {
        Url::parse(MEMORY_BLOB_BASE)
            .and_then(|base| base.join(&format!("{}/{}", BLOB_PREFIX, id)))
            .map(BlobRef::new)
            .map_err(|e| RelayError::Network(e.to_string()))
    }

    async fn enter(&self, operation: Operation, path: Option<&RecordPath>) -> Result<(), RelayError> {
        let delay = self.inner.delays.lock().get(&operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut faults = self.inner.faults.lock();
        let Some(index) = faults.iter().position(|f| f.matches(operation, path)) else {
            return Ok(());
        };
        let error = faults[index].error.clone();
        let remaining = faults[index].remaining;
        match remaining {
            Some(1) => {
                faults.remove(index);
            }
            Some(n) => faults[index].remaining = Some(n - 1),
            None => {}
        }
        tracing::debug!(?operation, %error, "injected relay fault");
        Err(error)
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRelay {
    async fn put(&self, path: &RecordPath, value: Value) -> Result<(), RelayError> {
        self.enter(Operation::Put, Some(path)).await?;
        self.inner
            .tree
            .send_modify(|tree| tree::set(tree, path, value));
        Ok(())
    }

    async fn create(&self, path: &RecordPath, value: Value) -> Result<(), RelayError> {
        self.enter(Operation::Create, Some(path)).await?;
        let created = self.inner.tree.send_if_modified(|tree| {
            if tree::get(tree, path).is_some() {
                return false;
            }
            tree::set(tree, path, value);
            true
        });
        if created {
            Ok(())
        } else {
            Err(RelayError::Conflict(path.to_string()))
        }
    }

    async fn get_once(&self, path: &RecordPath) -> Result<Option<Value>, RelayError> {
        self.enter(Operation::GetOnce, Some(path)).await?;
        Ok(tree::get(&self.inner.tree.borrow(), path).cloned())
    }

    async fn subscribe(&self, path: &RecordPath) -> Result<Subscription, RelayError> {
        self.enter(Operation::Subscribe, Some(path)).await?;
        Ok(Subscription::new(path.clone(), self.inner.tree.subscribe()))
    }
}

#[async_trait]
impl BlobStore for MemoryRelay {
    async fn upload(&self, id: Uuid, data: Bytes) -> Result<BlobRef, RelayError> {
        self.enter(Operation::Upload, None).await?;
        self.inner.blobs.write().insert(id, data);
        Self::blob_ref(&id)
    }

    async fn download(&self, blob: &BlobRef) -> Result<Bytes, RelayError> {
        self.enter(Operation::Download, None).await?;
        if blob.url().scheme() != "memory" {
            return Err(RelayError::NotFound(blob.to_string()));
        }
        let id = blob
            .blob_id()
            .ok_or_else(|| RelayError::NotFound(blob.to_string()))?;
        self.blob(&id)
            .ok_or_else(|| RelayError::NotFound(blob.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let relay = MemoryRelay::new();
        let path = RecordPath::root().child("users_public_data/alice");

        assert_eq!(relay.get_once(&path).await.unwrap(), None);
        relay.put(&path, json!({"name": "Alice"})).await.unwrap();
        assert_eq!(
            relay.get_once(&path).await.unwrap(),
            Some(json!({"name": "Alice"}))
        );

        let children = relay
            .children(&RecordPath::root().child("users_public_data"))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, "alice");
    }

    #[tokio::test]
    async fn test_create_conflicts() {
        let relay = MemoryRelay::new();
        let path = RecordPath::root().child("a/b");
        relay.create(&path, json!(1)).await.unwrap();
        assert_eq!(
            relay.create(&path, json!(2)).await,
            Err(RelayError::Conflict(path.to_string()))
        );
        assert_eq!(relay.get_once(&path).await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_blobs() {
        let relay = MemoryRelay::new();
        let id = Uuid::new_v4();
        let blob = relay.upload(id, Bytes::from_static(b"sealed")).await.unwrap();
        assert_eq!(blob.blob_id(), Some(id));
        assert_eq!(relay.download(&blob).await.unwrap(), Bytes::from_static(b"sealed"));
        assert_eq!(relay.blob_count(), 1);

        assert!(relay.tamper_blob(&id, |data| data[0] ^= 0xff));
        assert_ne!(relay.download(&blob).await.unwrap(), Bytes::from_static(b"sealed"));

        let missing = MemoryRelay::blob_ref(&Uuid::new_v4()).unwrap();
        assert!(matches!(
            relay.download(&missing).await,
            Err(RelayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_faults() {
        let relay = MemoryRelay::new();
        let scoped = RecordPath::root().child("users_public_data");
        relay.inject(
            Fault::new(Operation::GetOnce, RelayError::Network("down".into()))
                .at(scoped.clone())
                .times(2),
        );

        // other paths are unaffected
        assert!(relay.get_once(&RecordPath::root().child("x")).await.is_ok());

        let target = scoped.child("bob");
        assert!(relay.get_once(&target).await.is_err());
        assert!(relay.get_once(&target).await.is_err());
        assert!(relay.get_once(&target).await.is_ok());

        relay.inject(Fault::new(Operation::Upload, RelayError::Unauthorized("token".into())).always());
        for _ in 0..3 {
            assert!(relay.upload(Uuid::new_v4(), Bytes::new()).await.is_err());
        }
        relay.clear_faults();
        assert!(relay.upload(Uuid::new_v4(), Bytes::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_sees_writes() {
        let relay = MemoryRelay::new();
        let path = RecordPath::root().child("inbox");
        let mut subscription = relay.subscribe(&path).await.unwrap();
        assert_eq!(subscription.next().await, Some(None));

        relay.put(&path.child("f1"), json!("x")).await.unwrap();
        assert_eq!(subscription.next().await, Some(Some(json!({"f1": "x"}))));
    }
}
