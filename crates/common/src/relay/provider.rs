use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use super::subscription::Subscription;

/// Errors surfaced by a relay. Passed through the core untouched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Nothing stored at the requested address
    #[error("not found: {0}")]
    NotFound(String),
    /// The relay refused the caller's identity token
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Transport failure; safe to retry
    #[error("network error: {0}")]
    Network(String),
    /// A write collided with existing data
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RelayError {
    /// Only transport failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Network(_))
    }
}

/// Slash separated address of a node in the record tree
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordPath(Vec<String>);

impl RecordPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Append one or more segments; slashes inside `segment` nest further
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.0.clone();
        segments.extend(
            segment
                .as_ref()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &RecordPath) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl FromStr for RecordPath {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RecordPath::root().child(s))
    }
}

/// Relay assigned address of an uploaded blob
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(Url);

impl BlobRef {
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// The blob id, taken from the last path segment
    pub fn blob_id(&self) -> Option<Uuid> {
        self.0
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|segment| Uuid::parse_str(segment).ok())
    }
}

impl Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BlobRef {
    type Err = url::ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Url::parse(s).map(BlobRef)
    }
}

/// Tree-structured record store (the relay's metadata database)
///
/// Nodes are JSON values; reading a path returns the whole subtree below it.
#[async_trait]
pub trait RecordStore: Send + Sync + Debug + Clone + 'static {
    /// Write `value` at `path`, replacing whatever was there
    async fn put(&self, path: &RecordPath, value: Value) -> Result<(), RelayError>;

    /// Write `value` at `path` only if nothing is stored there yet
    ///
    /// Should fail with `RelayError::Conflict` if the path is occupied.
    async fn create(&self, path: &RecordPath, value: Value) -> Result<(), RelayError>;

    /// One-shot read of the value (or subtree) at `path`
    async fn get_once(&self, path: &RecordPath) -> Result<Option<Value>, RelayError>;

    /// Observe the value at `path`
    ///
    /// The subscription first yields the current value, then a new
    ///  snapshot every time the subtree changes, until cancelled.
    async fn subscribe(&self, path: &RecordPath) -> Result<Subscription, RelayError>;

    /// Direct children of `path` as `(key, value)` pairs
    async fn children(&self, path: &RecordPath) -> Result<Vec<(String, Value)>, RelayError> {
        Ok(match self.get_once(path).await? {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => Vec::new(),
        })
    }
}

/// Opaque blob storage (the relay's object store)
#[async_trait]
pub trait BlobStore: Send + Sync + Debug + Clone + 'static {
    /// Store `data` under `id`, returning the address to fetch it from
    async fn upload(&self, id: Uuid, data: Bytes) -> Result<BlobRef, RelayError>;

    /// Fetch a blob previously returned by `upload`
    async fn download(&self, blob: &BlobRef) -> Result<Bytes, RelayError>;
}

/// Everything the sharing protocol needs from the relay
pub trait Relay: RecordStore + BlobStore {}

impl<T: RecordStore + BlobStore> Relay for T {}
