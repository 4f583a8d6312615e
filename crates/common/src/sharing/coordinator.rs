use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::crypto::{
    compute_tag, decrypt, integrity_key, sign, verify, verify_tag,
    FileSignature, KeyExchangeError, PublicKey, SharedKey,
};
use crate::directory::Directory;
use crate::identity::Identity;
use crate::records::{file_type, SharedFileRecord, SHARE_DATE_FORMAT};
use crate::relay::{paths, Relay, RelayError, SubscriptionHandle};

use super::config::SharingConfig;
use super::error::{SharingError, SharingErrorKind, ShareState, Stage};
use super::shared_keys::{self, KeySource, ResolvedKey};

/// A file to send to one recipient
#[derive(Debug, Clone)]
pub struct ShareRequest {
    pub recipient_id: String,
    pub file_name: String,
    pub content: Bytes,
}

impl ShareRequest {
    pub fn new(
        recipient_id: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    /// Read a local file into a request, named after the file
    pub async fn from_path(recipient_id: impl Into<String>, path: &Path) -> std::io::Result<Self> {
        let content = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file")
            .to_string();
        Ok(Self::new(recipient_id, file_name, content))
    }
}

/// Outcome of a completed outgoing share
#[derive(Debug, Clone)]
pub struct SentShare {
    pub recipient_id: String,
    pub record: SharedFileRecord,
    pub key_source: KeySource,
}

/// Whether a received file is what its author signed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authenticity {
    Authentic,
    Tampered,
}

/// A decrypted incoming file
///
/// Decryption succeeding and the content being authentic are separate
///  facts; callers decide what to do with a `Tampered` file.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub record: SharedFileRecord,
    pub plaintext: Bytes,
    pub authenticity: Authenticity,
}

impl ReceivedFile {
    pub fn is_authentic(&self) -> bool {
        self.authenticity == Authenticity::Authentic
    }
}

/// A share running in the background
pub struct OutgoingShare {
    state: watch::Receiver<ShareState>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<SentShare, SharingError>>,
}

impl OutgoingShare {
    pub fn state(&self) -> ShareState {
        *self.state.borrow()
    }

    /// Receiver for following the share through its stages
    pub fn watch_state(&self) -> watch::Receiver<ShareState> {
        self.state.clone()
    }

    /// Stop at the next network stage boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<SentShare, SharingError> {
        let stage = match *self.state.borrow() {
            ShareState::InProgress(stage) | ShareState::Failed(stage) => stage,
            ShareState::Done => Stage::RecordMetadata,
        };
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "share task aborted");
                Err(SharingError::new(stage, SharingErrorKind::Cancelled))
            }
        }
    }
}

/// Runs the share protocol for one local identity over a relay
///
/// ```ignore
/// let coordinator = SharingCoordinator::new(relay, Arc::new(alice), SharingConfig::default());
/// let sent = coordinator.send(ShareRequest::new("bob", "hello.txt", "hello world")).await?;
///
/// // on bob's side
/// for record in coordinator.incoming().await? {
///     let file = coordinator.receive(&record).await?;
///     assert!(file.is_authentic());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SharingCoordinator<R> {
    relay: R,
    directory: Directory<R>,
    identity: Arc<Identity>,
    config: SharingConfig,
}

impl<R: Relay> SharingCoordinator<R> {
    pub fn new(relay: R, identity: Arc<Identity>, config: SharingConfig) -> Self {
        Self {
            directory: Directory::new(relay.clone()),
            relay,
            identity,
            config,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn directory(&self) -> &Directory<R> {
        &self.directory
    }

    pub fn config(&self) -> &SharingConfig {
        &self.config
    }

    /// Run one network stage under the configured timeout, giving up early
    ///  if `cancel` fires
    async fn guarded<T, E, F>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, SharingError>
    where
        E: Into<SharingErrorKind>,
        F: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SharingError::new(stage, SharingErrorKind::Cancelled)),
            result = tokio::time::timeout(self.config.network_timeout, operation) => match result {
                Ok(result) => result.map_err(|e| SharingError::new(stage, e)),
                Err(_) => Err(SharingError::new(stage, SharingErrorKind::TimedOut)),
            },
        }
    }

    fn check_cancelled(stage: Stage, cancel: &CancellationToken) -> Result<(), SharingError> {
        if cancel.is_cancelled() {
            return Err(SharingError::new(stage, SharingErrorKind::Cancelled));
        }
        Ok(())
    }

    async fn resolve(&self, counterparty_id: &str) -> Result<ResolvedKey, SharingErrorKind> {
        shared_keys::resolve(
            &self.relay,
            &self.directory,
            &self.identity,
            counterparty_id,
            self.config.verify_counterparty_epoch,
        )
        .await
    }

    async fn resolve_incoming(
        &self,
        record: &SharedFileRecord,
        cancel: &CancellationToken,
    ) -> Result<(PublicKey, ResolvedKey), SharingError> {
        let author_key = PublicKey::from_base64(&record.author_public_key).map_err(|_| {
            SharingError::new(Stage::ResolveSharedKey, KeyExchangeError::InvalidPublicKey)
        })?;
        let resolved = self
            .guarded(
                Stage::ResolveSharedKey,
                cancel,
                shared_keys::resolve_incoming(
                    &self.relay,
                    &self.directory,
                    &self.identity,
                    &record.author_id,
                    &author_key,
                ),
            )
            .await?;
        Ok((author_key, resolved))
    }

    /// Resolve (and cache) the pairwise key with `counterparty_id`
    pub async fn resolve_shared_key(&self, counterparty_id: &str) -> Result<ResolvedKey, SharingError> {
        self.guarded(
            Stage::ResolveSharedKey,
            &CancellationToken::new(),
            self.resolve(counterparty_id),
        )
        .await
    }

    /// Send a file and wait for it to finish
    pub async fn send(&self, request: ShareRequest) -> Result<SentShare, SharingError> {
        let (progress, _) = watch::channel(ShareState::InProgress(Stage::SelectRecipient));
        self.send_with(request, &CancellationToken::new(), &progress)
            .await
    }

    /// Send a file in a background task that can be observed and cancelled
    pub fn spawn_send(&self, request: ShareRequest) -> OutgoingShare {
        let (progress, state) = watch::channel(ShareState::InProgress(Stage::SelectRecipient));
        let cancel = CancellationToken::new();

        let coordinator = self.clone();
        let token = cancel.clone();
        let handle =
            tokio::spawn(async move { coordinator.send_with(request, &token, &progress).await });

        OutgoingShare {
            state,
            cancel,
            handle,
        }
    }

    /// Send a file, reporting each stage on `progress`.
    ///
    /// The final state is always `Done` or `Failed(stage)`. Cancellation
    ///  takes effect at network stage boundaries; a cancelled share reports
    ///  the stage it was in.
    pub async fn send_with(
        &self,
        request: ShareRequest,
        cancel: &CancellationToken,
        progress: &watch::Sender<ShareState>,
    ) -> Result<SentShare, SharingError> {
        let recipient_id = request.recipient_id.clone();
        let result = self.run_send(request, cancel, progress).await;
        match &result {
            Ok(sent) => {
                progress.send_replace(ShareState::Done);
                tracing::info!(
                    %recipient_id,
                    file_id = %sent.record.id,
                    name = %sent.record.name,
                    "shared file"
                );
            }
            Err(e) => {
                progress.send_replace(ShareState::Failed(e.stage));
                tracing::warn!(
                    %recipient_id,
                    stage = %e.stage,
                    error = %e.kind,
                    retryable = e.is_retryable(),
                    "share failed"
                );
            }
        }
        result
    }

    async fn run_send(
        &self,
        request: ShareRequest,
        cancel: &CancellationToken,
        progress: &watch::Sender<ShareState>,
    ) -> Result<SentShare, SharingError> {
        let enter = |stage: Stage| {
            tracing::debug!(%stage, "share stage");
            progress.send_replace(ShareState::InProgress(stage));
        };

        enter(Stage::SelectRecipient);
        let ShareRequest {
            recipient_id,
            file_name,
            content,
        } = request;
        if recipient_id.trim().is_empty() {
            return Err(SharingError::new(
                Stage::SelectRecipient,
                SharingErrorKind::InvalidRequest("no recipient selected".into()),
            ));
        }
        if file_name.trim().is_empty() {
            return Err(SharingError::new(
                Stage::SelectRecipient,
                SharingErrorKind::InvalidRequest("file has no name".into()),
            ));
        }
        Self::check_cancelled(Stage::SelectRecipient, cancel)?;

        enter(Stage::ResolveSharedKey);
        let resolved = self
            .guarded(
                Stage::ResolveSharedKey,
                cancel,
                self.resolve(&recipient_id),
            )
            .await?;

        enter(Stage::EncryptAndSign);
        Self::check_cancelled(Stage::EncryptAndSign, cancel)?;
        let sealed = self
            .seal(&resolved.key, &content)
            .map_err(|kind| SharingError::new(Stage::EncryptAndSign, kind))?;

        enter(Stage::Upload);
        let file_id = Uuid::new_v4();
        let blob = self
            .guarded(
                Stage::Upload,
                cancel,
                self.relay.upload(file_id, sealed.blob),
            )
            .await?;

        enter(Stage::RecordMetadata);
        let record = SharedFileRecord {
            id: file_id.to_string(),
            sender_id: self.identity.user_id().to_string(),
            blob: blob.to_string(),
            file_type: file_type(&file_name),
            name: file_name,
            date: chrono::Local::now().format(SHARE_DATE_FORMAT).to_string(),
            signature: sealed.signature.to_base64(),
            author_id: self.identity.user_id().to_string(),
            author_name: self.identity.display_name().to_string(),
            author_public_key: sealed.author_public_key,
            hmac: sealed.hmac,
        };
        let value = record.to_value().map_err(|e| {
            SharingError::new(
                Stage::RecordMetadata,
                SharingErrorKind::MalformedRecord(e.to_string()),
            )
        })?;
        let path = paths::shared_file(&recipient_id, self.identity.user_id(), &record.id);
        self.guarded(Stage::RecordMetadata, cancel, self.relay.create(&path, value))
            .await
            .map_err(|e| {
                tracing::warn!(%blob, "metadata was not recorded, uploaded blob is orphaned");
                e
            })?;

        Ok(SentShare {
            recipient_id,
            record,
            key_source: resolved.source,
        })
    }

    /// Sign the plaintext, then encrypt it
    fn seal(&self, key: &SharedKey, content: &[u8]) -> Result<Sealed, SharingErrorKind> {
        let signature = sign(self.identity.private_key(), content);
        let blob = key.encrypt(content)?;
        let hmac = if self.config.attach_hmac {
            let mac_key = integrity_key(key)?;
            Some(STANDARD.encode(compute_tag(&mac_key, content)?))
        } else {
            None
        };
        let author_public_key = self
            .identity
            .public_key()
            .to_base64()
            .map_err(|_| KeyExchangeError::InvalidPublicKey)?;

        Ok(Sealed {
            blob: Bytes::from(blob.into_bytes()),
            signature,
            hmac,
            author_public_key,
        })
    }

    /// Every file shared with the local user
    pub async fn incoming(&self) -> Result<Vec<SharedFileRecord>, SharingError> {
        let inbox = self
            .guarded(
                Stage::FetchRecords,
                &CancellationToken::new(),
                self.relay.get_once(&paths::inbox(self.identity.user_id())),
            )
            .await?;
        Ok(SharedFileRecord::parse_inbox(inbox))
    }

    pub async fn find_incoming(&self, file_id: &str) -> Result<SharedFileRecord, SharingError> {
        self.incoming()
            .await?
            .into_iter()
            .find(|record| record.id == file_id)
            .ok_or_else(|| {
                SharingError::new(
                    Stage::FetchRecords,
                    RelayError::NotFound(format!("shared file {}", file_id)),
                )
            })
    }

    /// Live view of the local user's incoming files
    pub async fn watch_incoming(
        &self,
    ) -> Result<(SubscriptionHandle, BoxStream<'static, Vec<SharedFileRecord>>), SharingError> {
        let subscription = self
            .guarded(
                Stage::FetchRecords,
                &CancellationToken::new(),
                self.relay.subscribe(&paths::inbox(self.identity.user_id())),
            )
            .await?;
        let handle = subscription.handle();
        let records = subscription
            .into_stream()
            .map(SharedFileRecord::parse_inbox)
            .boxed();
        Ok((handle, records))
    }

    pub async fn receive(&self, record: &SharedFileRecord) -> Result<ReceivedFile, SharingError> {
        self.receive_with(record, &CancellationToken::new()).await
    }

    /// Download, decrypt and verify one incoming file.
    ///
    /// The pairwise key is derived against the public key embedded in the
    ///  record, the same key the signature is checked against. The file is
    ///  only `Authentic` if that key is bound to the claimed author and the
    ///  author is the sender the record is filed under.
    pub async fn receive_with(
        &self,
        record: &SharedFileRecord,
        cancel: &CancellationToken,
    ) -> Result<ReceivedFile, SharingError> {
        let (author_key, resolved) = self.resolve_incoming(record, cancel).await?;

        let blob = record.blob_ref().map_err(|e| {
            SharingError::new(
                Stage::Download,
                SharingErrorKind::MalformedRecord(e.to_string()),
            )
        })?;
        let data = self
            .guarded(Stage::Download, cancel, self.relay.download(&blob))
            .await?;

        Self::check_cancelled(Stage::Decrypt, cancel)?;
        let plaintext = decrypt(&resolved.key, &data).map_err(|e| {
            tracing::warn!(file_id = %record.id, author = %record.author_id, error = %e, "decryption failed");
            SharingError::new(Stage::Decrypt, e)
        })?;

        let authenticity = self.authenticate(record, &author_key, &resolved, &plaintext)?;
        tracing::info!(
            file_id = %record.id,
            author = %record.author_id,
            ?authenticity,
            "received file"
        );

        Ok(ReceivedFile {
            record: record.clone(),
            plaintext: Bytes::from(plaintext),
            authenticity,
        })
    }

    fn authenticate(
        &self,
        record: &SharedFileRecord,
        author_key: &PublicKey,
        resolved: &ResolvedKey,
        plaintext: &[u8],
    ) -> Result<Authenticity, SharingError> {
        let author_valid = record.author_matches_sender() && resolved.is_vouched();

        let signature_valid = FileSignature::from_base64(&record.signature)
            .map(|signature| verify(author_key, plaintext, signature.as_bytes()))
            .unwrap_or(false);

        let hmac_valid = match &record.hmac {
            None => true,
            Some(tag) => {
                let mac_key =
                    integrity_key(&resolved.key).map_err(|e| SharingError::new(Stage::Verify, e))?;
                STANDARD
                    .decode(tag)
                    .map(|tag| verify_tag(&tag, &mac_key, plaintext))
                    .unwrap_or(false)
            }
        };

        if author_valid && signature_valid && hmac_valid {
            Ok(Authenticity::Authentic)
        } else {
            tracing::warn!(
                file_id = %record.id,
                author = %record.author_id,
                sender = %record.sender_id,
                author_valid,
                signature_valid,
                hmac_valid,
                "received file failed verification"
            );
            Ok(Authenticity::Tampered)
        }
    }

    /// Check a local copy of a received file against its record, with the
    ///  same author binding, signature and HMAC checks as `receive`
    pub async fn verify_local(
        &self,
        record: &SharedFileRecord,
        content: &[u8],
    ) -> Result<Authenticity, SharingError> {
        let (author_key, resolved) = self
            .resolve_incoming(record, &CancellationToken::new())
            .await?;
        self.authenticate(record, &author_key, &resolved, content)
    }
}

struct Sealed {
    blob: Bytes,
    signature: FileSignature,
    hmac: Option<String>,
    author_public_key: String,
}
