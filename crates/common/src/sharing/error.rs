use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{CipherError, IntegrityError, KeyExchangeError, SignatureError};
use crate::directory::DirectoryError;
use crate::relay::RelayError;

/// Steps of a share, in order. Outgoing shares run the first five,
///  incoming ones the rest (plus `ResolveSharedKey`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SelectRecipient,
    ResolveSharedKey,
    EncryptAndSign,
    Upload,
    RecordMetadata,
    FetchRecords,
    Download,
    Decrypt,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SelectRecipient => "select recipient",
            Stage::ResolveSharedKey => "resolve shared key",
            Stage::EncryptAndSign => "encrypt and sign",
            Stage::Upload => "upload",
            Stage::RecordMetadata => "record metadata",
            Stage::FetchRecords => "fetch records",
            Stage::Download => "download",
            Stage::Decrypt => "decrypt",
            Stage::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Observable progress of a share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareState {
    InProgress(Stage),
    Done,
    Failed(Stage),
}

impl ShareState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ShareState::InProgress(_))
    }
}

/// Coarse cause of a failure, for telling the user what went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Missing, invalid or mismatched keys
    WrongKeyMaterial,
    /// Ciphertext or record did not authenticate
    TamperedContent,
    /// The relay could not be reached in time
    Transport,
    /// The relay refused or could not find something
    Rejected,
    Cancelled,
    InvalidRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum SharingErrorKind {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("{0} has not published a public key")]
    NoPublicKey(String),
    #[error(transparent)]
    KeyExchange(#[from] KeyExchangeError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("cancelled")]
    Cancelled,
    #[error("timed out")]
    TimedOut,
}

impl From<DirectoryError> for SharingErrorKind {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Relay(e) => SharingErrorKind::Relay(e),
            DirectoryError::UnknownUser(user) | DirectoryError::NoPublicKey(user) => {
                SharingErrorKind::NoPublicKey(user)
            }
            DirectoryError::InvalidPublicKey { .. } => {
                SharingErrorKind::KeyExchange(KeyExchangeError::InvalidPublicKey)
            }
            DirectoryError::Malformed { user, source } => {
                SharingErrorKind::MalformedRecord(format!("directory entry for {}: {}", user, source))
            }
        }
    }
}

/// A failed share: where it stopped, and why
#[derive(Debug, thiserror::Error)]
#[error("share failed at {stage}: {kind}")]
pub struct SharingError {
    pub stage: Stage,
    #[source]
    pub kind: SharingErrorKind,
}

impl SharingError {
    pub fn new(stage: Stage, kind: impl Into<SharingErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    /// Whether running the same operation again may succeed.
    ///
    /// Retrying after a transport failure is safe: the worst case is an
    ///  orphaned blob or an overwritten shared key cache entry.
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            SharingErrorKind::Relay(e) => e.is_retryable(),
            SharingErrorKind::TimedOut => true,
            _ => false,
        }
    }

    pub fn reason(&self) -> FailureReason {
        match &self.kind {
            SharingErrorKind::InvalidRequest(_) => FailureReason::InvalidRequest,
            SharingErrorKind::Relay(RelayError::Network(_)) | SharingErrorKind::TimedOut => {
                FailureReason::Transport
            }
            SharingErrorKind::Relay(_) => FailureReason::Rejected,
            SharingErrorKind::NoPublicKey(_)
            | SharingErrorKind::KeyExchange(_)
            | SharingErrorKind::Signature(_)
            | SharingErrorKind::Integrity(IntegrityError::InvalidKey) => {
                FailureReason::WrongKeyMaterial
            }
            SharingErrorKind::Integrity(IntegrityError::Io(_)) => FailureReason::Rejected,
            SharingErrorKind::Cipher(_) | SharingErrorKind::MalformedRecord(_) => {
                FailureReason::TamperedContent
            }
            SharingErrorKind::Cancelled => FailureReason::Cancelled,
        }
    }
}
