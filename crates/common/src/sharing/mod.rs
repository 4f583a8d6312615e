//! Sending and receiving files over a relay
//!
//! Outgoing: select recipient, resolve the pairwise key, sign then
//!  encrypt, upload the blob, record the metadata under the recipient.
//! Incoming: fetch records, resolve the key against the author's embedded
//!  public key, download, decrypt, verify the signature.
//!
//! Every failure carries the [`Stage`] it happened in. Network stages are
//!  bounded by [`SharingConfig::network_timeout`] and can be cancelled;
//!  crypto stages run to completion.

mod config;
mod coordinator;
mod error;
mod shared_keys;

pub use config::{SharingConfig, DEFAULT_NETWORK_TIMEOUT};
pub use coordinator::{
    Authenticity, OutgoingShare, ReceivedFile, SentShare, ShareRequest, SharingCoordinator,
};
pub use error::{FailureReason, ShareState, SharingError, SharingErrorKind, Stage};
pub use shared_keys::{KeySource, ResolvedKey};
