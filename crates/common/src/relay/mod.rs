//! The untrusted relay between users
//!
//! A relay offers two things: a tree-structured record store with live
//!  subscriptions, and a blob store. It sees public keys, ciphertext,
//!  signatures and cached pairwise keys, but never plaintext or private keys.
//!
//! Implementations:
//! - [`MemoryRelay`]: in process, with fault injection for tests
//! - [`FsRelay`]: a shared directory, used by the CLI

mod fs;
mod memory;
pub mod paths;
mod provider;
mod subscription;
mod tree;

pub use fs::{FsRelay, RECORDS_FILE_NAME};
pub use memory::{Fault, MemoryRelay, Operation};
pub use provider::{BlobRef, BlobStore, RecordPath, RecordStore, Relay, RelayError};
pub use subscription::{Subscription, SubscriptionHandle};
