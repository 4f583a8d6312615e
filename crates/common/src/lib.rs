/**
 * Cryptographic types and operations.
 *  - Identity keys and their on-disk store
 *  - Pairwise key agreement
 *  - File encryption, signatures and HMAC tags
 */
pub mod crypto;
/**
 * The public directory: who is out there,
 *  and which public key to share with them.
 */
pub mod directory;
/**
 * The local user and their key pair.
 */
pub mod identity;
/**
 * Records stored on the relay: cached
 *  pairwise keys and shared file metadata.
 */
pub mod records;
/**
 * The untrusted relay: a record tree with
 *  subscriptions plus a blob store.
 */
pub mod relay;
/**
 * The share protocol, end to end.
 */
pub mod sharing;
/**
 * In-process harness for multi-user tests.
 */
pub mod testkit;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::crypto::{IdentityKeyPair, KeyStore, PrivateKey, PublicKey, SharedKey};
    pub use crate::directory::{Directory, PublicDirectoryEntry};
    pub use crate::identity::{Identity, Profile};
    pub use crate::records::{SharedFileRecord, SharedKeyRecord};
    pub use crate::relay::{FsRelay, MemoryRelay, Relay, RelayError};
    pub use crate::sharing::{
        Authenticity, ShareRequest, ShareState, SharingConfig, SharingCoordinator, SharingError,
        Stage,
    };
    pub use crate::version::build_info;
}
