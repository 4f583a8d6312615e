//! Where things live in the relay's record tree
//!
//! ```text
//! users_public_data/{uid}                                  public directory entry
//! users_private_data/{owner}/shared_keys/{counterparty}    cached pairwise key
//! users_private_data/{recipient}/shared/{sender}/files/{id} shared file record
//! ```
//!
//! Blobs are uploaded under `files/{uuid}` in the relay's blob store.

use super::provider::RecordPath;

pub const PUBLIC_DATA_ROOT: &str = "users_public_data";
pub const PRIVATE_DATA_ROOT: &str = "users_private_data";
pub const SHARED_KEYS: &str = "shared_keys";
pub const SHARED: &str = "shared";
pub const FILES: &str = "files";

/// Prefix of every uploaded blob
pub const BLOB_PREFIX: &str = "files";

pub fn public_directory() -> RecordPath {
    RecordPath::root().child(PUBLIC_DATA_ROOT)
}

pub fn public_profile(user_id: &str) -> RecordPath {
    public_directory().child(user_id)
}

pub fn public_key(user_id: &str) -> RecordPath {
    public_profile(user_id).child("public_key")
}

pub fn private_data(user_id: &str) -> RecordPath {
    RecordPath::root().child(PRIVATE_DATA_ROOT).child(user_id)
}

pub fn shared_key(owner_id: &str, counterparty_id: &str) -> RecordPath {
    private_data(owner_id).child(SHARED_KEYS).child(counterparty_id)
}

/// Everything shared with `recipient_id`, grouped by sender
pub fn inbox(recipient_id: &str) -> RecordPath {
    private_data(recipient_id).child(SHARED)
}

pub fn shared_file(recipient_id: &str, sender_id: &str, file_id: &str) -> RecordPath {
    inbox(recipient_id).child(sender_id).child(FILES).child(file_id)
}
