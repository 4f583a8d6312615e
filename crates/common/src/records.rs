//! Record types stored in the relay's record tree

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::SharedKey;
use crate::relay::BlobRef;

/// Date format of the `date` field, e.g. `18/10/2026`
pub const SHARE_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid blob reference: {0}")]
    InvalidBlobRef(#[from] url::ParseError),
}

/// Cached pairwise key, stored privately under the owner's subtree
///
/// The fingerprints pin the key epoch: a record whose fingerprints do not
///  match the current identity keys was derived from retired keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedKeyRecord {
    /// Base64 of the 32 byte pairwise key
    pub shared_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_key_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_key_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SharedKeyRecord {
    pub fn new(key: &SharedKey, owner_fingerprint: String, counterparty_fingerprint: String) -> Self {
        Self {
            shared_key: key.to_base64(),
            owner_key_fingerprint: Some(owner_fingerprint),
            counterparty_key_fingerprint: Some(counterparty_fingerprint),
            created_at: Some(Utc::now()),
        }
    }

    /// Whether this record was derived from the given keys.
    ///
    /// `counterparty` is only checked when known. Records without
    ///  fingerprints never match.
    pub fn matches(&self, owner: &str, counterparty: Option<&str>) -> bool {
        let owner_matches = self.owner_key_fingerprint.as_deref() == Some(owner);
        let counterparty_matches = match (counterparty, &self.counterparty_key_fingerprint) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(expected), Some(recorded)) => expected == recorded,
        };
        owner_matches && counterparty_matches
    }

    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value, RecordError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Metadata written into the recipient's subtree for each shared file
///
/// Immutable once written. Field names follow the relay's existing layout:
///  `path` is the blob reference, `author` the sender's user id and
///  `fileAuthor` the sender's display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFileRecord {
    /// Key of the record under `.../files/`
    #[serde(skip)]
    pub id: String,
    /// Inbox segment the record was stored under (`.../shared/{sender}/...`)
    #[serde(skip)]
    pub sender_id: String,
    #[serde(rename = "path")]
    pub blob: String,
    pub name: String,
    /// File extension, without the dot
    #[serde(rename = "type", default)]
    pub file_type: String,
    #[serde(default)]
    pub date: String,
    /// Base64 DER ECDSA signature over the plaintext
    pub signature: String,
    #[serde(rename = "author", alias = "authorId")]
    pub author_id: String,
    #[serde(rename = "fileAuthor", default)]
    pub author_name: String,
    /// Base64 SPKI of the sender's public key at send time
    #[serde(rename = "authorPublicKey")]
    pub author_public_key: String,
    /// Optional base64 HMAC-SHA256 over the plaintext
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

impl SharedFileRecord {
    pub fn from_value(id: impl Into<String>, value: Value) -> Result<Self, RecordError> {
        let mut record: Self = serde_json::from_value(value)?;
        record.id = id.into();
        Ok(record)
    }

    pub fn to_value(&self) -> Result<Value, RecordError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Whether the claimed author is the sender whose inbox folder holds
    ///  this record
    pub fn author_matches_sender(&self) -> bool {
        !self.author_id.is_empty() && self.author_id == self.sender_id
    }

    pub fn blob_ref(&self) -> Result<BlobRef, RecordError> {
        Ok(self.blob.parse()?)
    }

    /// Best guess at the content type, from the file name
    pub fn mime(&self) -> mime_guess::Mime {
        mime_guess::from_path(&self.name).first_or_octet_stream()
    }

    /// The name reduced to a single path component, safe to save under.
    ///
    /// The sender picks the name, so it must not be trusted as a path.
    pub fn safe_file_name(&self) -> String {
        Path::new(&self.name)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.starts_with('.'))
            .map(str::to_string)
            .unwrap_or_else(|| match self.file_type.as_str() {
                "" => self.id.clone(),
                ext => format!("{}.{}", self.id, ext),
            })
    }

    /// Parse an inbox subtree (`sender -> files -> id -> record`).
    ///
    /// Malformed entries are skipped with a warning rather than failing the
    ///  whole listing. Sorted by sender, then record id.
    pub fn parse_inbox(inbox: Option<Value>) -> Vec<Self> {
        let Some(Value::Object(senders)) = inbox else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for (sender, node) in senders {
            let Some(Value::Object(files)) = node.get(crate::relay::paths::FILES).cloned() else {
                continue;
            };
            for (id, value) in files {
                match Self::from_value(id.as_str(), value) {
                    Ok(mut record) => {
                        record.sender_id = sender.clone();
                        records.push(record);
                    }
                    Err(e) => tracing::warn!(%sender, file_id = %id, error = %e, "skipping malformed shared file record"),
                }
            }
        }
        records
    }
}

/// The extension part of a file name, as stored in `type`
pub fn file_type(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "path": "memory://relay/files/6a1f2f43-3d8e-4d52-9b1e-6a8c1a0f4b11",
            "name": "report.pdf",
            "type": "pdf",
            "date": "18/10/2026",
            "signature": "MEUCIQ==",
            "author": "alice",
            "fileAuthor": "Alice",
            "authorPublicKey": "MFkw"
        })
    }

    #[test]
    fn test_shared_file_record_wire_names() {
        let record = SharedFileRecord::from_value("f1", sample()).unwrap();
        assert_eq!(record.id, "f1");
        assert_eq!(record.author_id, "alice");
        assert_eq!(record.author_name, "Alice");
        assert_eq!(record.file_type, "pdf");
        assert_eq!(record.hmac, None);
        assert!(record.blob_ref().unwrap().blob_id().is_some());
        assert_eq!(record.mime().essence_str(), "application/pdf");

        // the id is the record's key, not a field
        assert_eq!(record.to_value().unwrap(), sample());
    }

    #[test]
    fn test_author_id_alias() {
        let mut value = sample();
        let map = value.as_object_mut().unwrap();
        let author = map.remove("author").unwrap();
        map.insert("authorId".into(), author);
        let record = SharedFileRecord::from_value("f1", value).unwrap();
        assert_eq!(record.author_id, "alice");
    }

    #[test]
    fn test_safe_file_name() {
        let mut record = SharedFileRecord::from_value("f1", sample()).unwrap();
        assert_eq!(record.safe_file_name(), "report.pdf");

        record.name = "../../etc/passwd".into();
        assert_eq!(record.safe_file_name(), "passwd");

        record.name = "..".into();
        assert_eq!(record.safe_file_name(), "f1.pdf");

        record.name = ".bashrc".into();
        record.file_type = String::new();
        assert_eq!(record.safe_file_name(), "f1");
    }

    #[test]
    fn test_parse_inbox_skips_malformed() {
        let inbox = json!({
            "alice": {"files": {"f1": sample(), "f2": {"name": "missing fields"}}},
            "bob": {"files": {"f3": sample()}},
            "carol": "not an object"
        });
        let records = SharedFileRecord::parse_inbox(Some(inbox));
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f3"]);
        assert!(SharedFileRecord::parse_inbox(None).is_empty());

        // the folder a record sits in is kept next to the author it claims
        assert_eq!(records[0].sender_id, "alice");
        assert!(records[0].author_matches_sender());
        assert_eq!(records[1].sender_id, "bob");
        assert_eq!(records[1].author_id, "alice");
        assert!(!records[1].author_matches_sender());
    }

    #[test]
    fn test_shared_key_record_epochs() {
        let key = SharedKey::from([1u8; 32]);
        let record = SharedKeyRecord::new(&key, "aaaa".into(), "bbbb".into());

        assert!(record.matches("aaaa", Some("bbbb")));
        assert!(record.matches("aaaa", None));
        assert!(!record.matches("cccc", Some("bbbb")));
        assert!(!record.matches("aaaa", Some("dddd")));

        // bare records from older clients carry no fingerprints
        let bare = SharedKeyRecord::from_value(json!({"shared_key": key.to_base64()})).unwrap();
        assert!(!bare.matches("aaaa", None));
        assert_eq!(SharedKey::from_base64(&bare.shared_key).unwrap(), key);
    }

    #[test]
    fn test_file_type() {
        assert_eq!(file_type("report.pdf"), "pdf");
        assert_eq!(file_type("archive.tar.gz"), "gz");
        assert_eq!(file_type("README"), "");
    }
}
