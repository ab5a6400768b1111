//! Persisted per-document metadata.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::error::{Result, StoreError};

/// Document identifier assigned by the index. Starts at 1.
pub type DocId = u64;

/// Label mirrored from [`DocRecord::has_attachment`].
pub const ATTACHMENT_LABEL: &str = "attachment";
pub const STARRED_LABEL: &str = "starred";
pub const READ_LABEL: &str = "read";
pub const DELETED_LABEL: &str = "deleted";

/// Metadata stored for every indexed message, keyed by [`DocRecord::key`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DocRecord {
    pub doc_id: DocId,
    pub subject: String,
    pub date: DateTime<Utc>,
    /// Sender in display form (`Name <addr>`).
    pub from: String,
    /// All recipients in display form.
    pub to: Vec<String>,
    pub has_attachment: bool,
    /// Offset of the message in its mbox stream.
    pub offset: u64,
    pub starred: bool,
    pub read: bool,
    pub deleted: bool,
    pub labels: BTreeSet<String>,
}

impl DocRecord {
    /// KV key for a document id.
    pub fn key_for(doc_id: DocId) -> String {
        format!("doc/{doc_id}")
    }

    /// KV key for this record.
    pub fn key(&self) -> String {
        Self::key_for(self.doc_id)
    }

    /// Replace the label set and recompute the flags derived from it.
    pub fn apply_labels(&mut self, labels: BTreeSet<String>) {
        self.starred = labels.contains(STARRED_LABEL);
        self.read = labels.contains(READ_LABEL);
        self.deleted = labels.contains(DELETED_LABEL);
        self.labels = labels;
    }

    /// Serialize with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::corrupt(self.key(), e))
    }

    /// Deserialize a record stored under `key`.
    pub fn from_bytes(key: &str, bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| StoreError::corrupt(key, e))
    }
}

/// Lowercase, trim, and deduplicate labels. Empty labels are dropped.
pub fn normalize_labels<I, S>(labels: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .map(|l| l.as_ref().trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Add or remove the attachment label so it matches `has_attachment`.
pub fn sync_attachment_label(labels: &mut BTreeSet<String>, has_attachment: bool) {
    if has_attachment {
        labels.insert(ATTACHMENT_LABEL.to_string());
    } else {
        labels.remove(ATTACHMENT_LABEL);
    }
}
