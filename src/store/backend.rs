//! Contracts of the two backends a [`crate::store::mailstore::Store`] couples:
//! a full-text index and a key-value store.
//!
//! Neither contract offers transactions. Callers order their writes and
//! live with divergence if a process dies between the two.

use crate::error::Result;
use crate::model::record::DocId;
use crate::search::Query;

/// A structured document for the index: named fields of free text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    fields: Vec<(String, String)>,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` to `field`. The index tokenizes it.
    pub fn add_string(&mut self, field: &str, text: &str) -> &mut Self {
        self.fields.push((field.to_string(), text.to_string()));
        self
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(f, t)| (f.as_str(), t.as_str()))
    }
}

/// Full-text index service.
///
/// Query sessions are keyed by the query itself: `setup_query` opens one,
/// each `run_query` call returns the next page of document ids, and
/// `teardown_query` discards it.
pub trait Index {
    /// Index an entry and return its newly assigned document id.
    fn add_entry(&mut self, entry: &Entry) -> Result<DocId>;

    /// Attach a label to a document.
    fn add_label(&mut self, doc_id: DocId, label: &str) -> Result<()>;

    /// Detach a label from a document. Removing an absent label is a no-op.
    fn remove_label(&mut self, doc_id: DocId, label: &str) -> Result<()>;

    /// Number of documents matching `query`.
    fn count(&self, query: &Query) -> Result<u64>;

    /// Open a paginated session for `query`, resetting any existing one.
    fn setup_query(&mut self, query: &Query) -> Result<()>;

    /// Next page of at most `max` matching document ids.
    fn run_query(&mut self, query: &Query, max: usize) -> Result<Vec<DocId>>;

    /// Close the session for `query`.
    fn teardown_query(&mut self, query: &Query) -> Result<()>;

    /// Number of indexed documents.
    fn size(&self) -> u64;

    /// Persist pending changes, if the index is persistent.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Key-value store of byte blobs.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Persist pending changes, if the store is persistent.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
