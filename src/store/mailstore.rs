//! The message store: couples the full-text index with the metadata store.
//!
//! Every mutation writes to the index first and to the key-value store
//! second. There is no cross-backend transaction; a crash in between leaves
//! the two diverged and nothing here repairs it. Flushing follows the same
//! order, and dropping a [`Store`] flushes as [`Store::close`] does.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::index::MemoryIndex;
use crate::model::message::Message;
use crate::model::record::{
    normalize_labels, sync_attachment_label, DocId, DocRecord, DELETED_LABEL,
};
use crate::search::Query;
use crate::store::backend::{Entry, Index, KvStore};
use crate::store::kv::SqliteKv;

/// Index file name inside a store directory.
pub const INDEX_FILE: &str = "index.bin";

/// Record database file name inside a store directory.
pub const KV_FILE: &str = "store.db";

/// Ingests messages and answers paginated queries over them.
///
/// At most one query session is active at a time. Not synchronized: callers
/// serialize access.
pub struct Store<I: Index, K: KvStore> {
    index: I,
    kv: K,
    query: Option<Query>,
    index_time: Duration,
    store_time: Duration,
}

impl Store<MemoryIndex, SqliteKv> {
    /// Open (or create) an on-disk store in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        let index = MemoryIndex::open(dir.join(INDEX_FILE))?;
        let kv = SqliteKv::open(dir.join(KV_FILE))?;
        Ok(Self::new(index, kv))
    }
}

impl<I: Index, K: KvStore> Store<I, K> {
    /// Couple an index and a key-value store.
    pub fn new(index: I, kv: K) -> Self {
        Self {
            index,
            kv,
            query: None,
            index_time: Duration::ZERO,
            store_time: Duration::ZERO,
        }
    }

    /// Index `message` and persist its record. Returns the new document id.
    ///
    /// `offset` is where the message starts in its mbox stream and is
    /// required. Labels are lowercased and deduplicated; the `attachment`
    /// label is added or removed to match the message.
    pub fn add_message<L, S>(
        &mut self,
        message: &Message,
        offset: Option<u64>,
        labels: L,
    ) -> Result<DocId>
    where
        L: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let offset = offset
            .ok_or_else(|| StoreError::InvalidArgument("invalid offset: none".to_string()))?;

        let mut labels = normalize_labels(labels);
        sync_attachment_label(&mut labels, message.has_attachment());

        let start = Instant::now();
        let recipients: Vec<String> = message.recipients().map(|r| r.indexable_text()).collect();
        let mut entry = Entry::new();
        entry
            .add_string("msgid", message.msgid())
            .add_string("from", &message.from().indexable_text().to_lowercase())
            .add_string("to", &recipients.join(" ").to_lowercase())
            .add_string("subject", &message.subject().to_lowercase())
            .add_string("date", &message.date().to_string())
            .add_string("body", &message.indexable_text().to_lowercase());

        let doc_id = self.index.add_entry(&entry)?;
        for label in &labels {
            self.index.add_label(doc_id, label)?;
        }
        self.index_time += start.elapsed();

        let start = Instant::now();
        let mut record = DocRecord {
            doc_id,
            subject: message.subject().to_string(),
            date: message.date(),
            from: message.from().to_string(),
            to: message.recipients().map(|r| r.to_string()).collect(),
            has_attachment: message.has_attachment(),
            offset,
            starred: false,
            read: false,
            deleted: false,
            labels: Default::default(),
        };
        record.apply_labels(labels);
        self.kv.set(&record.key(), &record.to_bytes()?)?;
        self.store_time += start.elapsed();

        debug!(doc_id, offset, "Added message");
        Ok(doc_id)
    }

    /// Replace a document's labels.
    ///
    /// Only the difference against the stored labels reaches the index.
    /// Fails with [`StoreError::InvalidArgument`] for an unknown document.
    pub fn update_message_labels<L, S>(&mut self, doc_id: DocId, labels: L) -> Result<DocId>
    where
        L: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut record = self.docinfo(doc_id)?.ok_or_else(|| {
            StoreError::InvalidArgument(format!("cannot load docinfo for doc {doc_id}"))
        })?;

        let mut labels = normalize_labels(labels);
        sync_attachment_label(&mut labels, record.has_attachment);

        let start = Instant::now();
        for removed in record.labels.difference(&labels) {
            self.index.remove_label(doc_id, removed)?;
        }
        for added in labels.difference(&record.labels) {
            self.index.add_label(doc_id, added)?;
        }
        self.index_time += start.elapsed();

        let start = Instant::now();
        record.apply_labels(labels);
        self.kv.set(&record.key(), &record.to_bytes()?)?;
        self.store_time += start.elapsed();

        debug!(doc_id, labels = ?record.labels, "Updated labels");
        Ok(doc_id)
    }

    /// True if a message with this msgid hash is already indexed.
    pub fn contains_msgid(&self, msgid: &str) -> Result<bool> {
        let query = Query::term("msgid", &msgid.to_lowercase());
        Ok(self.index.count(&query)? > 0)
    }

    /// Start a new query session, discarding any current one. Deleted
    /// documents are always filtered out.
    pub fn set_query(&mut self, query: Query) -> Result<()> {
        if let Some(old) = self.query.take() {
            self.index.teardown_query(&old)?;
        }
        let query = query.and(Query::negate(Query::label(DELETED_LABEL)));
        self.index.setup_query(&query)?;
        debug!(query = %query, "Query session started");
        self.query = Some(query);
        Ok(())
    }

    /// The active query, deleted-filter included.
    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Next page of at most `max` records for the active query. Empty when
    /// the session is exhausted or none is active.
    pub fn load_results(&mut self, max: usize) -> Result<Vec<DocRecord>> {
        let Some(query) = &self.query else {
            return Ok(Vec::new());
        };

        let start = Instant::now();
        let doc_ids = self.index.run_query(query, max)?;
        let search_elapsed = start.elapsed();

        let mut results = Vec::with_capacity(doc_ids.len());
        for doc_id in doc_ids {
            match self.docinfo(doc_id)? {
                Some(record) => results.push(record),
                None => warn!(doc_id, "Indexed document has no stored record, skipping"),
            }
        }

        debug!(
            search_ms = search_elapsed.as_secs_f64() * 1000.0,
            total_ms = start.elapsed().as_secs_f64() * 1000.0,
            results = results.len(),
            "Loaded results"
        );
        Ok(results)
    }

    /// Total matches of the active query, or `None` without one.
    pub fn num_results(&self) -> Result<Option<u64>> {
        let Some(query) = &self.query else {
            return Ok(None);
        };
        let start = Instant::now();
        let count = self.index.count(query)?;
        debug!(
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            count, "Counted results"
        );
        Ok(Some(count))
    }

    /// Stored record of a document.
    pub fn docinfo(&self, doc_id: DocId) -> Result<Option<DocRecord>> {
        let key = DocRecord::key_for(doc_id);
        self.kv
            .get(&key)?
            .map(|bytes| DocRecord::from_bytes(&key, &bytes))
            .transpose()
    }

    /// Number of indexed documents.
    pub fn size(&self) -> u64 {
        self.index.size()
    }

    /// Persist both backends, index first.
    pub fn flush(&mut self) -> Result<()> {
        self.index.flush()?;
        self.kv.flush()
    }

    /// End any query session and flush, reporting flush errors that a
    /// plain drop would only log.
    pub fn close(mut self) -> Result<()> {
        if let Some(query) = self.query.take() {
            self.index.teardown_query(&query)?;
        }
        self.flush()
    }

    /// Time spent writing to the index since the last reset.
    pub fn index_time(&self) -> Duration {
        self.index_time
    }

    /// Time spent writing to the key-value store since the last reset.
    pub fn store_time(&self) -> Duration {
        self.store_time
    }

    pub fn reset_timers(&mut self) {
        self.index_time = Duration::ZERO;
        self.store_time = Duration::ZERO;
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }
}

impl<I: Index, K: KvStore> Drop for Store<I, K> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "Could not flush store on drop");
        }
    }
}
