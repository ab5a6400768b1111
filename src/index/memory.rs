//! In-memory positional index with optional file persistence.
//!
//! Every document keeps its own postings (field → term → positions) and its
//! label set. Queries are evaluated document by document, newest first, so
//! pagination is a descending cursor over document ids.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::index::format::{IndexHeader, HEADER_SIZE};
use crate::model::record::DocId;
use crate::search::text::tokenize;
use crate::search::Query;
use crate::store::backend::{Entry, Index};

/// Postings and labels of one document.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct IndexedDoc {
    /// field → term → ascending positions within the entry.
    postings: HashMap<String, HashMap<String, Vec<u32>>>,
    labels: BTreeSet<String>,
}

impl IndexedDoc {
    fn from_entry(entry: &Entry) -> Self {
        let mut postings: HashMap<String, HashMap<String, Vec<u32>>> = HashMap::new();
        let mut position: u32 = 0;
        for (field, text) in entry.fields() {
            let terms = postings.entry(field.to_string()).or_default();
            for word in tokenize(text) {
                terms.entry(word).or_default().push(position);
                position += 1;
            }
        }
        Self {
            postings,
            labels: BTreeSet::new(),
        }
    }

    fn positions(&self, field: &str, word: &str) -> Option<&[u32]> {
        self.postings
            .get(field)
            .and_then(|terms| terms.get(word))
            .map(Vec::as_slice)
    }

    fn matches(&self, query: &Query) -> bool {
        match query {
            Query::Term { field, word } => self.positions(field, word).is_some(),
            Query::Phrase { field, words } => self.matches_phrase(field, words),
            Query::Label(label) => self.labels.contains(label),
            Query::Not(inner) => !self.matches(inner),
            Query::And(parts) => parts.iter().all(|q| self.matches(q)),
            Query::Or(parts) => parts.iter().any(|q| self.matches(q)),
        }
    }

    fn matches_phrase(&self, field: &str, words: &[String]) -> bool {
        let Some((first, rest)) = words.split_first() else {
            return false;
        };
        let Some(starts) = self.positions(field, first) else {
            return false;
        };
        let Some(tails) = rest
            .iter()
            .map(|w| self.positions(field, w))
            .collect::<Option<Vec<_>>>()
        else {
            return false;
        };

        starts.iter().any(|&start| {
            tails.iter().enumerate().all(|(k, positions)| {
                positions.binary_search(&(start + k as u32 + 1)).is_ok()
            })
        })
    }

    /// Labels attached to this document.
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }
}

/// Pagination state of one query: the next document id to examine, or
/// `None` once exhausted.
#[derive(Debug, Clone, Copy)]
struct Session {
    cursor: Option<DocId>,
}

/// The bundled [`Index`] implementation.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    /// Document `n` lives at `docs[n - 1]`.
    docs: Vec<IndexedDoc>,
    sessions: HashMap<String, Session>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl MemoryIndex {
    /// Empty, non-persistent index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the index stored at `path`, or start an empty one that will be
    /// written there on [`Index::flush`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let docs = if path.exists() {
            load_docs(&path)?
        } else {
            debug!(path = %path.display(), "No index file yet, starting empty");
            Vec::new()
        };
        Ok(Self {
            docs,
            sessions: HashMap::new(),
            path: Some(path),
            dirty: false,
        })
    }

    /// Labels of a document, if it exists.
    pub fn labels(&self, doc_id: DocId) -> Option<&BTreeSet<String>> {
        self.doc(doc_id).map(IndexedDoc::labels)
    }

    fn doc(&self, doc_id: DocId) -> Option<&IndexedDoc> {
        let idx = usize::try_from(doc_id).ok()?.checked_sub(1)?;
        self.docs.get(idx)
    }

    fn doc_mut(&mut self, doc_id: DocId) -> Result<&mut IndexedDoc> {
        let idx = usize::try_from(doc_id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .filter(|&idx| idx < self.docs.len())
            .ok_or_else(|| StoreError::InvalidArgument(format!("no such document {doc_id}")))?;
        Ok(&mut self.docs[idx])
    }

    fn newest_id(&self) -> Option<DocId> {
        (!self.docs.is_empty()).then_some(self.docs.len() as DocId)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let start = Instant::now();
        let header_bytes = bincode::serialize(&IndexHeader::new(self.docs.len() as u64))
            .map_err(|e| invalid_index(path, format!("Header serialization failed: {e}")))?;
        let docs_bytes = bincode::serialize(&self.docs)
            .map_err(|e| invalid_index(path, format!("Document serialization failed: {e}")))?;

        let mut padded_header = vec![0u8; HEADER_SIZE];
        let copy_len = header_bytes.len().min(HEADER_SIZE);
        padded_header[..copy_len].copy_from_slice(&header_bytes[..copy_len]);

        // Write beside the target, then rename over it.
        let tmp_path = path.with_extension("tmp");
        let mut file = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        file.write_all(&padded_header)
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        file.write_all(&docs_bytes)
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp_path, e))?;
        std::fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))?;

        info!(
            path = %path.display(),
            docs = self.docs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Index written"
        );
        Ok(())
    }
}

fn invalid_index(path: &Path, reason: String) -> StoreError {
    StoreError::InvalidIndex {
        path: path.to_path_buf(),
        reason,
    }
}

fn load_docs(path: &Path) -> Result<Vec<IndexedDoc>> {
    let data = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
    if data.len() < HEADER_SIZE {
        return Err(invalid_index(path, "Index file too small".to_string()));
    }

    let header: IndexHeader = bincode::deserialize(&data[..HEADER_SIZE])
        .map_err(|e| invalid_index(path, format!("Header deserialization failed: {e}")))?;
    header.validate().map_err(|reason| invalid_index(path, reason))?;

    let docs: Vec<IndexedDoc> = bincode::deserialize(&data[HEADER_SIZE..])
        .map_err(|e| invalid_index(path, format!("Document deserialization failed: {e}")))?;
    if docs.len() as u64 != header.doc_count {
        return Err(invalid_index(path, "Document count mismatch".to_string()));
    }

    debug!(path = %path.display(), docs = docs.len(), "Loaded index");
    Ok(docs)
}

impl Index for MemoryIndex {
    fn add_entry(&mut self, entry: &Entry) -> Result<DocId> {
        self.docs.push(IndexedDoc::from_entry(entry));
        self.dirty = true;
        Ok(self.docs.len() as DocId)
    }

    fn add_label(&mut self, doc_id: DocId, label: &str) -> Result<()> {
        self.doc_mut(doc_id)?.labels.insert(label.to_string());
        self.dirty = true;
        Ok(())
    }

    fn remove_label(&mut self, doc_id: DocId, label: &str) -> Result<()> {
        self.doc_mut(doc_id)?.labels.remove(label);
        self.dirty = true;
        Ok(())
    }

    fn count(&self, query: &Query) -> Result<u64> {
        Ok(self.docs.iter().filter(|doc| doc.matches(query)).count() as u64)
    }

    fn setup_query(&mut self, query: &Query) -> Result<()> {
        let cursor = self.newest_id();
        self.sessions.insert(query.to_string(), Session { cursor });
        Ok(())
    }

    fn run_query(&mut self, query: &Query, max: usize) -> Result<Vec<DocId>> {
        let key = query.to_string();
        let mut cursor = self
            .sessions
            .get(&key)
            .ok_or_else(|| StoreError::InvalidArgument(format!("query {key} is not set up")))?
            .cursor;

        let mut results = Vec::new();
        while results.len() < max {
            let Some(doc_id) = cursor else {
                break;
            };
            if self.doc(doc_id).is_some_and(|doc| doc.matches(query)) {
                results.push(doc_id);
            }
            cursor = doc_id.checked_sub(1).filter(|&id| id > 0);
        }

        if let Some(session) = self.sessions.get_mut(&key) {
            session.cursor = cursor;
        }
        Ok(results)
    }

    fn teardown_query(&mut self, query: &Query) -> Result<()> {
        self.sessions.remove(&query.to_string());
        Ok(())
    }

    fn size(&self) -> u64 {
        self.docs.len() as u64
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(path) = &self.path {
            self.save(path)?;
        }
        self.dirty = false;
        Ok(())
    }
}
