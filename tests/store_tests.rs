//! Integration tests for the on-disk store: ingestion, reopening, queries,
//! label updates, and reading messages back by offset.

use std::path::{Path, PathBuf};

use mboxstore::model::message::Message;
use mboxstore::parser::mbox::{MboxSplitter, DEFAULT_READ_BUFFER_SIZE};
use mboxstore::search::{Query, DEFAULT_FIELD};
use mboxstore::store::reader::MessageReader;
use mboxstore::store::Store;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Add every valid, not-yet-seen message of `mbox` and return how many
/// were added.
fn ingest(dir: &Path, mbox: &Path) -> u64 {
    let mut store = Store::open(dir).unwrap();
    let mut splitter = MboxSplitter::open(mbox, DEFAULT_READ_BUFFER_SIZE).unwrap();
    let mut added = 0;
    for raw in splitter.messages().unwrap() {
        let raw = raw.unwrap();
        let Ok(message) = Message::parse(&raw.bytes) else {
            continue;
        };
        if store.contains_msgid(message.msgid()).unwrap() {
            continue;
        }
        store
            .add_message(&message, Some(raw.offset), ["inbox"])
            .unwrap();
        added += 1;
    }
    store.close().unwrap();
    added
}

fn search_ids(dir: &Path, query: &str) -> Vec<u64> {
    let mut store = Store::open(dir).unwrap();
    store
        .set_query(Query::parse(DEFAULT_FIELD, query).unwrap())
        .unwrap();
    store
        .load_results(100)
        .unwrap()
        .iter()
        .map(|r| r.doc_id)
        .collect()
}

#[test]
fn test_ingest_skips_invalid_and_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(ingest(dir.path(), &fixture("simple.mbox")), 3);

    let store = Store::open(dir.path()).unwrap();
    assert_eq!(store.size(), 3);
}

#[test]
fn test_reingest_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    ingest(dir.path(), &fixture("simple.mbox"));
    assert_eq!(ingest(dir.path(), &fixture("simple.mbox")), 0);
    assert_eq!(Store::open(dir.path()).unwrap().size(), 3);
}

#[test]
fn test_queries_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    ingest(dir.path(), &fixture("simple.mbox"));

    assert_eq!(search_ids(dir.path(), "budget"), vec![1]);
    assert_eq!(search_ids(dir.path(), "from:alice"), vec![2]);
    assert_eq!(search_ids(dir.path(), "~attachment"), vec![2]);
    assert_eq!(search_ids(dir.path(), "café"), vec![3]);
    assert_eq!(search_ids(dir.path(), "~inbox"), vec![3, 2, 1]);
    assert!(search_ids(dir.path(), "nonexistentword").is_empty());
}

#[test]
fn test_records_carry_metadata_and_labels() {
    let dir = tempfile::tempdir().unwrap();
    ingest(dir.path(), &fixture("simple.mbox"));

    let store = Store::open(dir.path()).unwrap();
    let record = store.docinfo(2).unwrap().unwrap();
    assert_eq!(record.subject, "Quarterly report");
    assert_eq!(record.from, "Alice Smith <alice@example.com>");
    assert!(record.has_attachment);
    assert!(record.labels.contains("inbox"));
    assert!(record.labels.contains("attachment"));
    assert!(store.docinfo(99).unwrap().is_none());
}

#[test]
fn test_paginated_results() {
    let dir = tempfile::tempdir().unwrap();
    ingest(dir.path(), &fixture("simple.mbox"));

    let mut store = Store::open(dir.path()).unwrap();
    store
        .set_query(Query::parse(DEFAULT_FIELD, "~inbox").unwrap())
        .unwrap();
    assert_eq!(store.num_results().unwrap(), Some(3));

    let first: Vec<_> = store.load_results(2).unwrap().iter().map(|r| r.doc_id).collect();
    let second: Vec<_> = store.load_results(2).unwrap().iter().map(|r| r.doc_id).collect();
    assert_eq!(first, vec![3, 2]);
    assert_eq!(second, vec![1]);
    assert!(store.load_results(2).unwrap().is_empty());
}

#[test]
fn test_label_updates_persist_and_hide_deleted() {
    let dir = tempfile::tempdir().unwrap();
    ingest(dir.path(), &fixture("simple.mbox"));

    {
        let mut store = Store::open(dir.path()).unwrap();
        store
            .update_message_labels(1, ["Starred", "deleted"])
            .unwrap();
        store.update_message_labels(2, ["read"]).unwrap();
        store.close().unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let first = store.docinfo(1).unwrap().unwrap();
    assert!(first.starred);
    assert!(first.deleted);
    let second = store.docinfo(2).unwrap().unwrap();
    assert!(second.read);
    assert!(!second.labels.contains("inbox"));
    // The attachment label follows the message, not the caller.
    assert!(second.labels.contains("attachment"));
    drop(store);

    assert!(search_ids(dir.path(), "budget").is_empty());
    assert_eq!(search_ids(dir.path(), "~read"), vec![2]);
    assert_eq!(search_ids(dir.path(), "~inbox"), vec![3]);
}

#[test]
fn test_offsets_reopen_the_original_message() {
    let dir = tempfile::tempdir().unwrap();
    let mbox = fixture("simple.mbox");
    ingest(dir.path(), &mbox);

    let store = Store::open(dir.path()).unwrap();
    let mut reader = MessageReader::open(&mbox).unwrap();
    for doc_id in 1..=3 {
        let record = store.docinfo(doc_id).unwrap().unwrap();
        let message = reader.message(record.offset).unwrap();
        assert_eq!(message.subject(), record.subject);
        assert_eq!(message.from().to_string(), record.from);
    }
}

#[test]
fn test_dropped_store_keeps_index_and_records_in_step() {
    let dir = tempfile::tempdir().unwrap();
    let messages: Vec<Message> = {
        let mut splitter =
            MboxSplitter::open(fixture("simple.mbox"), DEFAULT_READ_BUFFER_SIZE).unwrap();
        let parsed: Vec<Message> = splitter
            .messages()
            .unwrap()
            .filter_map(|raw| Message::parse(&raw.unwrap().bytes).ok())
            .collect();
        parsed
    };

    {
        let mut store = Store::open(dir.path()).unwrap();
        store.add_message(&messages[0], Some(0), ["inbox"]).unwrap();
        // Dropped without close().
    }

    let mut store = Store::open(dir.path()).unwrap();
    assert_eq!(store.size(), 1);
    assert_eq!(store.docinfo(1).unwrap().unwrap().subject, "Hello World");
    // Ids already handed out are never reused.
    let next = store.add_message(&messages[1], Some(1), ["inbox"]).unwrap();
    assert_eq!(next, 2);
    assert_eq!(store.docinfo(1).unwrap().unwrap().subject, "Hello World");
}
