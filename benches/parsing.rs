use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mboxstore::index::MemoryIndex;
use mboxstore::model::message::Message;
use mboxstore::parser::mbox::{MboxSplitter, DEFAULT_READ_BUFFER_SIZE};
use mboxstore::store::backend::{Entry, Index};
use mboxstore::store::kv::MemoryKv;
use mboxstore::store::Store;

fn fixture_messages() -> Vec<Vec<u8>> {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("simple.mbox");
    let mut splitter = MboxSplitter::open(&fixture_path, DEFAULT_READ_BUFFER_SIZE).unwrap();
    let messages = splitter
        .messages()
        .unwrap()
        .map(|m| m.unwrap().bytes)
        .collect();
    messages
}

fn bench_split_mbox(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("simple.mbox");

    c.bench_function("split_simple_mbox", |b| {
        b.iter(|| {
            let mut splitter =
                MboxSplitter::open(&fixture_path, DEFAULT_READ_BUFFER_SIZE).unwrap();
            splitter.messages().unwrap().count()
        })
    });
}

fn bench_parse_messages(c: &mut Criterion) {
    let raw = fixture_messages();

    c.bench_function("parse_and_extract_text", |b| {
        b.iter(|| {
            raw.iter()
                .filter_map(|bytes| Message::parse(bytes).ok())
                .map(|m| m.indexable_text().len())
                .sum::<usize>()
        })
    });
}

fn bench_add_to_memory_store(c: &mut Criterion) {
    let messages: Vec<Message> = fixture_messages()
        .iter()
        .filter_map(|bytes| Message::parse(bytes).ok())
        .collect();

    c.bench_function("add_to_memory_store", |b| {
        b.iter(|| {
            let mut store = Store::new(MemoryIndex::new(), MemoryKv::new());
            for (offset, message) in messages.iter().enumerate() {
                store
                    .add_message(message, Some(offset as u64), ["inbox"])
                    .unwrap();
            }
            store.size()
        })
    });

    let mut entry = Entry::new();
    entry.add_string("body", "quarterly report attached");
    c.bench_function("index_single_entry", |b| {
        b.iter(|| {
            let mut index = MemoryIndex::new();
            index.add_entry(&entry).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_split_mbox,
    bench_parse_messages,
    bench_add_to_memory_store
);
criterion_main!(benches);
