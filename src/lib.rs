//! `mboxstore`: ingest MBOX archives into a searchable, labelled store.
//!
//! This crate provides the core library for splitting MBOX streams,
//! decoding messages into indexable text, and keeping a full-text index and
//! a metadata store in step under label changes and paginated queries.

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod parser;
pub mod search;
pub mod store;
