//! Storage: backend contracts, key-value stores, the message store, and
//! random access to raw mbox messages.

pub mod backend;
pub mod kv;
pub mod mailstore;
pub mod reader;

pub use mailstore::Store;
