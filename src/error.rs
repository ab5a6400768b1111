//! Centralized error types for mboxstore.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxstore library.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// A message lacks a required header, or the header is blank.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A caller passed an unusable argument (bad offset, unknown doc id, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A query string could not be parsed.
    #[error("Cannot parse query '{query}': {reason}")]
    QueryParse { query: String, reason: String },

    /// Persisted data could not be decoded.
    #[error("Corrupt data for '{what}': {reason}")]
    Corrupt { what: String, reason: String },

    /// SQLite error in the record store.
    #[error("Database error on '{path}': {source}")]
    Database {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// The index file is corrupt or was written by an incompatible version.
    #[error("Corrupt or incompatible index '{path}': {reason}")]
    InvalidIndex { path: PathBuf, reason: String },
}

/// Convenience alias for `Result<T, StoreError>`.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Database` variant from a path and a `rusqlite::Error`.
    pub fn db(path: impl Into<PathBuf>, source: rusqlite::Error) -> Self {
        Self::Database {
            path: path.into(),
            source,
        }
    }

    /// Create a `Corrupt` variant for a named record or file.
    pub fn corrupt(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (streams handed in by the caller).
impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<stream>"),
            source,
        }
    }
}
