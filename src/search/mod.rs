//! Search: the query language and the tokenizer it shares with the index.

pub mod query;
pub mod text;

pub use query::Query;

/// Field that unfielded query terms search by default.
///
/// The `body` field holds the message's full indexable text (sender,
/// recipients, subject, and textual parts), so it is the broadest match.
pub const DEFAULT_FIELD: &str = "body";
