//! Email parsing: MBOX splitting, charset decoding, headers, dates, MIME
//! and messages.

pub mod date;
pub mod decoder;
pub mod header;
pub mod mbox;
pub mod message;
pub mod mime;
