//! The parsed, indexable email message.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};

use super::address::Address;
use crate::error::Result;
use crate::parser::mime::{self, MimeNode};

/// Content type preferred when walking `multipart/alternative` for indexing.
pub const INDEX_PREFERRED_TYPE: &str = "text/plain";

/// One leaf of a flattened MIME tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MimeLeaf {
    /// Full `Content-Type` value, parameters included.
    pub content_type: String,
    /// Attachment filename, if the part declares one.
    pub filename: Option<String>,
    /// Decoded UTF-8 text. Only present for `text/*` parts.
    pub content: Option<String>,
}

/// A parsed email message.
///
/// Built once by [`Message::parse`] and immutable afterwards. The indexable
/// text and the attachment flag are computed on first access and cached.
#[derive(Debug)]
pub struct Message {
    msgid: String,
    from: Address,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    subject: String,
    date: DateTime<Utc>,
    mime: MimeNode,
    plain_parts: OnceLock<Vec<MimeLeaf>>,
    indexable_text: OnceLock<String>,
    has_attachment: OnceLock<bool>,
}

/// Header-level fields of a message, as extracted by the parser.
#[derive(Debug)]
pub(crate) struct MessageFields {
    pub msgid: String,
    pub from: Address,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub subject: String,
    pub date: DateTime<Utc>,
}

impl Message {
    /// Parse raw RFC 822 bytes (an optional leading `From ` line is skipped).
    ///
    /// Fails with [`crate::error::StoreError::InvalidMessage`] when the
    /// `Message-ID` or `From` header is missing or blank.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        crate::parser::message::parse_message(raw)
    }

    pub(crate) fn from_parts(fields: MessageFields, mime: MimeNode) -> Self {
        Self {
            msgid: fields.msgid,
            from: fields.from,
            to: fields.to,
            cc: fields.cc,
            bcc: fields.bcc,
            subject: fields.subject,
            date: fields.date,
            mime,
            plain_parts: OnceLock::new(),
            indexable_text: OnceLock::new(),
            has_attachment: OnceLock::new(),
        }
    }

    /// Lowercase hex SHA-256 of the decoded `Message-ID` header.
    pub fn msgid(&self) -> &str {
        &self.msgid
    }

    pub fn from(&self) -> &Address {
        &self.from
    }

    pub fn to(&self) -> &[Address] {
        &self.to
    }

    pub fn cc(&self) -> &[Address] {
        &self.cc
    }

    pub fn bcc(&self) -> &[Address] {
        &self.bcc
    }

    /// Decoded subject, empty when the header is absent.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Parsed date; the Unix epoch when the header is missing or unparsable.
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// All recipients: `To`, then `Cc`, then `Bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// Root of the MIME tree.
    pub fn mime_root(&self) -> &MimeNode {
        &self.mime
    }

    /// Flattened MIME leaves, following `preferred_type` through
    /// `multipart/alternative` containers.
    pub fn mime_parts(&self, preferred_type: &str) -> Vec<MimeLeaf> {
        if preferred_type == INDEX_PREFERRED_TYPE {
            return self.plain_parts().to_vec();
        }
        mime::flatten_mime(&self.mime, preferred_type)
    }

    fn plain_parts(&self) -> &[MimeLeaf] {
        self.plain_parts
            .get_or_init(|| mime::flatten_mime(&self.mime, INDEX_PREFERRED_TYPE))
    }

    /// Everything searchable about the message as one string: sender,
    /// recipients, subject, and each leaf's filename or text. Tokens without
    /// a single letter are dropped and whitespace is collapsed.
    pub fn indexable_text(&self) -> &str {
        self.indexable_text.get_or_init(|| {
            let mut pieces: Vec<String> = vec![self.from.indexable_text()];
            pieces.extend(self.recipients().map(Address::indexable_text));
            pieces.push(self.subject.clone());
            for leaf in self.plain_parts() {
                if let Some(filename) = &leaf.filename {
                    pieces.push(filename.clone());
                } else if let Some(content) = &leaf.content {
                    pieces.push(content.clone());
                }
            }

            let joined = pieces.join(" ");
            joined
                .split_whitespace()
                .filter(|token| token.chars().any(char::is_alphabetic))
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    /// True if any leaf of the `text/plain` walk carries a filename.
    pub fn has_attachment(&self) -> bool {
        *self
            .has_attachment
            .get_or_init(|| self.plain_parts().iter().any(|leaf| leaf.filename.is_some()))
    }
}
