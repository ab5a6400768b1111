//! Message parsing: required headers, addresses, date, and MIME tree.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::model::address::Address;
use crate::model::message::{Message, MessageFields};
use crate::parser::date::resolve_date;
use crate::parser::header::{decode_header, HeaderMap};
use crate::parser::mbox::is_mbox_break_line;
use crate::parser::mime::MimeNode;

/// Parse raw message bytes into a [`Message`].
///
/// A leading mbox `From ` line is skipped. `Message-ID` and `From` must be
/// present and non-blank after decoding; everything else is optional. An
/// absent or unparsable `Date` yields the Unix epoch.
pub fn parse_message(raw: &[u8]) -> Result<Message> {
    let raw = skip_envelope_line(raw);
    let mime = MimeNode::parse(raw);
    let headers = mime.headers();

    let message_id = required_header(headers, "message-id")?;
    let msgid = format!("{:x}", Sha256::digest(message_id.as_bytes()));

    let from_text = required_header(headers, "from")?;
    let from = Address::parse(&from_text)
        .ok_or_else(|| StoreError::InvalidMessage("blank 'from' header".to_string()))?;

    let date = resolve_date(headers.get_text("date").map(|d| decode_header(&d)).as_deref());

    let fields = MessageFields {
        msgid,
        from,
        to: address_list(headers, "to"),
        cc: address_list(headers, "cc"),
        bcc: address_list(headers, "bcc"),
        subject: headers
            .get_text("subject")
            .map(|s| decode_header(&s))
            .unwrap_or_default(),
        date,
    };
    debug!(msgid = %fields.msgid, "Parsed message");

    Ok(Message::from_parts(fields, mime))
}

fn skip_envelope_line(raw: &[u8]) -> &[u8] {
    let first_line_end = raw
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(raw.len());
    if is_mbox_break_line(&raw[..first_line_end]) {
        &raw[first_line_end..]
    } else {
        raw
    }
}

/// Decoded value of a header that must exist and be non-blank.
fn required_header(headers: &HeaderMap, name: &str) -> Result<String> {
    let raw = headers
        .get_text(name)
        .ok_or_else(|| StoreError::InvalidMessage(format!("missing '{name}' header")))?;
    let decoded = decode_header(&raw);
    if decoded.is_empty() {
        return Err(StoreError::InvalidMessage(format!("blank '{name}' header")));
    }
    Ok(decoded)
}

fn address_list(headers: &HeaderMap, name: &str) -> Vec<Address> {
    headers
        .get_text(name)
        .map(|v| Address::parse_list(&decode_header(&v)))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::date::EPOCH_SENTINEL;

    const SIMPLE: &[u8] = b"From alice@example.com Thu Jan  4 10:00:00 2024\n\
Message-ID: <abc@example.com>\n\
From: =?UTF-8?Q?Ren=C3=A9e?= <renee@example.com>\n\
To: \"Smith, John\" <j@x.com>, a@b.com\n\
Cc: carol@example.com\n\
Subject: Weekly   report\n\
Date: Thu, 4 Jan 2024 10:00:00 +0000\n\
\n\
Numbers 1234 and words -- here.\n";

    #[test]
    fn test_parse_simple_message() {
        let msg = parse_message(SIMPLE).unwrap();
        assert_eq!(msg.msgid().len(), 64);
        assert_eq!(
            msg.msgid(),
            format!("{:x}", Sha256::digest(b"<abc@example.com>"))
        );
        assert_eq!(msg.from().display_name, "Renée");
        assert_eq!(msg.from().address, "renee@example.com");
        assert_eq!(msg.to().len(), 2);
        assert_eq!(msg.cc()[0].address, "carol@example.com");
        assert!(msg.bcc().is_empty());
        assert_eq!(msg.subject(), "Weekly report");
        assert_eq!(msg.date().to_rfc3339(), "2024-01-04T10:00:00+00:00");
        assert_eq!(msg.recipients().count(), 3);
    }

    #[test]
    fn test_indexable_text_drops_non_word_tokens() {
        let msg = parse_message(SIMPLE).unwrap();
        let text = msg.indexable_text();
        assert!(text.contains("Weekly report Numbers and words here."));
        assert!(!text.contains("1234"));
        assert!(!text.contains("--"));
        assert!(!msg.has_attachment());
    }

    #[test]
    fn test_missing_and_blank_required_headers() {
        let no_from = b"Message-ID: <x@y>\nSubject: hi\n\nbody\n";
        match parse_message(no_from) {
            Err(StoreError::InvalidMessage(reason)) => assert!(reason.contains("from")),
            other => panic!("expected InvalidMessage, got {other:?}"),
        }

        let blank_id = b"Message-ID:   \nFrom: a@b.com\n\nbody\n";
        match parse_message(blank_id) {
            Err(StoreError::InvalidMessage(reason)) => assert!(reason.contains("blank")),
            other => panic!("expected InvalidMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_headers_default() {
        let msg = parse_message(b"Message-ID: <x@y>\nFrom: a@b.com\nDate: garbage\n\nhi\n").unwrap();
        assert!(msg.to().is_empty());
        assert_eq!(msg.subject(), "");
        assert_eq!(msg.date(), EPOCH_SENTINEL);
    }

    #[test]
    fn test_attachment_detection() {
        let raw = b"Message-ID: <m@x>\n\
From: a@b.com\n\
Content-Type: multipart/mixed; boundary=\"b1\"\n\
\n\
--b1\n\
Content-Type: text/plain\n\
\n\
see attached\n\
--b1\n\
Content-Type: application/octet-stream\n\
Content-Disposition: attachment; filename=\"notes.bin\"\n\
Content-Transfer-Encoding: base64\n\
\n\
AAEC\n\
--b1--\n";
        let msg = parse_message(raw).unwrap();
        assert!(msg.has_attachment());
        assert!(msg.indexable_text().ends_with("see attached notes.bin"));
        let parts = msg.mime_parts("text/plain");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].content, None);
    }
}
