//! RFC 5322 header handling: block splitting, folding, decoding and
//! parameters.

use crate::parser::decoder;

/// Unfolded header fields of one message or MIME part.
///
/// Values are kept as raw bytes; use [`HeaderMap::get_text`] for an ASCII
/// view that never contains invalid text.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<u8>)>,
}

impl HeaderMap {
    /// Parse a header block, joining continuation lines onto the previous
    /// field. Lines that are neither a field nor a continuation are skipped.
    pub fn parse(block: &[u8]) -> Self {
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

        for line in block.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.starts_with(b" ") || line.starts_with(b"\t") {
                if let Some(last) = entries.last_mut() {
                    last.1.push(b' ');
                    last.1.extend_from_slice(line.trim_ascii());
                }
            } else if let Some(colon) = line.iter().position(|&b| b == b':') {
                let name = String::from_utf8_lossy(&line[..colon])
                    .trim()
                    .to_ascii_lowercase();
                let value = line[colon + 1..].trim_ascii().to_vec();
                entries.push((name, value));
            }
        }

        Self { entries }
    }

    /// Raw value of the first field with this name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Value of the first field with this name, transcoded from ASCII.
    ///
    /// Bytes with the high bit set come back as `\xHH` escapes.
    pub fn get_text(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| decoder::to_utf8("us-ascii", v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split raw bytes into `(header block, body)` at the first blank line.
///
/// Without a blank line everything is header and the body is empty.
pub fn split_header_block(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut pos = 0;
    while pos < raw.len() {
        let end = raw[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i + 1)
            .unwrap_or(raw.len());
        let line = &raw[pos..end];
        if line == b"\n" || line == b"\r\n" {
            return (&raw[..pos], &raw[end..]);
        }
        pos = end;
    }
    (raw, &[])
}

/// Decode a header value to clean UTF-8: resolve encoded-words, collapse
/// whitespace runs to single spaces, and trim.
pub fn decode_header(value: &str) -> String {
    if decoder::is_rfc2047_encoded(value) {
        collapse_whitespace(&decoder::decode_rfc2047(value))
    } else {
        collapse_whitespace(value)
    }
}

/// Collapse every whitespace run to one space and trim both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract a `name=value` parameter from a structured header value such as
/// `Content-Type` or `Content-Disposition`. Quoted values may contain `;`
/// and backslash escapes.
pub fn header_param(value: &str, name: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let needle = format!("{}=", name.to_ascii_lowercase());
    let mut search = 0;

    while let Some(rel) = lower[search..].find(&needle) {
        let idx = search + rel;
        let at_boundary = idx == 0 || matches!(lower.as_bytes()[idx - 1], b';' | b' ' | b'\t');
        if at_boundary {
            return param_value(&value[idx + needle.len()..]);
        }
        search = idx + needle.len();
    }
    None
}

fn param_value(rest: &str) -> Option<String> {
    let rest = rest.trim_start();
    let value = if let Some(quoted) = rest.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = quoted.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => break,
                _ => out.push(ch),
            }
        }
        out
    } else {
        rest.split(';').next().unwrap_or("").trim().to_string()
    };
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unfolds_continuations() {
        let block = b"Subject: This is a long\r\n\tsubject line\r\nFrom: user@example.com\r\n";
        let headers = HeaderMap::parse(block);
        assert_eq!(headers.len(), 2);
        assert_eq!(
            headers.get("subject"),
            Some(&b"This is a long subject line"[..])
        );
        assert_eq!(headers.get("FROM"), Some(&b"user@example.com"[..]));
        assert!(headers.get("to").is_none());
    }

    #[test]
    fn test_get_text_escapes_8bit() {
        let headers = HeaderMap::parse(b"Subject: caf\xe9\n");
        assert_eq!(headers.get_text("subject").as_deref(), Some("caf\\xe9"));
    }

    #[test]
    fn test_first_field_wins() {
        let headers = HeaderMap::parse(b"Received: one\nReceived: two\n");
        assert_eq!(headers.get("received"), Some(&b"one"[..]));
    }

    #[test]
    fn test_split_header_block() {
        let (head, body) = split_header_block(b"A: 1\r\nB: 2\r\n\r\nbody\n");
        assert_eq!(head, b"A: 1\r\nB: 2\r\n");
        assert_eq!(body, b"body\n");

        let (head, body) = split_header_block(b"A: 1\n");
        assert_eq!(head, b"A: 1\n");
        assert!(body.is_empty());
    }

    #[test]
    fn test_decode_header_collapses_whitespace() {
        assert_eq!(decode_header("  Hello \t  world  "), "Hello world");
        assert_eq!(
            decode_header("Re: =?UTF-8?Q?Caf=C3=A9?=   =?UTF-8?Q?_con_le=C3=B1a?="),
            "Re: Café con leña"
        );
    }

    #[test]
    fn test_header_param() {
        let ct = "multipart/mixed; boundary=\"abc; def\"; charset=utf-8";
        assert_eq!(header_param(ct, "boundary").as_deref(), Some("abc; def"));
        assert_eq!(header_param(ct, "charset").as_deref(), Some("utf-8"));
        assert_eq!(header_param(ct, "name"), None);
    }

    #[test]
    fn test_header_param_name_not_filename() {
        let cd = "attachment; filename=report.pdf";
        assert_eq!(header_param(cd, "name"), None);
        assert_eq!(header_param(cd, "filename").as_deref(), Some("report.pdf"));
        assert_eq!(
            header_param("text/plain; NAME=\"a \\\"b\\\"\"", "name").as_deref(),
            Some("a \"b\"")
        );
    }
}
