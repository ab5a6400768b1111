//! MIME structure: a recursive part tree built straight from raw bytes,
//! transfer decoding, and flattening into indexable leaves.

use crate::model::message::MimeLeaf;
use crate::parser::decoder;
use crate::parser::header::{
    collapse_whitespace, decode_header, header_param, split_header_block, HeaderMap,
};

/// Maximum nesting depth for multipart descent (adversarial input guard).
/// Deeper multiparts are treated as opaque leaves.
pub const MAX_DEPTH: usize = 10;

/// Charset assumed for text parts that do not declare one.
const DEFAULT_CHARSET: &str = "US-ASCII";

/// One node of a message's MIME tree.
#[derive(Debug, Clone)]
pub struct MimeNode {
    headers: HeaderMap,
    body: MimeBody,
}

/// Payload of a [`MimeNode`].
#[derive(Debug, Clone)]
pub enum MimeBody {
    /// Child parts of a multipart container, in order.
    Multipart(Vec<MimeNode>),
    /// Still transfer-encoded leaf content.
    Leaf(Vec<u8>),
}

impl MimeNode {
    /// Parse a complete message or part (headers, blank line, body).
    pub fn parse(raw: &[u8]) -> Self {
        Self::parse_at_depth(raw, 0)
    }

    fn parse_at_depth(raw: &[u8], depth: usize) -> Self {
        let (head, body) = split_header_block(raw);
        let headers = HeaderMap::parse(head);

        let content_type = headers.get_text("content-type").unwrap_or_default();
        if depth < MAX_DEPTH && content_type.to_ascii_lowercase().starts_with("multipart/") {
            if let Some(boundary) = header_param(&content_type, "boundary") {
                let children: Vec<MimeNode> = split_multipart(body, &boundary)
                    .into_iter()
                    .map(|part| Self::parse_at_depth(part, depth + 1))
                    .collect();
                if !children.is_empty() {
                    return Self {
                        headers,
                        body: MimeBody::Multipart(children),
                    };
                }
            }
        }

        Self {
            headers,
            body: MimeBody::Leaf(body.to_vec()),
        }
    }

    /// Header fields of this node.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body of this node.
    pub fn body(&self) -> &MimeBody {
        &self.body
    }

    /// True if this node holds child parts.
    pub fn is_multipart(&self) -> bool {
        matches!(self.body, MimeBody::Multipart(_))
    }

    /// Full `Content-Type` value (parameters included), whitespace-normalized.
    /// Defaults to `text/plain`.
    pub fn content_type(&self) -> String {
        self.headers
            .get_text("content-type")
            .map(|ct| collapse_whitespace(&ct))
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    /// Filename from `Content-Disposition`, else from the `Content-Type`
    /// `name` parameter. Encoded-words are decoded.
    pub fn filename(&self) -> Option<String> {
        let from_disposition = self
            .headers
            .get_text("content-disposition")
            .and_then(|cd| header_param(&cd, "filename"));
        let raw = from_disposition.or_else(|| header_param(&self.content_type(), "name"))?;
        let decoded = decode_header(&raw);
        (!decoded.is_empty()).then_some(decoded)
    }

    /// Leaf content with `Content-Transfer-Encoding` undone. Empty for
    /// multipart nodes.
    pub fn decoded_content(&self) -> Vec<u8> {
        let MimeBody::Leaf(raw) = &self.body else {
            return Vec::new();
        };
        let encoding = self
            .headers
            .get_text("content-transfer-encoding")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match encoding.as_str() {
            "base64" => decoder::decode_base64(raw),
            "quoted-printable" => decoder::decode_quoted_printable(raw),
            _ => raw.clone(),
        }
    }

    /// Leaf content decoded and transcoded to UTF-8 from the declared
    /// charset (US-ASCII when none is declared).
    pub fn text_content(&self) -> String {
        let charset = header_param(&self.content_type(), "charset")
            .unwrap_or_else(|| DEFAULT_CHARSET.to_string());
        decoder::to_utf8(&charset, &self.decoded_content())
    }
}

/// True for `text/*` content types.
pub fn is_textual(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/")
}

/// Split a multipart body on its boundary lines.
///
/// The preamble and epilogue are dropped, as is the line break that
/// belongs to each delimiter. A missing close delimiter ends the last part
/// at the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let close = format!("--{boundary}--");

    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let next = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i + 1)
            .unwrap_or(body.len());
        let line = body[pos..next].trim_ascii_end();

        let is_close = line == close.as_bytes();
        if is_close || line == delimiter.as_bytes() {
            if let Some(start) = part_start {
                parts.push(strip_line_break(&body[start..pos]));
            }
            if is_close {
                return parts;
            }
            part_start = Some(next);
        }
        pos = next;
    }

    if let Some(start) = part_start {
        parts.push(&body[start..]);
    }
    parts
}

fn strip_line_break(part: &[u8]) -> &[u8] {
    let part = part.strip_suffix(b"\n").unwrap_or(part);
    part.strip_suffix(b"\r").unwrap_or(part)
}

/// Flatten a MIME tree into leaves.
///
/// For `multipart/alternative`, only one child is followed: the first whose
/// content type contains `preferred_type`, else the first child. Every
/// other multipart is walked in order. Leaf content is decoded only for
/// `text/*` parts; binary payloads are left alone.
pub fn flatten_mime(node: &MimeNode, preferred_type: &str) -> Vec<MimeLeaf> {
    match node.body() {
        MimeBody::Multipart(children) => {
            if node
                .content_type()
                .to_ascii_lowercase()
                .contains("multipart/alternative")
            {
                let preferred = preferred_type.to_ascii_lowercase();
                children
                    .iter()
                    .find(|child| child.content_type().to_ascii_lowercase().contains(&preferred))
                    .or_else(|| children.first())
                    .map(|target| flatten_mime(target, preferred_type))
                    .unwrap_or_default()
            } else {
                children
                    .iter()
                    .flat_map(|child| flatten_mime(child, preferred_type))
                    .collect()
            }
        }
        MimeBody::Leaf(_) => {
            let content_type = node.content_type();
            let content = is_textual(&content_type).then(|| node.text_content());
            vec![MimeLeaf {
                filename: node.filename(),
                content_type,
                content,
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &[u8] = b"Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
preamble\r\n\
--XX\r\n\
Content-Type: multipart/alternative; boundary=YY\r\n\
\r\n\
--YY\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>hi</p>\r\n\
--YY\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=E9\r\n\
--YY--\r\n\
--XX\r\n\
Content-Type: application/pdf; name=\"=?UTF-8?B?cmVwb3J0LnBkZg==?=\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--XX--\r\n\
epilogue\r\n";

    #[test]
    fn test_parse_tree_shape() {
        let root = MimeNode::parse(MIXED);
        let MimeBody::Multipart(children) = root.body() else {
            panic!("expected multipart root");
        };
        assert_eq!(children.len(), 2);
        assert!(children[0].is_multipart());
        assert!(!children[1].is_multipart());
        assert_eq!(children[1].decoded_content(), b"%PDF-");
    }

    #[test]
    fn test_flatten_prefers_plain_in_alternative() {
        let root = MimeNode::parse(MIXED);
        let leaves = flatten_mime(&root, "text/plain");
        assert_eq!(leaves.len(), 2);
        assert!(leaves[0].content_type.starts_with("text/plain"));
        assert_eq!(leaves[0].content.as_deref(), Some("café"));
        assert_eq!(leaves[0].filename, None);
        assert_eq!(leaves[1].filename.as_deref(), Some("report.pdf"));
        assert_eq!(leaves[1].content, None);
    }

    #[test]
    fn test_flatten_falls_back_to_first_alternative() {
        let root = MimeNode::parse(MIXED);
        let leaves = flatten_mime(&root, "text/enriched");
        assert!(leaves[0].content_type.starts_with("text/html"));
        assert_eq!(leaves[0].content.as_deref(), Some("<p>hi</p>"));
    }

    #[test]
    fn test_single_part_defaults() {
        let root = MimeNode::parse(b"Subject: x\n\nhello\n");
        assert_eq!(root.content_type(), "text/plain");
        let leaves = flatten_mime(&root, "text/plain");
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].content.as_deref(), Some("hello\n"));
    }

    #[test]
    fn test_disposition_filename_wins() {
        let raw = b"Content-Type: text/plain; name=ct.txt\n\
Content-Disposition: attachment; filename=\"cd.txt\"\n\nbody";
        assert_eq!(MimeNode::parse(raw).filename().as_deref(), Some("cd.txt"));
    }

    #[test]
    fn test_multipart_without_boundary_is_leaf() {
        let root = MimeNode::parse(b"Content-Type: multipart/mixed\n\nstuff\n");
        assert!(!root.is_multipart());
    }

    #[test]
    fn test_missing_close_delimiter() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\n\nfirst\n--b\n\nsecond\n";
        let leaves = flatten_mime(&MimeNode::parse(raw), "text/plain");
        let contents: Vec<_> = leaves.iter().filter_map(|l| l.content.as_deref()).collect();
        assert_eq!(contents, vec!["first", "second\n"]);
    }
}
