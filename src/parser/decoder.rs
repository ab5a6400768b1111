//! Charset normalization, never-failing transcoding, and RFC 2047 decoding.
//!
//! Mail in the wild routinely lies about its charset. Everything in here is
//! built around one guarantee: the caller always gets valid text back. When
//! the declared charset is unknown, unsupported, or simply wrong for the
//! bytes, the input is escaped byte-wise with [`force_to_ascii`] instead.

use std::borrow::Cow;

use base64::engine::{general_purpose::GeneralPurpose, DecodePaddingMode, GeneralPurposeConfig};
use base64::{alphabet, Engine as _};
use encoding_rs::Encoding;
use tracing::{debug, warn};

/// Base64 engine that tolerates missing padding and non-zero trailing bits,
/// both of which are common in encoded-words and UTF-7 shift sequences.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A charset label resolved to something we know how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Strict 7-bit ASCII: any byte with the high bit set is invalid.
    Ascii,
    /// RFC 2152 UTF-7.
    Utf7,
    /// Anything `encoding_rs` supports.
    Encoding(&'static Encoding),
}

/// Canonicalize a charset label as it appears in email headers.
///
/// Returns `None` for labels we cannot decode at all.
pub fn canonical_charset(label: &str) -> Option<Charset> {
    let lower = label.trim().trim_matches('"').to_ascii_lowercase();
    let squashed: String = lower
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .collect();

    if mentions_utf8(&lower) {
        return Some(Charset::Encoding(encoding_rs::UTF_8));
    }
    if is_latin1_alias(&lower) {
        return Some(Charset::Encoding(encoding_rs::WINDOWS_1252));
    }
    if squashed.contains("iso885915") {
        return Some(Charset::Encoding(encoding_rs::ISO_8859_15));
    }
    if squashed.contains("unicode11utf7") || squashed == "utf7" {
        return Some(Charset::Utf7);
    }
    if lower == "euc" {
        return Some(Charset::Encoding(encoding_rs::EUC_JP));
    }
    if lower == "x-unknown"
        || squashed == "unknown8bit"
        || squashed == "ascii7bit"
        || matches!(
            lower.as_str(),
            "ascii" | "us-ascii" | "ansi_x3.4-1968" | "iso646-us"
        )
    {
        return Some(Charset::Ascii);
    }

    Encoding::for_label(lower.as_bytes())
        .filter(|enc| *enc != encoding_rs::REPLACEMENT)
        .map(Charset::Encoding)
}

/// `UTF[-_ ]?8` anywhere in the label.
fn mentions_utf8(lower: &str) -> bool {
    lower.match_indices("utf").any(|(idx, _)| {
        let rest = &lower[idx + 3..];
        rest.starts_with('8')
            || (rest.starts_with(['-', '_', ' ']) && rest[1..].starts_with('8'))
    })
}

/// `(iso[-_ ])?latin[-_ ]?1` at the end of the label.
fn is_latin1_alias(lower: &str) -> bool {
    let Some(rest) = lower.strip_suffix('1') else {
        return false;
    };
    let rest = rest.strip_suffix(['-', '_', ' ']).unwrap_or(rest);
    rest.ends_with("latin")
}

/// Decode `bytes` as UTF-8 text, assuming they are in `charset`.
///
/// Never fails: falls back to [`force_to_ascii`] when the charset is unknown
/// or the bytes are invalid for it. Deterministic for a given input.
pub fn to_utf8(charset: &str, bytes: &[u8]) -> String {
    match decode_strict(charset, bytes) {
        Some(text) => text,
        None => force_to_ascii(bytes),
    }
}

/// Transcode `bytes` from `charset` into the `target` encoding.
///
/// Never fails. If the source cannot be decoded, or the decoded text has
/// characters the target cannot represent, the ascii-escaped form of the
/// original bytes is returned instead (valid in every ASCII-compatible
/// target). Targets without an encoder of their own (UTF-16) produce UTF-8,
/// as `encoding_rs` does.
pub fn transcode(target: &'static Encoding, charset: &str, bytes: &[u8]) -> Vec<u8> {
    let Some(text) = decode_strict(charset, bytes) else {
        return force_to_ascii(bytes).into_bytes();
    };
    if target == encoding_rs::UTF_8 {
        return text.into_bytes();
    }
    let (encoded, _, unmappable) = target.encode(&text);
    if unmappable {
        debug!(
            target = target.name(),
            "Text not representable in target charset, escaping"
        );
        force_to_ascii(bytes).into_bytes()
    } else {
        encoded.into_owned()
    }
}

fn decode_strict(charset: &str, bytes: &[u8]) -> Option<String> {
    let Some(resolved) = canonical_charset(charset) else {
        warn!(charset = charset, "Unknown charset, escaping high bytes");
        return None;
    };
    let decoded = match resolved {
        Charset::Ascii => bytes
            .is_ascii()
            .then(|| String::from_utf8_lossy(bytes).into_owned()),
        Charset::Utf7 => decode_utf7(bytes),
        Charset::Encoding(enc) => enc
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(Cow::into_owned),
    };
    if decoded.is_none() {
        debug!(
            charset = charset,
            len = bytes.len(),
            "Invalid byte sequence for declared charset, escaping"
        );
    }
    decoded
}

/// Last resort: every byte with the high bit set becomes a literal `\xHH`.
///
/// The output is pure ASCII, and running it through again changes nothing.
pub fn force_to_ascii(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b & 0x80 != 0 {
            out.push_str(&format!("\\x{b:x}"));
        } else {
            out.push(b as char);
        }
    }
    out
}

/// RFC 2152 UTF-7. `None` on malformed input.
fn decode_utf7(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if !b.is_ascii() {
            return None;
        }
        if b != b'+' {
            out.push(b as char);
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && is_base64_byte(bytes[end]) {
            end += 1;
        }
        if end == start {
            // "+-" is a literal plus
            out.push('+');
        } else {
            let raw = decode_base64(&bytes[start..end]);
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            out.push_str(&String::from_utf16(&units).ok()?);
        }
        i = end;
        if bytes.get(i) == Some(&b'-') {
            i += 1;
        }
    }
    Some(out)
}

fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

/// Lenient base64: skips whitespace and junk, stops at padding.
pub fn decode_base64(input: &[u8]) -> Vec<u8> {
    let mut clean: Vec<u8> = input
        .iter()
        .copied()
        .take_while(|&b| b != b'=')
        .filter(|&b| is_base64_byte(b))
        .collect();
    // A single dangling sextet cannot form a byte
    if clean.len() % 4 == 1 {
        clean.pop();
    }
    LENIENT_BASE64.decode(&clean).unwrap_or_default()
}

/// Quoted-printable: `=XX` escapes and `=` soft line breaks.
///
/// Malformed escapes are kept literally.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] != b'=' {
            out.push(input[i]);
            i += 1;
            continue;
        }
        let rest = &input[i + 1..];
        if rest.starts_with(b"\r\n") {
            i += 3;
        } else if rest.starts_with(b"\n") {
            i += 2;
        } else if let Some(byte) = rest.get(..2).and_then(hex_pair) {
            out.push(byte);
            i += 3;
        } else {
            out.push(b'=');
            i += 1;
        }
    }
    out
}

fn hex_pair(pair: &[u8]) -> Option<u8> {
    let hi = (pair[0] as char).to_digit(16)?;
    let lo = (pair[1] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

// ── RFC 2047 ────────────────────────────────────────────────────

/// One `=?charset?encoding?payload?=` token located in a string.
#[derive(Debug)]
struct EncodedWord<'a> {
    start: usize,
    end: usize,
    charset: &'a str,
    encoding: u8,
    payload: &'a str,
}

impl EncodedWord<'_> {
    fn decode_payload(&self) -> Vec<u8> {
        match self.encoding {
            b'B' | b'b' => decode_base64(self.payload.as_bytes()),
            // Q-encoding writes spaces as underscores
            _ => decode_quoted_printable(self.payload.replace('_', " ").as_bytes()),
        }
    }
}

fn is_charset_byte(b: u8) -> bool {
    matches!(b,
        b'!' | b'#'..=b'\'' | b'*' | b'+'..=b'/' | b'0'..=b'9' | b'A'..=b'Z'
        | b'\\' | b'^' | b'`' | b'a'..=b'z' | b'{'..=b'~')
}

fn is_payload_byte(b: u8) -> bool {
    (b'!'..=b'>').contains(&b) || (b'@'..=b'~').contains(&b)
}

/// Match an encoded word starting exactly at `start` (which points at `=?`).
fn match_encoded_word(text: &str, start: usize) -> Option<EncodedWord<'_>> {
    let bytes = text.as_bytes();
    let mut i = start + 2;

    let charset_start = i;
    while i < bytes.len() && is_charset_byte(bytes[i]) {
        i += 1;
    }
    if i == charset_start || bytes.get(i) != Some(&b'?') {
        return None;
    }
    let charset = &text[charset_start..i];
    i += 1;

    let encoding = *bytes.get(i)?;
    if !matches!(encoding, b'B' | b'b' | b'Q' | b'q') || bytes.get(i + 1) != Some(&b'?') {
        return None;
    }
    i += 2;

    let payload_start = i;
    while i < bytes.len() && is_payload_byte(bytes[i]) {
        i += 1;
    }
    if i == payload_start || !bytes[i..].starts_with(b"?=") {
        return None;
    }

    Some(EncodedWord {
        start,
        end: i + 2,
        charset,
        encoding,
        payload: &text[payload_start..i],
    })
}

fn next_encoded_word(text: &str, from: usize) -> Option<EncodedWord<'_>> {
    let mut pos = from;
    while let Some(rel) = text[pos..].find("=?") {
        let start = pos + rel;
        if let Some(word) = match_encoded_word(text, start) {
            return Some(word);
        }
        pos = start + 1;
    }
    None
}

/// True if `text` contains at least one RFC 2047 encoded word.
pub fn is_rfc2047_encoded(text: &str) -> bool {
    next_encoded_word(text, 0).is_some()
}

/// Decode every RFC 2047 encoded word in `text` into UTF-8.
///
/// Shorthand for [`decode_rfc2047_to`] with a UTF-8 target.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
pub fn decode_rfc2047(text: &str) -> String {
    let bytes = decode_rfc2047_to(encoding_rs::UTF_8, text);
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Decode every RFC 2047 encoded word in `text` into the `target` encoding.
///
/// Whitespace between adjacent encoded words is dropped (RFC 2047 §6.2).
/// Adjacent words declaring the same charset are transcoded as one byte run,
/// so a multi-byte character split across two words comes out whole.
/// Text outside encoded words is carried over, re-encoded for `target`.
/// Each run goes through [`transcode`], so this never fails.
pub fn decode_rfc2047_to(target: &'static Encoding, text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let plain = |out: &mut Vec<u8>, s: &str| {
        if s.is_ascii() || target == encoding_rs::UTF_8 {
            out.extend_from_slice(s.as_bytes());
        } else {
            out.extend(transcode(target, "utf-8", s.as_bytes()));
        }
    };
    let mut last_end = 0;
    let mut pending: Option<(&str, Vec<u8>)> = None;

    while let Some(word) = next_encoded_word(text, last_end) {
        let gap = &text[last_end..word.start];
        let payload = word.decode_payload();

        match pending.take() {
            Some((charset, mut bytes)) if gap.chars().all(|c| c.is_ascii_whitespace()) => {
                if charset.eq_ignore_ascii_case(word.charset) {
                    bytes.extend_from_slice(&payload);
                    pending = Some((charset, bytes));
                } else {
                    out.extend(transcode(target, charset, &bytes));
                    pending = Some((word.charset, payload));
                }
            }
            previous => {
                if let Some((charset, bytes)) = previous {
                    out.extend(transcode(target, charset, &bytes));
                }
                plain(&mut out, gap);
                pending = Some((word.charset, payload));
            }
        }
        last_end = word.end;
    }

    if let Some((charset, bytes)) = pending {
        out.extend(transcode(target, charset, &bytes));
    }
    plain(&mut out, &text[last_end..]);
    out
}
