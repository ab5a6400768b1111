//! Email address parsing from free-form header text.

/// A parsed email address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`,
///   `address = "juan@ejemplo.com"`, `handle = "juan"`
/// - `"user@example.com"` → `display_name = ""`, `address = "user@example.com"`,
///   `handle = "user"`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Address {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`), or the raw text when no
    /// address could be recognized.
    pub address: String,
    /// Local part of the address (before the `@`). Empty when unrecognized.
    pub handle: String,
}

impl Address {
    /// Parse a single address. Returns `None` for empty input.
    ///
    /// Formats are tried in this order:
    /// - `"Display, Name" <user@domain.com>` (double or single quotes)
    /// - `Display Name <user@domain.com>`
    /// - `<user@domain.com>`
    /// - `user@domain.com` anywhere in the text
    ///
    /// Anything else is kept whole as the address with an empty name.
    pub fn parse(raw: &str) -> Option<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        let parsed = quoted_name_address(text)
            .or_else(|| named_angle_address(text))
            .or_else(|| {
                bare_angle_address(text)
                    .map(|(address, handle)| (String::new(), address, handle))
            })
            .or_else(|| {
                bare_address_token(text).map(|(address, handle)| (String::new(), address, handle))
            });

        let (display_name, address, handle) =
            parsed.unwrap_or_else(|| (String::new(), text.to_string(), String::new()));
        Some(Self {
            display_name,
            address,
            handle,
        })
    }

    /// Parse a comma-separated list of addresses.
    ///
    /// Tabs and line breaks become spaces. Commas inside a double-quoted
    /// display name do not split: `"Last, First" <a@b.com>, other@c.com`
    /// gives two addresses.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        if raw.trim().is_empty() {
            return Vec::new();
        }
        let normalized = collapse_line_breaks(raw);
        split_unquoted_commas(&normalized)
            .into_iter()
            .filter_map(Self::parse)
            .collect()
    }

    /// Text fed to the index for this address: name, address and handle.
    pub fn indexable_text(&self) -> String {
        format!("{} {} {}", self.display_name, self.address, self.handle)
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Match `<local@domain>` at the start of `s`, returning address and handle.
fn angle_address_at(s: &str) -> Option<(String, String)> {
    if !s.starts_with('<') {
        return None;
    }
    let close = s.find('>')?;
    let inner = &s[1..close];
    if inner.chars().any(char::is_whitespace) {
        return None;
    }
    let (local, domain) = inner.split_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some((inner.to_string(), local.to_string()))
}

/// `"Name" <addr>` or `'Name' <addr>`, with optional whitespace between.
fn quoted_name_address(text: &str) -> Option<(String, String, String)> {
    for (open, quote) in text.char_indices().filter(|&(_, c)| matches!(c, '"' | '\'')) {
        let name_start = open + 1;
        let mut search = name_start;
        while let Some(rel) = text[search..].find(quote) {
            let close = search + rel;
            if close > name_start {
                let after = text[close + 1..].trim_start();
                if let Some((address, handle)) = angle_address_at(after) {
                    return Some((text[name_start..close].to_string(), address, handle));
                }
            }
            search = close + 1;
        }
    }
    None
}

/// `Name <addr>`: everything before the first valid angle address.
fn named_angle_address(text: &str) -> Option<(String, String, String)> {
    let (angle, address, handle) = first_angle_address(text)?;
    let name = text[..angle].trim_end();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), address, handle))
}

fn bare_angle_address(text: &str) -> Option<(String, String)> {
    first_angle_address(text).map(|(_, address, handle)| (address, handle))
}

fn first_angle_address(text: &str) -> Option<(usize, String, String)> {
    text.match_indices('<').find_map(|(idx, _)| {
        angle_address_at(&text[idx..]).map(|(address, handle)| (idx, address, handle))
    })
}

/// First whitespace-delimited token shaped like `local@domain`.
fn bare_address_token(text: &str) -> Option<(String, String)> {
    text.split_whitespace().find_map(|token| {
        token
            .match_indices('@')
            .find(|(at, _)| *at >= 1 && *at + 1 < token.len())
            .map(|(at, _)| (token.to_string(), token[..at].to_string()))
    })
}

fn collapse_line_breaks(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_break = false;
    for c in raw.chars() {
        if matches!(c, '\t' | '\r' | '\n') {
            if !in_break {
                out.push(' ');
            }
            in_break = true;
        } else {
            out.push(c);
            in_break = false;
        }
    }
    out
}

/// Split on commas followed by an even number of double quotes, i.e.
/// commas outside any balanced quoted span. Whitespace after a separating
/// comma is dropped.
fn split_unquoted_commas(s: &str) -> Vec<&str> {
    let mut quotes_after = s.bytes().filter(|&b| b == b'"').count();
    let mut segments = Vec::new();
    let mut start = 0;

    for (idx, b) in s.bytes().enumerate() {
        match b {
            b'"' => quotes_after -= 1,
            b',' if idx >= start && quotes_after % 2 == 0 => {
                segments.push(&s[start..idx]);
                start = idx + 1 + s[idx + 1..].len() - s[idx + 1..].trim_start().len();
            }
            _ => {}
        }
    }
    segments.push(&s[start..]);
    segments
}
