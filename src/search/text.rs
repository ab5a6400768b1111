//! Tokenization shared by indexing and query parsing.

/// Split text into lowercase index terms.
///
/// Any run of characters that are not letters or digits separates terms, so
/// `alice@example.com` becomes `alice`, `example`, `com`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
