//! `Date` header resolution.
//!
//! A message always gets a timestamp: anything that cannot be read as a
//! date resolves to [`EPOCH_SENTINEL`] instead of failing the message.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

/// Timestamp used for a missing or unparsable `Date` header.
pub const EPOCH_SENTINEL: DateTime<Utc> = DateTime::UNIX_EPOCH;

/// Zoned layouts tried after token normalization.
const ZONED_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%Y-%m-%d %H:%M:%S %z",
];

/// Layouts without a zone, read as UTC. `%b %d %H:%M:%S %Y` is the asctime
/// form found on mbox envelope lines.
const NAIVE_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S",
];

const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Resolve a decoded `Date` header value to a timestamp.
///
/// Never fails: an absent, blank, or unreadable value yields
/// [`EPOCH_SENTINEL`].
pub fn resolve_date(value: Option<&str>) -> DateTime<Utc> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return EPOCH_SENTINEL;
    };
    parse_date(value).unwrap_or_else(|| {
        warn!(date = value, "Unparsable date, using the epoch");
        EPOCH_SENTINEL
    })
}

/// Parse a date in RFC 2822 or RFC 3339 form, or one of the usual broken
/// variants: a stray weekday, `16-JUL-2025` IMAP dates, asctime order,
/// zone names chrono does not know, trailing `(comments)`.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_normalized(&normalize(value)))
        .or_else(|| mail_parser_date(value))
}

fn parse_normalized(text: &str) -> Option<DateTime<Utc>> {
    ZONED_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|ndt| ndt.and_utc())
        })
}

/// Rewrite a date token by token into something the fixed layouts accept.
fn normalize(value: &str) -> String {
    let mut tokens: Vec<String> = Vec::new();
    let mut in_comment = false;
    for token in value.split_whitespace() {
        if in_comment || token.starts_with('(') {
            in_comment = !token.ends_with(')');
            continue;
        }
        let bare = token.trim_end_matches(',');
        if is_weekday(bare) {
            continue;
        }
        if let Some(offset) = zone_offset(bare) {
            tokens.push(offset.to_string());
        } else if let Some(parts) = split_imap_date(bare) {
            tokens.extend(parts);
        } else if bare.starts_with(|c: char| c.is_ascii_digit()) {
            // ISO date and time glued by `T`
            tokens.push(bare.replacen('T', " ", 1));
        } else {
            tokens.push(bare.to_string());
        }
    }
    tokens.join(" ")
}

fn is_weekday(token: &str) -> bool {
    token.is_char_boundary(3)
        && token.chars().all(|c| c.is_ascii_alphabetic())
        && WEEKDAYS.iter().any(|day| token[..3].eq_ignore_ascii_case(day))
}

/// `16-JUL-2025` → `["16", "Jul", "2025"]`.
fn split_imap_date(token: &str) -> Option<Vec<String>> {
    let mut parts = token.split('-');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let month = MONTHS.iter().find(|m| m.eq_ignore_ascii_case(month))?;
    Some(vec![day.to_string(), month.to_string(), year.to_string()])
}

/// Numeric offset for zone names seen in the wild.
fn zone_offset(name: &str) -> Option<&'static str> {
    let offset = match name.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" | "WET" => "+0000",
        "BST" | "CET" | "WEST" => "+0100",
        "CEST" | "EET" => "+0200",
        "EEST" | "MSK" => "+0300",
        "IST" => "+0530",
        "JST" | "KST" => "+0900",
        "AEST" => "+1000",
        "EST" | "CDT" => "-0500",
        "EDT" => "-0400",
        "CST" | "MDT" => "-0600",
        "MST" | "PDT" => "-0700",
        "PST" => "-0800",
        _ => return None,
    };
    Some(offset)
}

/// Hand the value to `mail-parser`, which knows a few more oddities.
fn mail_parser_date(value: &str) -> Option<DateTime<Utc>> {
    let raw = format!("Date: {value}\n\n");
    let message = mail_parser::MessageParser::default().parse(raw.as_bytes())?;
    let stamp = message.date()?.to_timestamp();
    DateTime::from_timestamp(stamp, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(value: &str) -> String {
        parse_date(value).unwrap().to_rfc3339()
    }

    #[test]
    fn test_rfc2822_and_rfc3339() {
        assert_eq!(utc("Thu, 04 Jan 2024 10:00:00 +0000"), "2024-01-04T10:00:00+00:00");
        assert_eq!(utc("Thu, 04 Jan 2024 10:00:00 EST"), "2024-01-04T15:00:00+00:00");
        assert_eq!(utc("2024-01-04T10:00:00Z"), "2024-01-04T10:00:00+00:00");
    }

    #[test]
    fn test_zone_names_are_matched_whole() {
        assert_eq!(utc("Tue, 2 Jan 2024 09:30:00 CEST"), "2024-01-02T07:30:00+00:00");
        assert_eq!(utc("2 Jan 2024 09:30:00 cet"), "2024-01-02T08:30:00+00:00");
    }

    #[test]
    fn test_broken_variants() {
        assert_eq!(utc("16-JUL-2025 03:01:03"), "2025-07-16T03:01:03+00:00");
        assert_eq!(utc("Mon Jan  1 10:00:00 2024"), "2024-01-01T10:00:00+00:00");
        assert_eq!(
            utc("Fri 5 Jan 2024 12:00:00 +0100 (Romance Standard Time)"),
            "2024-01-05T11:00:00+00:00"
        );
    }

    #[test]
    fn test_resolve_date_falls_back_to_epoch() {
        assert_eq!(resolve_date(None), EPOCH_SENTINEL);
        assert_eq!(resolve_date(Some("   ")), EPOCH_SENTINEL);
        assert_eq!(resolve_date(Some("not a date at all")), EPOCH_SENTINEL);
        assert_eq!(
            resolve_date(Some("Mon, 1 Jan 2024 10:00:00 +0000")).to_rfc3339(),
            "2024-01-01T10:00:00+00:00"
        );
    }
}
