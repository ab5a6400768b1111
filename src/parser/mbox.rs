//! Streaming MBOX splitter.
//!
//! Reads an MBOX stream line by line and yields one raw message per
//! boundary. Never loads the whole stream into memory. Offsets are plain
//! byte positions, so any yielded offset can be handed back to
//! [`MboxSplitter::message_at`] later for random access.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use tracing::warn;

use crate::error::{Result, StoreError};

/// Default read buffer size (1 MB for fast sequential reads on modern SSDs).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// One message as cut out of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Byte offset of the message's boundary line (or of the stream start
    /// for a first message with no boundary line).
    pub offset: u64,
    /// Message bytes, boundary line excluded.
    pub bytes: Vec<u8>,
}

/// Splits an MBOX stream into raw messages.
///
/// The splitter is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the stream
pub struct MboxSplitter<R> {
    reader: R,
    max_message_size: usize,
}

impl MboxSplitter<BufReader<File>> {
    /// Open an MBOX file with the given read buffer size.
    pub fn open(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::FileNotFound(path.to_path_buf())
            } else {
                StoreError::io(path, e)
            }
        })?;
        Ok(Self::new(BufReader::with_capacity(buffer_size, file)))
    }
}

impl<R: BufRead + Seek> MboxSplitter<R> {
    /// Wrap a seekable stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Cap the size of a single message. Longer messages are truncated.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Iterate over the messages from the current stream position onward.
    pub fn messages(&mut self) -> Result<Messages<'_, R>> {
        let position = self.reader.stream_position()?;
        Ok(Messages {
            reader: &mut self.reader,
            max_message_size: self.max_message_size,
            position,
            start_offset: position,
            message: Vec::with_capacity(64 * 1024),
            line: Vec::with_capacity(4096),
            truncated: false,
            done: false,
        })
    }

    /// Seek to `offset` and return the first message found from there.
    ///
    /// Returns `None` when nothing but boundary lines (or nothing at all)
    /// follows the offset.
    pub fn message_at(&mut self, offset: u64) -> Result<Option<RawMessage>> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.messages()?.next().transpose()
    }

    /// Give back the wrapped stream.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Lazy iterator over the messages of an [`MboxSplitter`].
pub struct Messages<'a, R> {
    reader: &'a mut R,
    max_message_size: usize,
    position: u64,
    start_offset: u64,
    message: Vec<u8>,
    line: Vec<u8>,
    truncated: bool,
    done: bool,
}

impl<R: BufRead> Messages<'_, R> {
    fn take_message(&mut self, next_start: u64) -> Option<RawMessage> {
        let offset = self.start_offset;
        self.start_offset = next_start;
        self.truncated = false;
        if self.message.is_empty() {
            return None;
        }
        Some(RawMessage {
            offset,
            bytes: std::mem::take(&mut self.message),
        })
    }

    /// Append the current line unless the message is already cut. Once a
    /// line overflows, every later line of the message is dropped too, so a
    /// truncated message is always a prefix of the original.
    fn push_line(&mut self) {
        if self.truncated {
            return;
        }
        if self.message.len() + self.line.len() <= self.max_message_size {
            self.message.extend_from_slice(&self.line);
        } else {
            warn!(
                offset = self.start_offset,
                max_size = self.max_message_size,
                "Message exceeds maximum size, truncating body"
            );
            self.truncated = true;
        }
    }
}

impl<R: BufRead> Iterator for Messages<'_, R> {
    type Item = Result<RawMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line.clear();
            let line_start = self.position;
            let read = match self.reader.read_until(b'\n', &mut self.line) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            if read == 0 {
                self.done = true;
                return self.take_message(line_start).map(Ok);
            }
            self.position += read as u64;

            if is_mbox_break_line(&self.line) {
                if let Some(message) = self.take_message(line_start) {
                    return Some(Ok(message));
                }
            } else {
                self.push_line();
            }
        }
    }
}

/// Check whether a line is an MBOX boundary.
///
/// The line must read `From <token> <text> <dddd>`: a run of non-blank
/// characters, a space, at least one more character, a space and four
/// digits closing the line. No date grammar beyond that is checked.
pub fn is_mbox_break_line(line: &[u8]) -> bool {
    let line = line.strip_prefix(UTF8_BOM).unwrap_or(line);
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let Some(rest) = line.strip_prefix(b"From ") else {
        return false;
    };
    if rest.len() < 5 {
        return false;
    }

    let (head, year) = rest.split_at(rest.len() - 5);
    if year[0] != b' ' || !year[1..].iter().all(u8::is_ascii_digit) {
        return false;
    }

    match head.iter().position(u8::is_ascii_whitespace) {
        Some(space) => space >= 1 && head[space] == b' ' && head.len() > space + 1,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MBOX: &[u8] = b"From alice@example.com Thu Jan  4 10:00:00 2024\n\
Subject: one\n\
\n\
body one\n\
From bob@example.com Fri Jan  5 11:00:00 2024\r\n\
Subject: two\r\n\
\r\n\
From here on, not a boundary\r\n";

    fn split(bytes: &[u8]) -> Vec<RawMessage> {
        let mut splitter = MboxSplitter::new(Cursor::new(bytes.to_vec()));
        let messages: Result<Vec<_>> = splitter.messages().unwrap().collect();
        messages.unwrap()
    }

    #[test]
    fn test_is_mbox_break_line() {
        assert!(is_mbox_break_line(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(is_mbox_break_line(b"From a b 1999\r\n"));
        assert!(!is_mbox_break_line(b"from user@example.com x 2024\n"));
        assert!(!is_mbox_break_line(b">From user@example.com x 2024\n"));
        assert!(!is_mbox_break_line(b"From here on, not a boundary\n"));
        assert!(!is_mbox_break_line(b"From user@example.com 2024\n"));
        assert!(!is_mbox_break_line(b"From user x 12024x\n"));
        assert!(!is_mbox_break_line(b"From  user x 2024\n"));
    }

    #[test]
    fn test_break_line_with_bom() {
        let mut line = UTF8_BOM.to_vec();
        line.extend_from_slice(b"From user@example.com Thu Jan 01 00:00:00 2024\n");
        assert!(is_mbox_break_line(&line));
    }

    #[test]
    fn test_split_offsets_and_bodies() {
        let messages = split(MBOX);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].offset, 0);
        assert_eq!(messages[0].bytes, b"Subject: one\n\nbody one\n");
        let second = MBOX
            .windows(9)
            .position(|w| w == b"From bob@")
            .unwrap() as u64;
        assert_eq!(messages[1].offset, second);
        assert!(messages[1].bytes.ends_with(b"From here on, not a boundary\r\n"));
    }

    #[test]
    fn test_message_at_returns_same_bytes() {
        let messages = split(MBOX);
        let mut splitter = MboxSplitter::new(Cursor::new(MBOX.to_vec()));
        for expected in &messages {
            let got = splitter.message_at(expected.offset).unwrap().unwrap();
            assert_eq!(&got, expected);
        }
    }

    #[test]
    fn test_leading_text_without_boundary() {
        let messages = split(b"Subject: orphan\n\nhi\nFrom x y 2020\nSubject: next\n");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].offset, 0);
        assert_eq!(messages[0].bytes, b"Subject: orphan\n\nhi\n");
    }

    #[test]
    fn test_empty_stream_and_bare_boundaries() {
        assert!(split(b"").is_empty());
        assert!(split(b"From x y 2020\nFrom x y 2021\n").is_empty());
    }

    #[test]
    fn test_truncation_drops_short_lines_after_the_cut() {
        let input = b"From x y 2020\naaaaaaaaa\nbbbbbbbbb\nc\nFrom x y 2021\nok\n";
        let mut splitter = MboxSplitter::new(Cursor::new(input.to_vec())).with_max_message_size(12);
        let messages: Vec<_> = splitter.messages().unwrap().map(|m| m.unwrap()).collect();
        assert_eq!(messages[0].bytes, b"aaaaaaaaa\n");
        assert_eq!(messages[1].bytes, b"ok\n");

        let again = splitter.message_at(0).unwrap().unwrap();
        assert_eq!(again, messages[0]);
    }

    #[test]
    fn test_truncates_oversized_message() {
        let input = b"From x y 2020\nline one\nline two\nFrom x y 2021\nok\n";
        let mut splitter = MboxSplitter::new(Cursor::new(input.to_vec())).with_max_message_size(12);
        let messages: Vec<_> = splitter.messages().unwrap().map(|m| m.unwrap()).collect();
        assert_eq!(messages[0].bytes, b"line one\n");
        assert_eq!(messages[1].bytes, b"ok\n");
    }
}
