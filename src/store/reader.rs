//! Random access to the raw messages of an mbox file, with LRU caching.

use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::model::message::Message;
use crate::parser::mbox::{MboxSplitter, DEFAULT_READ_BUFFER_SIZE};

/// Default number of raw messages to keep in the LRU cache.
const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(50) {
    Some(n) => n,
    None => unreachable!(),
};

/// Reads messages from an mbox file by the offsets recorded at ingestion.
///
/// Maintains an LRU cache of raw messages so paging back and forth through
/// results does not re-read the file.
pub struct MessageReader {
    path: PathBuf,
    splitter: MboxSplitter<BufReader<File>>,
    cache: LruCache<u64, Vec<u8>>,
}

impl MessageReader {
    /// Open an mbox file for random-access reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let splitter = MboxSplitter::open(&path, DEFAULT_READ_BUFFER_SIZE)?;
        Ok(Self {
            path,
            splitter,
            cache: LruCache::new(DEFAULT_CACHE_SIZE),
        })
    }

    /// Raw bytes of the message starting at `offset`.
    pub fn raw_message(&mut self, offset: u64) -> Result<&[u8]> {
        if !self.cache.contains(&offset) {
            debug!(path = %self.path.display(), offset, "Reading message from mbox");
            let message = self.splitter.message_at(offset)?.ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "no message at offset {offset} in '{}'",
                    self.path.display()
                ))
            })?;
            self.cache.put(offset, message.bytes);
        }
        self.cache
            .get(&offset)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::InvalidArgument(format!("no message at offset {offset}")))
    }

    /// Parse the message starting at `offset`.
    pub fn message(&mut self, offset: u64) -> Result<Message> {
        let raw = self.raw_message(offset)?;
        Message::parse(raw)
    }

    /// Path to the mbox file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_by_offset_and_caches() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mbox: &[u8] = b"From a@x.com Mon Jan  1 00:00:00 2024\n\
Message-ID: <one@x>\nFrom: a@x.com\n\nfirst\n\
From b@x.com Mon Jan  1 00:00:00 2024\n\
Message-ID: <two@x>\nFrom: b@x.com\n\nsecond\n";
        file.write_all(mbox).unwrap();
        file.flush().unwrap();

        let mut reader = MessageReader::open(file.path()).unwrap();
        let second_offset = mbox.windows(7).position(|w| w == b"From b@").unwrap() as u64;
        assert!(reader.raw_message(second_offset).unwrap().ends_with(b"second\n"));
        assert_eq!(reader.message(0).unwrap().from().address, "a@x.com");
        assert!(reader.cache.contains(&second_offset));
        assert!(matches!(
            reader.raw_message(10_000),
            Err(StoreError::InvalidArgument(_))
        ));
    }
}
