//! Binary index file format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (64 bytes, fixed)             │
//! │  magic: [u8; 8] = b"MBXSTOR\0"      │
//! │  version: u32                        │
//! │  flags: u32                          │
//! │  doc_count: u64                      │
//! │  (padding to 64 bytes)               │
//! ├──────────────────────────────────────┤
//! │ DOCUMENTS (variable)                 │
//! │  bincode-serialized Vec<IndexedDoc>  │
//! └──────────────────────────────────────┘
//! ```

/// Magic bytes identifying an mboxstore index file.
pub const MAGIC: &[u8; 8] = b"MBXSTOR\0";

/// Current index format version.
pub const VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 64;

/// Serializable index header.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct IndexHeader {
    /// Magic bytes (must equal [`MAGIC`]).
    pub magic: [u8; 8],
    /// Format version (must equal [`VERSION`]).
    pub version: u32,
    /// Reserved flags (currently unused).
    pub flags: u32,
    /// Number of documents in the index.
    pub doc_count: u64,
}

impl IndexHeader {
    /// Header for an index holding `doc_count` documents.
    pub fn new(doc_count: u64) -> Self {
        Self {
            magic: *MAGIC,
            version: VERSION,
            flags: 0,
            doc_count,
        }
    }

    /// Validate that the header is well-formed and matches the current format.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != *MAGIC {
            return Err("Invalid magic bytes".into());
        }
        if self.version != VERSION {
            return Err(format!(
                "Incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }
}
