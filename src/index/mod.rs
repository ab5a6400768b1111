//! Full-text index: the bundled in-memory implementation and its file format.

pub mod format;
pub mod memory;

pub use memory::MemoryIndex;
