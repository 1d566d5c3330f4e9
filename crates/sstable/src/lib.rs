//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk storage files for the RiptideKV storage engine.
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold the
//! engine flushes it to disk as an SSTable. SSTables are *write-once,
//! read-many* — once created they are never modified (only replaced during
//! compaction).
//!
//! ## File layout (v4 – current)
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER                                                         │
//! │                                                               │
//! │ magic (4 bytes) "SST4" | level (u32) | file_id (u64)           │
//! │ entry_count (u32) | max_seq (u64)                               │
//! │ min_key_len (u32) | min_key | max_key_len (u32) | max_key       │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BODY                                                           │
//! │                                                               │
//! │ compressed_len (u32) | crc32 (u32) | compressed_bytes          │
//! │                                                               │
//! │ `crc32` covers `compressed_bytes` only, so corruption is        │
//! │ detected before a single byte is inflated. Once inflated, the   │
//! │ body is a flat run of entries in ascending key order:           │
//! │                                                               │
//! │   key_len (u32) | key | seq (u64) | present (u8)                │
//! │   | [val_len (u32) | val]                                      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The body is compressed as a single
//! deflate stream ([`flate2`]) rather than per-record, trading random seek
//! access for a much better compression ratio — acceptable because
//! [`SSTableReader::open`] inflates the whole body once and keeps the
//! decoded entries resident in memory for the reader's lifetime, so no
//! record is ever decompressed twice.
//!
//! The bloom filter for a table lives in a sidecar file next to it
//! (`<path>` with its extension replaced by `bloom`) rather than embedded in
//! the `.dat` file, so a reader can skip loading it entirely when bloom
//! filtering isn't needed and a missing sidecar degrades gracefully to "no
//! bloom filter" rather than a corrupt file.

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{Header, SSTABLE_MAGIC};
pub use merge::MergeIterator;
pub use reader::SSTableReader;
pub use writer::SSTableWriter;

#[cfg(test)]
mod tests;
