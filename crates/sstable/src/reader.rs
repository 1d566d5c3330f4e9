use anyhow::{bail, Context, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use flate2::read::DeflateDecoder;
use memtable::ValueEntry;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::format::Header;

/// Reads an SSTable file for point lookups and range scans.
///
/// [`SSTableReader::open`] reads the header, verifies the body CRC, and
/// inflates the whole compressed body exactly once, keeping the decoded
/// `(key, ValueEntry)` pairs resident in a sorted `Vec` for the reader's
/// lifetime. Point lookups ([`get`](SSTableReader::get)) are served by
/// binary search rather than a disk seek, and the optional sidecar bloom
/// filter lets callers skip tables that provably don't contain a key
/// without even the binary search.
pub struct SSTableReader {
    #[allow(dead_code)]
    path: PathBuf,
    header: Header,
    entries: Vec<(Vec<u8>, ValueEntry)>,
    bloom: Option<BloomFilter>,
    /// Lookups the bloom filter ruled out entirely (no binary search needed).
    bloom_hits: AtomicU64,
    /// Lookups the bloom filter could not rule out (binary search ran).
    bloom_misses: AtomicU64,
}

impl SSTableReader {
    /// Opens the SSTable at `path`, validating its header and body CRC and
    /// decoding all entries into memory.
    ///
    /// A missing or unreadable sidecar `.bloom` file is not an error —
    /// lookups simply fall back to binary search for every key.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is too small, the magic is wrong, or the
    /// body CRC does not match the stored checksum.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf).with_context(|| format!("opening {}", path_buf.display()))?;
        let mut reader = BufReader::new(file);

        let header = Header::read_from(&mut reader)?;

        let compressed_len = reader.read_u32::<LittleEndian>()?;
        let expected_crc = reader.read_u32::<LittleEndian>()?;

        let mut compressed = vec![0u8; compressed_len as usize];
        reader.read_exact(&mut compressed)?;

        let mut hasher = Crc32::new();
        hasher.update(&compressed);
        if hasher.finalize() != expected_crc {
            bail!("SSTable body CRC mismatch in {}", path_buf.display());
        }

        let mut body = Vec::new();
        DeflateDecoder::new(&compressed[..]).read_to_end(&mut body)?;

        let mut entries = Vec::with_capacity(header.entry_count as usize);
        let mut cursor = &body[..];
        for _ in 0..header.entry_count {
            let key_len = cursor.read_u32::<LittleEndian>()? as usize;
            if key_len > cursor.len() {
                bail!("truncated SSTable body in {}", path_buf.display());
            }
            let mut key = vec![0u8; key_len];
            cursor.read_exact(&mut key)?;

            let seq = cursor.read_u64::<LittleEndian>()?;
            let present = cursor.read_u8()?;
            let value = if present == 1 {
                let val_len = cursor.read_u32::<LittleEndian>()? as usize;
                let mut val = vec![0u8; val_len];
                cursor.read_exact(&mut val)?;
                Some(val)
            } else {
                None
            };

            entries.push((key, ValueEntry { seq, value }));
        }

        let bloom_path = path_buf.with_extension("bloom");
        let bloom = File::open(&bloom_path)
            .ok()
            .and_then(|f| BloomFilter::read_from(&mut BufReader::new(f)).ok());

        Ok(Self {
            path: path_buf,
            header,
            entries,
            bloom,
            bloom_hits: AtomicU64::new(0),
            bloom_misses: AtomicU64::new(0),
        })
    }

    /// Point lookup for a single key.
    ///
    /// If a bloom filter is present, it is checked first. A negative result
    /// means the key is **definitely not** in this SSTable, avoiding the
    /// binary search entirely (a bloom hit). Otherwise the filter could not
    /// rule the key out, so the binary search runs (a bloom miss).
    ///
    /// Returns `Some(entry)` if the key exists in this table (the entry may
    /// be a tombstone with `value: None`), or `None` if absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<ValueEntry>> {
        if let Some(ref bf) = self.bloom {
            if !bf.may_contain(key) {
                self.bloom_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            self.bloom_misses.fetch_add(1, Ordering::Relaxed);
        }

        Ok(self
            .entries
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
            .ok()
            .map(|idx| self.entries[idx].1.clone()))
    }

    /// Returns `true` if this SSTable has a sidecar bloom filter loaded.
    #[must_use]
    pub fn has_bloom(&self) -> bool {
        self.bloom.is_some()
    }

    /// Number of lookups the bloom filter definitively ruled out.
    #[must_use]
    pub fn bloom_hits(&self) -> u64 {
        self.bloom_hits.load(Ordering::Relaxed)
    }

    /// Number of lookups the bloom filter could not rule out.
    #[must_use]
    pub fn bloom_misses(&self) -> u64 {
        self.bloom_misses.load(Ordering::Relaxed)
    }

    /// Returns the max sequence number stored in the header.
    #[must_use]
    pub fn max_seq(&self) -> u64 {
        self.header.max_seq
    }

    /// The table's level, as recorded in its header.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.header.level
    }

    /// The table's file id, as recorded in its header.
    #[must_use]
    pub fn file_id(&self) -> u64 {
        self.header.file_id
    }

    /// Inclusive key range covered by this table.
    #[must_use]
    pub fn key_range(&self) -> (&[u8], &[u8]) {
        (&self.header.min_key, &self.header.max_key)
    }

    /// Returns the number of entries (including tombstones) in this table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the SSTable contains zero entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over all keys, in ascending sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(|(k, _)| k.as_slice())
    }

    /// Returns an iterator over all `(key, ValueEntry)` pairs, in ascending
    /// key order, served directly from the in-memory cache.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &ValueEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v))
    }
}
