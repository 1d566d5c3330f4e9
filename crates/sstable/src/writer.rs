use anyhow::{bail, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use memtable::{Memtable, ValueEntry};
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::format::Header;

/// Default bloom filter false positive rate (1%).
const BLOOM_FPR: f64 = 0.01;

/// Writes a [`Memtable`] or a sorted stream of entries to disk as an
/// immutable SSTable file (plus its sidecar bloom filter).
///
/// The writer is stateless — all work happens inside the static methods
/// below. The write is crash-safe: both the table and its bloom sidecar are
/// first written to temporary files, fsynced, and then atomically renamed
/// into place.
pub struct SSTableWriter {}

impl SSTableWriter {
    /// Flushes `mem` to a new SSTable file at `path`, tagged with `level`
    /// and `file_id` for the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the memtable is empty (writing an empty SSTable is
    /// not useful and likely indicates a logic bug) or on any I/O failure.
    pub fn write_from_memtable(path: &Path, mem: &Memtable, level: u32, file_id: u64) -> Result<()> {
        if mem.is_empty() {
            bail!("refusing to write an empty SSTable (empty memtable)");
        }
        let iter = mem.iter().map(|(k, v)| (k.to_vec(), v.clone()));
        Self::write_internal(path, mem.len(), level, file_id, iter)
    }

    /// Writes an SSTable from an iterator of `(key, ValueEntry)` pairs.
    ///
    /// This is the **streaming compaction** entry point. Entries are
    /// collected once (the body is compressed as a single block, so there is
    /// no streaming-to-disk benefit left to exploit) and written via the
    /// same path as [`write_from_memtable`](SSTableWriter::write_from_memtable).
    ///
    /// # Arguments
    ///
    /// * `path` – destination file path.
    /// * `expected_count` – estimated number of entries (used to size the
    ///   bloom filter). Over-estimating is safe; under-estimating increases FPR.
    /// * `level`, `file_id` – header metadata identifying this table.
    /// * `iter` – an iterator yielding `(key, ValueEntry)` in **sorted key
    ///   order** (ascending). The caller is responsible for deduplication.
    ///
    /// # Errors
    ///
    /// Returns an error if the iterator yields zero entries or on I/O failure.
    pub fn write_from_iterator<I>(
        path: &Path,
        expected_count: usize,
        level: u32,
        file_id: u64,
        iter: I,
    ) -> Result<()>
    where
        I: Iterator<Item = (Vec<u8>, ValueEntry)>,
    {
        Self::write_internal(path, expected_count.max(1), level, file_id, iter)
    }

    fn write_internal<I>(path: &Path, expected_count: usize, level: u32, file_id: u64, iter: I) -> Result<()>
    where
        I: Iterator<Item = (Vec<u8>, ValueEntry)>,
    {
        let mut bloom = BloomFilter::new(expected_count.max(1), BLOOM_FPR);
        let mut body = Vec::new();
        let mut min_key: Option<Vec<u8>> = None;
        let mut max_key: Option<Vec<u8>> = None;
        let mut max_seq: u64 = 0;
        let mut entry_count: u32 = 0;

        for (key, entry) in iter {
            max_seq = max_seq.max(entry.seq);
            bloom.insert(&key);

            if min_key.is_none() {
                min_key = Some(key.clone());
            }
            max_key = Some(key.clone());

            body.write_u32::<LittleEndian>(key.len() as u32)?;
            body.extend_from_slice(&key);
            body.write_u64::<LittleEndian>(entry.seq)?;
            match &entry.value {
                Some(v) => {
                    body.write_u8(1)?;
                    body.write_u32::<LittleEndian>(v.len() as u32)?;
                    body.extend_from_slice(v);
                }
                None => {
                    body.write_u8(0)?;
                }
            }
            entry_count += 1;
        }

        if entry_count == 0 {
            bail!("refusing to write an empty SSTable (no entries)");
        }

        let header = Header {
            level,
            file_id,
            entry_count,
            max_seq,
            min_key: min_key.unwrap(),
            max_key: max_key.unwrap(),
        };

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body)?;
        let compressed = encoder.finish()?;

        let mut hasher = Crc32::new();
        hasher.update(&compressed);
        let crc = hasher.finalize();

        let tmp_path = path.with_extension("dat.tmp");
        {
            let raw_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut file = BufWriter::new(raw_file);

            header.write_to(&mut file)?;
            file.write_u32::<LittleEndian>(compressed.len() as u32)?;
            file.write_u32::<LittleEndian>(crc)?;
            file.write_all(&compressed)?;

            file.flush()?;
            file.into_inner()?.sync_all()?;
        }
        rename(&tmp_path, path)?;

        // Sidecar bloom file, same atomic discipline.
        let bloom_path = path.with_extension("bloom");
        let bloom_tmp = path.with_extension("bloom.tmp");
        {
            let raw_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&bloom_tmp)?;
            let mut bf = BufWriter::new(raw_file);
            bloom.write_to(&mut bf)?;
            bf.flush()?;
            bf.into_inner()?.sync_all()?;
        }
        rename(&bloom_tmp, &bloom_path)?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}
