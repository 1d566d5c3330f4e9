//! # Engine - RiptideKV Storage Engine
//!
//! The central orchestrator that ties together the [`memtable`], [`wal`], and
//! [`sstable`] crates into a complete, asynchronous LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client (async)
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ write.rs → WAL append → Memtable insert       │
//! │              |                                │
//! │              |  (threshold exceeded?)         │
//! │              v                                │
//! │           flush() → new L0 SSTable            │
//! │                                               │
//! │ compaction.rs → background scheduler tick     │
//! │   L0 file-count trigger  → L0 into L1         │
//! │   L(n>=1) byte-size trigger → Ln into Ln+1     │
//! │                                               │
//! │ read.rs → Memtable → L0 → L1 → ... → Ln       │
//! │            (first match wins)                 │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                               |
//! |--------------|-------------------------------------------------------|
//! | [`lib.rs`]   | `Engine` handle, constructor, `StatsSnapshot`, `EngineError` |
//! | [`recovery`] | WAL segment discovery + replay, SSTable loading        |
//! | [`write`]    | `put`/`delete`/`batch_put`/`batch_delete`/`flush`       |
//! | [`read`]     | `get`/`scan`                                           |
//! | [`compaction`] | background scheduler + `compact()`                   |
//! | [`manifest`] | Persistent `L<n>` level tracking (atomic file ops)     |
//!
//! ## Concurrency
//!
//! `Engine` is a cheap-to-clone handle (`Arc` internally). Writers are
//! serialized by a [`tokio::sync::Mutex`] so WAL append + memtable update +
//! sequence allocation happen as one atomic step per writer. Reads take a
//! [`std::sync::RwLock`] read guard that never contends with the async writer
//! mutex, only with other readers and the brief moment a write installs its
//! change.
//!
//! ## Crash Safety
//!
//! Every write is appended to the WAL **before** the Memtable update. A WAL
//! segment is only deleted **after** a successful flush + manifest update
//! references its replacement SSTable. SSTables and the manifest are both
//! written atomically via temp file + rename.
mod compaction;
mod manifest;
mod read;
mod recovery;
mod write;

use config::EngineConfig;
use manifest::Manifest;
use memtable::Memtable;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use wal::{WalError, WalWriter};

pub use manifest::SstMeta;
pub use recovery::replay_wal_and_build;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (4 MiB).
pub const MAX_VALUE_SIZE: usize = 4 * 1024 * 1024;

/// Errors surfaced by the public `Engine` API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A durability guarantee could not be met (WAL append/fsync failed).
    #[error("durability failure: {0}")]
    Durability(String),
    /// On-disk data failed a checksum or format check.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// An underlying I/O error not otherwise classified.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A caller-supplied argument violated an engine invariant (empty key,
    /// oversized key/value, sequence number overflow).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Corruption(e.to_string())
    }
}

impl From<WalError> for EngineError {
    fn from(e: WalError) -> Self {
        match e {
            WalError::Io(io_err) => EngineError::Durability(io_err.to_string()),
            WalError::Corrupt => EngineError::Corruption("WAL record failed CRC check".into()),
        }
    }
}

/// A point-in-time snapshot of engine-wide statistics, returned by
/// [`Engine::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Current monotonic sequence number.
    pub seq: u64,
    /// Number of entries (including unflushed tombstones) in the memtable.
    pub memtable_entries: usize,
    /// Approximate memtable size in bytes.
    pub memtable_bytes: usize,
    /// Number of SSTables at each level, indexed by level number.
    pub level_sstable_counts: Vec<usize>,
    /// Total on-disk byte size of each level's SSTables, indexed by level number.
    pub level_byte_sizes: Vec<u64>,
    /// Filenames of the SSTables at each level, indexed by level number.
    pub level_file_names: Vec<Vec<String>>,
    /// Total SSTable count across all levels.
    pub total_sstable_count: usize,
    /// Total number of `get`/`scan` calls served since the engine was opened.
    pub total_reads: u64,
    /// Total number of individual key writes (puts and deletes, batches counted
    /// per entry) applied since the engine was opened.
    pub total_writes: u64,
    /// Lookups across all SSTable bloom filters that were ruled out without
    /// a binary search.
    pub bloom_hits: u64,
    /// Lookups across all SSTable bloom filters that could not be ruled out.
    pub bloom_misses: u64,
    /// Wall-clock duration of the most recent memtable flush, in milliseconds.
    /// `None` if no flush has happened yet.
    pub last_flush_duration_ms: Option<u64>,
    /// Wall-clock duration of the most recent compaction pass, in milliseconds.
    /// `None` if no compaction has happened yet.
    pub last_compaction_duration_ms: Option<u64>,
    /// `true` if a compaction pass is currently running.
    pub is_compacting: bool,
}

pub(crate) struct EngineState {
    pub(crate) mem: Memtable,
    /// `levels[n]` holds every SSTable reader at level `n`, newest first.
    pub(crate) levels: Vec<Vec<sstable::SSTableReader>>,
    pub(crate) manifest: Manifest,
    pub(crate) wal_writer: WalWriter,
    pub(crate) wal_segment_id: u64,
    pub(crate) next_file_id: u64,
}

/// Sentinel stored in a "last duration" atomic before that operation has ever run.
const NO_DURATION_YET: u64 = u64::MAX;

struct EngineInner {
    config: EngineConfig,
    sst_dir: PathBuf,
    wal_dir: PathBuf,
    state: RwLock<EngineState>,
    writer_lock: AsyncMutex<()>,
    seq: AtomicU64,
    compaction_handle: StdMutex<Option<JoinHandle<()>>>,
    total_reads: AtomicU64,
    total_writes: AtomicU64,
    last_flush_duration_ms: AtomicU64,
    last_compaction_duration_ms: AtomicU64,
    is_compacting: AtomicBool,
}

/// A cheap-to-clone async handle onto a single-node LSM-tree key-value store.
///
/// # Write Path
///
/// 1. Increment the monotonic sequence number.
/// 2. Append the record to the WAL (crash-safe durability).
/// 3. Apply the mutation to the in-memory Memtable.
/// 4. If `approx_size >= flush_threshold`, flush the Memtable to a new L0
///    SSTable, rotate the WAL segment, and reset the Memtable.
///
/// # Read Path
///
/// 1. Check the Memtable (freshest data, includes tombstones).
/// 2. Check SSTables level by level, newest to oldest within a level.
/// 3. First match wins; tombstones shadow older values.
///
/// # Recovery
///
/// On construction ([`Engine::open`]), every `wal-*.log` segment is replayed
/// into a fresh Memtable in ascending segment order, and existing SSTables
/// are loaded per the manifest's level assignments.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read().unwrap();
        f.debug_struct("Engine")
            .field("seq", &self.inner.seq.load(Ordering::SeqCst))
            .field("flush_threshold", &self.inner.config.flush_threshold)
            .field("wal_sync", &self.inner.config.wal_sync)
            .field("sst_dir", &self.inner.sst_dir)
            .field("memtable_size", &state.mem.approx_size())
            .field("memtable_entries", &state.mem.len())
            .field(
                "level_sstable_counts",
                &state.levels.iter().map(Vec::len).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Engine {
    /// Opens (or creates) an engine rooted at the directories named in
    /// `config`, performing full recovery from the WAL and existing SSTable
    /// files.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create the WAL and SST directories if they do not exist.
    /// 2. Clean up leftover `.tmp` files from interrupted flushes/compactions.
    /// 3. Replay every discovered WAL segment into a fresh Memtable.
    /// 4. Open a `WalWriter` on the newest segment (or segment 0 if none existed).
    /// 5. Load SSTables per the manifest's level assignments (or bootstrap the
    ///    manifest by scanning the SST directory for a pre-manifest database).
    /// 6. Determine the highest sequence number across the WAL and SSTables.
    #[tracing::instrument(skip(config), fields(sst_dir = %config.sst_dir.display()))]
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let sst_dir = config.sst_dir.clone();
        let wal_dir = config.wal_dir.clone();
        std::fs::create_dir_all(&sst_dir)?;
        std::fs::create_dir_all(&wal_dir)?;

        recovery::cleanup_tmp_files(&sst_dir);

        let mut mem = Memtable::new();
        let segments = recovery::discover_wal_segments(&wal_dir)?;
        let mut wal_max_seq = 0u64;
        for (_, path) in &segments {
            wal_max_seq = wal_max_seq.max(replay_wal_and_build(path, &mut mem)?);
        }

        let wal_segment_id = segments.last().map(|(id, _)| *id).unwrap_or(0);
        let wal_path = recovery::wal_segment_path(&wal_dir, wal_segment_id);
        let wal_writer = WalWriter::create(&wal_path, config.wal_sync)?;

        let mut manifest = Manifest::load_or_create(&sst_dir)?;
        let (levels, max_sst_seq, next_file_id) =
            recovery::load_sstables(&sst_dir, &mut manifest)?;

        let seq = wal_max_seq.max(max_sst_seq);

        tracing::info!(seq, levels = levels.len(), "engine recovered");

        let state = EngineState {
            mem,
            levels,
            manifest,
            wal_writer,
            wal_segment_id,
            next_file_id,
        };

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                sst_dir,
                wal_dir,
                state: RwLock::new(state),
                writer_lock: AsyncMutex::new(()),
                seq: AtomicU64::new(seq),
                compaction_handle: StdMutex::new(None),
                total_reads: AtomicU64::new(0),
                total_writes: AtomicU64::new(0),
                last_flush_duration_ms: AtomicU64::new(NO_DURATION_YET),
                last_compaction_duration_ms: AtomicU64::new(NO_DURATION_YET),
                is_compacting: AtomicBool::new(false),
            }),
        })
    }

    /// Returns the current monotonic sequence number.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.inner.seq.load(Ordering::SeqCst)
    }

    /// Returns the engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns a point-in-time snapshot of engine statistics.
    pub async fn stats(&self) -> StatsSnapshot {
        let (memtable_entries, memtable_bytes, level_sstable_counts, level_file_names, bloom_hits, bloom_misses, num_levels) = {
            let state = self.inner.state.read().unwrap();
            let level_sstable_counts: Vec<usize> = state.levels.iter().map(Vec::len).collect();
            let level_file_names: Vec<Vec<String>> = state
                .levels
                .iter()
                .map(|level| {
                    level
                        .iter()
                        .map(|r| format!("sst_L{}_{}.dat", r.level(), r.file_id()))
                        .collect()
                })
                .collect();
            let mut bloom_hits = 0u64;
            let mut bloom_misses = 0u64;
            for level in &state.levels {
                for sst in level {
                    bloom_hits += sst.bloom_hits();
                    bloom_misses += sst.bloom_misses();
                }
            }
            (
                state.mem.len(),
                state.mem.approx_size(),
                level_sstable_counts,
                level_file_names,
                bloom_hits,
                bloom_misses,
                state.levels.len() as u32,
            )
        };

        let mut level_byte_sizes = Vec::with_capacity(num_levels as usize);
        for level in 0..num_levels {
            level_byte_sizes.push(self.level_total_bytes(level).unwrap_or(0));
        }

        let last_flush = self.inner.last_flush_duration_ms.load(Ordering::Relaxed);
        let last_compaction = self.inner.last_compaction_duration_ms.load(Ordering::Relaxed);

        StatsSnapshot {
            seq: self.seq(),
            memtable_entries,
            memtable_bytes,
            total_sstable_count: level_sstable_counts.iter().sum(),
            level_sstable_counts,
            level_byte_sizes,
            level_file_names,
            total_reads: self.inner.total_reads.load(Ordering::Relaxed),
            total_writes: self.inner.total_writes.load(Ordering::Relaxed),
            bloom_hits,
            bloom_misses,
            last_flush_duration_ms: (last_flush != NO_DURATION_YET).then_some(last_flush),
            last_compaction_duration_ms: (last_compaction != NO_DURATION_YET).then_some(last_compaction),
            is_compacting: self.inner.is_compacting.load(Ordering::Relaxed),
        }
    }

    fn next_seq(&self) -> Result<u64, EngineError> {
        self.inner
            .seq
            .fetch_add(1, Ordering::SeqCst)
            .checked_add(1)
            .ok_or_else(|| EngineError::InvalidArgument("sequence number overflow".into()))
    }

    fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Best-effort flush on drop.
///
/// When the last handle to an `Engine` is dropped, any data remaining in the
/// memtable is flushed to an SSTable so it is not lost. Errors are silently
/// ignored because `Drop` cannot propagate them — the data is still safe in
/// the WAL and will be recovered on the next `Engine::open`.
impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(handle) = self.compaction_handle.lock().unwrap().take() {
            handle.abort();
        }
        let needs_flush = self
            .state
            .read()
            .map(|s| !s.mem.is_empty())
            .unwrap_or(false);
        if needs_flush {
            let _ = write::flush_state(&self.state, &self.sst_dir, &self.wal_dir, &self.config);
        }
    }
}

#[cfg(test)]
mod tests;
