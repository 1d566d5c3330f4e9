//! Write path: `put()`, `delete()`, batch variants, and `flush()`.
//!
//! Every mutation is appended to the WAL before it touches the Memtable.
//! Batches share a single sequence range and a single WAL append loop under
//! one `writer_lock` acquisition, which is what makes them atomic with
//! respect to other writers and to a concurrent crash: either every record
//! in the batch is durable or none of it was applied to the Memtable.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::RwLock;
use std::time::Instant;
use wal::{WalRecord, WalWriter};

use crate::{recovery, Engine, EngineError, EngineState, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use config::EngineConfig;
use sstable::{SSTableReader, SSTableWriter};

impl Engine {
    /// Inserts a key-value pair, durably.
    pub async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        validate_key(&key)?;
        validate_value(&value)?;
        let _guard = self.inner.writer_lock.lock().await;
        self.write_locked(vec![(key, Some(value))])?;
        self.do_flush_if_needed()
    }

    /// Deletes a key by writing a tombstone.
    pub async fn delete(&self, key: Vec<u8>) -> Result<(), EngineError> {
        validate_key(&key)?;
        let _guard = self.inner.writer_lock.lock().await;
        self.write_locked(vec![(key, None)])?;
        self.do_flush_if_needed()
    }

    /// Inserts many key-value pairs as a single atomic batch.
    ///
    /// Holding `writer_lock` for the entire batch is the atomicity guarantee:
    /// no other writer can interleave a record between two entries of this
    /// batch, and a reader never observes half of it.
    pub async fn batch_put(&self, items: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), EngineError> {
        if items.is_empty() {
            return Err(EngineError::InvalidArgument("batch must not be empty".into()));
        }
        for (key, value) in &items {
            validate_key(key)?;
            validate_value(value)?;
        }
        let _guard = self.inner.writer_lock.lock().await;
        let entries = items.into_iter().map(|(k, v)| (k, Some(v))).collect();
        self.write_locked(entries)?;
        self.do_flush_if_needed()
    }

    /// Deletes many keys as a single atomic batch.
    pub async fn batch_delete(&self, keys: Vec<Vec<u8>>) -> Result<(), EngineError> {
        if keys.is_empty() {
            return Err(EngineError::InvalidArgument("batch must not be empty".into()));
        }
        for key in &keys {
            validate_key(key)?;
        }
        let _guard = self.inner.writer_lock.lock().await;
        let entries = keys.into_iter().map(|k| (k, None)).collect();
        self.write_locked(entries)?;
        self.do_flush_if_needed()
    }

    /// Forces a flush of the current Memtable to a new L0 SSTable, even if
    /// the flush threshold has not been reached. A no-op if the Memtable is
    /// empty.
    pub async fn flush(&self) -> Result<(), EngineError> {
        let _guard = self.inner.writer_lock.lock().await;
        let start = Instant::now();
        flush_state(&self.inner.state, &self.inner.sst_dir, &self.inner.wal_dir, &self.inner.config)?;
        self.inner
            .last_flush_duration_ms
            .store(start.elapsed().as_millis() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Applies `entries` as one batch: a shared timestamp, one sequence
    /// number per entry, appended to the WAL and the Memtable while holding
    /// `state` for the whole batch. Callers must already hold `writer_lock`.
    fn write_locked(&self, entries: Vec<(Vec<u8>, Option<Vec<u8>>)>) -> Result<(), EngineError> {
        let batch_size = entries.len() as u32;
        let is_batch = batch_size > 1;
        let timestamp = Self::now_millis();
        self.inner
            .total_writes
            .fetch_add(batch_size as u64, Ordering::Relaxed);

        let mut state = self.inner.state.write().unwrap();
        for (key, value) in entries {
            let seq = self.next_seq()?;
            let record = match &value {
                Some(v) => WalRecord::Put {
                    seq,
                    key: key.clone(),
                    value: v.clone(),
                    timestamp,
                    batch_flag: is_batch,
                    batch_size,
                },
                None => WalRecord::Del {
                    seq,
                    key: key.clone(),
                    timestamp,
                    batch_flag: is_batch,
                    batch_size,
                },
            };
            state.wal_writer.append(&record)?;
            match value {
                Some(v) => state.mem.put(key, v, seq),
                None => state.mem.delete(key, seq),
            }
        }
        Ok(())
    }

    fn do_flush_if_needed(&self) -> Result<(), EngineError> {
        let byte_threshold = self.inner.config.flush_threshold;
        let entry_threshold = self.inner.config.flush_entries_threshold;
        let needs_flush = {
            let mem = &self.inner.state.read().unwrap().mem;
            mem.approx_size() >= byte_threshold || mem.len() >= entry_threshold
        };
        if needs_flush {
            let start = Instant::now();
            flush_state(&self.inner.state, &self.inner.sst_dir, &self.inner.wal_dir, &self.inner.config)?;
            self.inner
                .last_flush_duration_ms
                .store(start.elapsed().as_millis() as u64, Ordering::Relaxed);
        }
        Ok(())
    }
}

fn validate_key(key: &[u8]) -> Result<(), EngineError> {
    if key.len() > MAX_KEY_SIZE {
        return Err(EngineError::InvalidArgument(format!(
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(())
}

fn validate_value(value: &[u8]) -> Result<(), EngineError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(EngineError::InvalidArgument(format!(
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        )));
    }
    Ok(())
}

/// Flushes the Memtable to a new L0 SSTable and rotates the WAL segment.
///
/// A no-op if the Memtable is empty. Used both by [`Engine::flush`] (which
/// holds `writer_lock` first) and directly from `Drop for EngineInner`,
/// which has exclusive ownership and needs no lock.
pub(crate) fn flush_state(
    state: &RwLock<EngineState>,
    sst_dir: &Path,
    wal_dir: &Path,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let mut state = state.write().unwrap();
    if state.mem.is_empty() {
        return Ok(());
    }

    let file_id = state.next_file_id;
    state.next_file_id += 1;
    let sst_name = format!("sst_L0_{}.dat", file_id);
    let sst_path = sst_dir.join(&sst_name);

    SSTableWriter::write_from_memtable(&sst_path, &state.mem, 0, file_id)?;

    state.manifest.add(sst_name, 0);
    state.manifest.save()?;

    let reader = SSTableReader::open(&sst_path)?;
    if state.levels.is_empty() {
        state.levels.push(Vec::new());
    }
    state.levels[0].insert(0, reader);

    let old_segment_id = state.wal_segment_id;
    let new_segment_id = old_segment_id + 1;
    let new_wal_path = recovery::wal_segment_path(wal_dir, new_segment_id);
    state.wal_writer = WalWriter::create(&new_wal_path, config.wal_sync)?;
    state.wal_segment_id = new_segment_id;

    let old_wal_path = recovery::wal_segment_path(wal_dir, old_segment_id);
    let _ = std::fs::remove_file(&old_wal_path);

    state.mem.clear();

    tracing::info!(file_id, entries = state.levels[0][0].len(), "memtable flushed to L0");

    Ok(())
}
