//! Compaction: L0 file-count trigger and L(n>=1) byte-size trigger.
//!
//! [`Engine::compact`] is driven by two distinct trigger paths: once the L0
//! file count reaches `l0_compaction_trigger`, every L0 table is merged with
//! whichever L1 tables overlap it; once a level's total on-disk byte size
//! exceeds `level_byte_threshold(level)`, one table from that level is picked
//! and merged with whichever next-level tables overlap its key range. Both
//! paths loop until neither trigger fires, so a single call can cascade a
//! compaction down several levels in one pass.
//!
//! Picking a single file (plus overlaps) rather than the whole level keeps
//! each compaction pass's write amplification bounded by the overlap, not by
//! how much unrelated data happens to share the level.
//!
//! Tombstone GC drops a dead key's tombstone only when the target level is
//! the bottom-most level in use (no older data could be shadowed) and the
//! memtable no longer holds that key (the memtable isn't part of compaction,
//! so a live memtable tombstone must survive to keep shadowing recovery).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use sstable::{MergeIterator, SSTableReader, SSTableWriter};

use crate::{Engine, EngineError};

impl Engine {
    /// Runs compaction until neither trigger path fires.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let _guard = self.inner.writer_lock.lock().await;
        self.inner.is_compacting.store(true, Ordering::Relaxed);
        let start = Instant::now();
        let result = self.do_compact();
        self.inner
            .last_compaction_duration_ms
            .store(start.elapsed().as_millis() as u64, Ordering::Relaxed);
        self.inner.is_compacting.store(false, Ordering::Relaxed);
        result?;
        Ok(())
    }

    /// Spawns the background compaction scheduler, ticking on
    /// `config.compaction_check_interval_ms`. Must be called from within a
    /// running Tokio runtime. The spawned task is aborted when the last
    /// `Engine` handle is dropped.
    pub fn start_compaction_scheduler(&self) {
        let engine = self.clone();
        let interval_ms = self.inner.config.compaction_check_interval_ms;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                if let Err(e) = engine.compact().await {
                    tracing::warn!(error = %e, "background compaction failed");
                }
            }
        });
        *self.inner.compaction_handle.lock().unwrap() = Some(handle);
    }

    pub(crate) fn do_compact(&self) -> anyhow::Result<()> {
        loop {
            let l0_count = self
                .inner
                .state
                .read()
                .unwrap()
                .levels
                .first()
                .map(Vec::len)
                .unwrap_or(0);
            let l0_trigger = self.inner.config.l0_compaction_trigger;
            if l0_trigger > 0 && l0_count >= l0_trigger {
                self.compact_level_into_next(0)?;
                continue;
            }

            let num_levels = self.inner.state.read().unwrap().levels.len() as u32;
            let mut triggered = false;
            for level in 1..num_levels {
                let bytes = self.level_total_bytes(level)?;
                if bytes >= self.inner.config.level_byte_threshold(level) {
                    self.compact_level_into_next(level)?;
                    triggered = true;
                    break;
                }
            }
            if !triggered {
                return Ok(());
            }
        }
    }

    pub(crate) fn level_total_bytes(&self, level: u32) -> anyhow::Result<u64> {
        let state = self.inner.state.read().unwrap();
        let mut total = 0u64;
        for filename in state.manifest.filenames_for_level(level) {
            let path = self.inner.sst_dir.join(filename);
            total += std::fs::metadata(&path)?.len();
        }
        Ok(total)
    }

    /// Merges one source file (or, for L0, every L0 table) with whichever
    /// tables in `level + 1` overlap its key range, into a single new
    /// SSTable at `level + 1`.
    fn compact_level_into_next(&self, level: u32) -> anyhow::Result<()> {
        let next_level = level + 1;

        let (sources, is_bottom, file_id, drained_whole_level) = {
            let mut state = self.inner.state.write().unwrap();
            while state.levels.len() <= next_level as usize {
                state.levels.push(Vec::new());
            }

            let mut sources: Vec<SSTableReader> = Vec::new();
            let drained_whole_level = if level == 0 {
                sources.append(&mut state.levels[0]);
                true
            } else {
                if state.levels[level as usize].is_empty() {
                    return Ok(());
                }
                sources.push(state.levels[level as usize].remove(0));
                false
            };
            if sources.is_empty() {
                return Ok(());
            }

            let (lo, hi) = combined_key_range(&sources);
            let overlapping = take_overlapping(&mut state.levels[next_level as usize], &lo, &hi);
            sources.extend(overlapping);

            let is_bottom = state
                .levels
                .iter()
                .skip(next_level as usize + 1)
                .all(Vec::is_empty);
            let file_id = state.next_file_id;
            state.next_file_id += 1;
            (sources, is_bottom, file_id, drained_whole_level)
        };

        let old_filenames: Vec<String> = sources
            .iter()
            .map(|r| format!("sst_L{}_{}.dat", r.level(), r.file_id()))
            .collect();
        let old_paths: Vec<PathBuf> = old_filenames
            .iter()
            .map(|name| self.inner.sst_dir.join(name))
            .collect();

        let estimated_count: usize = sources.iter().map(SSTableReader::len).sum();
        let merged = MergeIterator::new(&sources).collect_all()?;

        let mem_keys: HashSet<Vec<u8>> = self
            .inner
            .state
            .read()
            .unwrap()
            .mem
            .iter()
            .map(|(k, _)| k.to_vec())
            .collect();

        let filtered: Vec<_> = merged
            .into_iter()
            .filter(|(key, entry)| {
                !(entry.value.is_none() && is_bottom && !mem_keys.contains(key))
            })
            .collect();

        let new_filename = format!("sst_L{}_{}.dat", next_level, file_id);
        let new_path = self.inner.sst_dir.join(&new_filename);

        let new_reader = if filtered.is_empty() {
            None
        } else {
            SSTableWriter::write_from_iterator(
                &new_path,
                estimated_count.max(filtered.len()),
                next_level,
                file_id,
                filtered.into_iter(),
            )?;
            Some(SSTableReader::open(&new_path)?)
        };

        {
            let mut state = self.inner.state.write().unwrap();
            if drained_whole_level {
                state.levels[level as usize] = Vec::new();
            }
            let refs: Vec<&str> = old_filenames.iter().map(String::as_str).collect();
            state.manifest.remove_files(&refs);
            if let Some(reader) = new_reader {
                state.levels[next_level as usize].push(reader);
                state.manifest.add(new_filename.clone(), next_level);
            }
            state.manifest.save()?;
        }

        for path in &old_paths {
            let _ = std::fs::remove_file(path);
            let _ = std::fs::remove_file(path.with_extension("bloom"));
        }

        tracing::info!(level, next_level, sources = old_paths.len(), "compaction complete");

        Ok(())
    }
}

/// Removes and returns every reader in `level` whose inclusive key range
/// `[min_key, max_key]` overlaps `[lo, hi]`, leaving non-overlapping readers
/// untouched in place.
fn take_overlapping(level: &mut Vec<SSTableReader>, lo: &[u8], hi: &[u8]) -> Vec<SSTableReader> {
    let mut taken = Vec::new();
    let mut i = 0;
    while i < level.len() {
        let (min_key, max_key) = level[i].key_range();
        if min_key <= hi && max_key >= lo {
            taken.push(level.remove(i));
        } else {
            i += 1;
        }
    }
    taken
}

/// The inclusive key range spanning every reader in `sources`.
fn combined_key_range(sources: &[SSTableReader]) -> (Vec<u8>, Vec<u8>) {
    let (first_lo, first_hi) = sources[0].key_range();
    let mut lo = first_lo.to_vec();
    let mut hi = first_hi.to_vec();
    for r in &sources[1..] {
        let (min_key, max_key) = r.key_range();
        if min_key < lo.as_slice() {
            lo = min_key.to_vec();
        }
        if max_key > hi.as_slice() {
            hi = max_key.to_vec();
        }
    }
    (lo, hi)
}
