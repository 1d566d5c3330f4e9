//! WAL segment discovery + replay, and SSTable loading on startup.

use crate::manifest::Manifest;
use anyhow::{Context, Result};
use memtable::Memtable;
use sstable::SSTableReader;
use std::fs;
use std::path::{Path, PathBuf};
use wal::{WalReader, WalRecord};

/// Builds the on-disk path for WAL segment `segment_id` within `wal_dir`.
pub(crate) fn wal_segment_path(wal_dir: &Path, segment_id: u64) -> PathBuf {
    wal_dir.join(format!("wal-{:020}.log", segment_id))
}

/// Finds every `wal-<id>.log` segment in `wal_dir`, sorted ascending by id.
///
/// Normally there is at most one segment: a new one is only created once the
/// previous segment's data is durably captured in a flushed SSTable, at which
/// point the old segment is deleted. Finding more than one means a crash
/// landed between creating the new segment and deleting the old one; both
/// are replayed, which is safe because replay is idempotent with respect to
/// sequence-number-gated Memtable writes.
pub(crate) fn discover_wal_segments(wal_dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut segments = Vec::new();
    if wal_dir.exists() {
        for entry in fs::read_dir(wal_dir)? {
            let path = entry?.path();
            if let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("wal-"))
                .and_then(|n| n.strip_suffix(".log"))
                .and_then(|n| n.parse::<u64>().ok())
            {
                segments.push((id, path));
            }
        }
    }
    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}

/// Replays every record in the WAL segment at `path` into `mem`, returning
/// the highest sequence number observed.
///
/// A missing file is not an error -- it simply means the segment was never
/// created (fresh database) -- and returns `Ok(0)`.
pub fn replay_wal_and_build(path: &Path, mem: &mut Memtable) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }

    let mut reader = WalReader::open(path)
        .with_context(|| format!("opening WAL segment {}", path.display()))?;
    let mut max_seq = 0u64;

    reader
        .replay(|record| match record {
            WalRecord::Put { seq, key, value, .. } => {
                max_seq = max_seq.max(seq);
                mem.put(key, value, seq);
            }
            WalRecord::Del { seq, key, .. } => {
                max_seq = max_seq.max(seq);
                mem.delete(key, seq);
            }
        })
        .with_context(|| format!("replaying WAL segment {}", path.display()))?;

    Ok(max_seq)
}

/// Loads every SSTable named in `manifest` into its level, bootstrapping the
/// manifest from the directory listing first if it has no entries (a fresh
/// database, or one created before the manifest existed).
///
/// Returns `(levels, max_seq_seen, next_file_id)`.
pub(crate) fn load_sstables(
    sst_dir: &Path,
    manifest: &mut Manifest,
) -> Result<(Vec<Vec<SSTableReader>>, u64, u64)> {
    if manifest.entries.is_empty() {
        bootstrap_manifest_from_disk(sst_dir, manifest)?;
    }

    let max_level = manifest.max_level();
    let mut levels: Vec<Vec<SSTableReader>> = match max_level {
        Some(n) => vec![Vec::new(); n as usize + 1],
        None => vec![Vec::new()],
    };
    let mut max_seq = 0u64;
    let mut max_file_id = 0u64;

    if let Some(max_level) = max_level {
        for level in 0..=max_level {
            for filename in manifest.filenames_for_level(level) {
                let path = sst_dir.join(filename);
                let reader = SSTableReader::open(&path)
                    .with_context(|| format!("opening sstable {}", path.display()))?;
                max_seq = max_seq.max(reader.max_seq());
                max_file_id = max_file_id.max(reader.file_id());
                levels[level as usize].push(reader);
            }
        }
    }

    Ok((levels, max_seq, max_file_id + 1))
}

/// Scans `sst_dir` for `sst_L<level>_<id>.dat` files and registers them with
/// the manifest, then saves it. Used to bring a pre-manifest database (or
/// one with a lost manifest) back under manifest tracking.
fn bootstrap_manifest_from_disk(sst_dir: &Path, manifest: &mut Manifest) -> Result<()> {
    if !sst_dir.exists() {
        return Ok(());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(sst_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(level) = parse_level_from_filename(name) {
            found.push((name.to_string(), level));
        }
    }

    if found.is_empty() {
        return Ok(());
    }

    found.sort();
    for (name, level) in found {
        manifest.add(name, level);
    }
    manifest.save()?;
    Ok(())
}

fn parse_level_from_filename(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("sst_L")?;
    let (level_str, _) = rest.split_once('_')?;
    level_str.parse().ok()
}

/// Removes leftover `.dat.tmp`/`.bloom.tmp` files from an interrupted flush
/// or compaction. Best-effort: failures are ignored since these are purely
/// advisory cleanup, not correctness-affecting.
pub(crate) fn cleanup_tmp_files(sst_dir: &Path) {
    let Ok(entries) = fs::read_dir(sst_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(".dat.tmp") || name.ends_with(".bloom.tmp") {
                let _ = fs::remove_file(&path);
            }
        }
    }
}
