use config::EngineConfig;
use std::fs;
use std::path::Path;

pub fn count_sst_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "dat")
                .unwrap_or(false)
        })
        .count()
}

/// Builds an `EngineConfig` rooted at `dir`, with `flush_threshold` and
/// `wal_sync` overridden and automatic L0 compaction disabled so tests can
/// control compaction explicitly via `Engine::compact`.
pub fn test_config(dir: &Path, flush_threshold: usize, wal_sync: bool) -> EngineConfig {
    EngineConfig {
        wal_dir: dir.join("wal"),
        sst_dir: dir.join("sst"),
        flush_threshold,
        wal_sync,
        l0_compaction_trigger: 0,
        ..EngineConfig::default()
    }
}
