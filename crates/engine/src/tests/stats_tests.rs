use super::helpers::test_config;
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

#[tokio::test]
async fn stats_track_reads_and_writes() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_config(dir.path(), 1024 * 1024, false))?;

    engine.put(b"a".to_vec(), b"1".to_vec()).await?;
    engine.put(b"b".to_vec(), b"2".to_vec()).await?;
    engine.get(b"a").await?;
    engine.get(b"missing").await?;

    let stats = engine.stats().await;
    assert_eq!(stats.total_writes, 2);
    assert_eq!(stats.total_reads, 2);
    Ok(())
}

#[tokio::test]
async fn stats_report_flush_duration_after_flush() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_config(dir.path(), 1024 * 1024, false))?;

    assert!(engine.stats().await.last_flush_duration_ms.is_none());

    engine.put(b"k".to_vec(), b"v".to_vec()).await?;
    engine.flush().await?;

    assert!(engine.stats().await.last_flush_duration_ms.is_some());
    Ok(())
}

#[tokio::test]
async fn stats_report_compaction_duration_and_level_detail() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_config(dir.path(), 64, false))?;

    for i in 0..30u64 {
        engine.put(format!("k{:04}", i).into_bytes(), b"val".to_vec()).await?;
    }

    assert!(engine.stats().await.last_compaction_duration_ms.is_none());
    engine.compact().await?;

    let stats = engine.stats().await;
    assert!(stats.last_compaction_duration_ms.is_some());
    assert!(!stats.is_compacting);
    assert_eq!(stats.level_file_names[1].len(), 1);
    assert!(stats.level_byte_sizes[1] > 0);
    Ok(())
}

#[tokio::test]
async fn stats_track_bloom_hits_and_misses() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(test_config(dir.path(), 1024 * 1024, false))?;

    engine.put(b"present".to_vec(), b"v".to_vec()).await?;
    engine.flush().await?;

    // A hit in memtable never reaches the sstables, so probe misses that
    // actually run the bloom filter: one definite absence, one that the
    // filter cannot rule out.
    engine.get(b"absent").await?;
    engine.get(b"present").await?;

    let stats = engine.stats().await;
    assert!(stats.bloom_hits + stats.bloom_misses > 0);
    Ok(())
}
