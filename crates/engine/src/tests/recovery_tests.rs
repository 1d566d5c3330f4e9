use super::helpers::test_config;
use crate::*;
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

// --------------------- Recovery ---------------------

#[tokio::test]
async fn recovery_from_wal() -> Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), 1024 * 1024, true);

    {
        let engine = Engine::open(config.clone())?;
        engine.put(b"a".to_vec(), b"1".to_vec()).await?;
        engine.put(b"b".to_vec(), b"2".to_vec()).await?;
        engine.delete(b"a".to_vec()).await?;
    }

    let engine = Engine::open(config)?;
    assert!(engine.get(b"a").await?.is_none());
    assert_eq!(engine.get(b"b").await?.unwrap().1, b"2".to_vec());
    assert_eq!(engine.seq(), 3);
    Ok(())
}

#[tokio::test]
async fn recovery_from_sstables() -> Result<()> {
    let dir = tempdir()?;

    {
        let engine = Engine::open(test_config(dir.path(), 1, true))?;
        engine.put(b"k".to_vec(), b"v".to_vec()).await?;
    }

    let engine = Engine::open(test_config(dir.path(), 1024 * 1024, true))?;
    assert_eq!(engine.get(b"k").await?.unwrap().1, b"v".to_vec());
    Ok(())
}

#[tokio::test]
async fn recovery_combines_wal_and_sstables() -> Result<()> {
    let dir = tempdir()?;

    {
        let engine = Engine::open(test_config(dir.path(), 1, true))?;
        engine.put(b"flushed".to_vec(), b"in_sst".to_vec()).await?;
    }

    {
        let engine = Engine::open(test_config(dir.path(), 1024 * 1024, true))?;
        engine.put(b"in_wal".to_vec(), b"pending".to_vec()).await?;
    }

    let engine = Engine::open(test_config(dir.path(), 1024 * 1024, true))?;
    assert_eq!(engine.get(b"flushed").await?.unwrap().1, b"in_sst".to_vec());
    assert_eq!(engine.get(b"in_wal").await?.unwrap().1, b"pending".to_vec());
    Ok(())
}

// --------------------- Manifest recovery ---------------------

#[tokio::test]
async fn manifest_preserves_levels_across_restart() -> Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), 64, false);

    {
        let engine = Engine::open(config.clone())?;

        for i in 0..20u64 {
            engine.put(format!("k{:04}", i).into_bytes(), b"val".to_vec()).await?;
        }
        let stats = engine.stats().await;
        assert!(stats.level_sstable_counts[0] > 0);

        engine.compact().await?;
        let stats = engine.stats().await;
        assert_eq!(stats.level_sstable_counts[0], 0);
        assert_eq!(stats.level_sstable_counts[1], 1);

        for i in 20..25u64 {
            engine.put(format!("k{:04}", i).into_bytes(), b"val2".to_vec()).await?;
        }
        let stats = engine.stats().await;
        assert!(stats.level_sstable_counts[0] > 0);
        assert_eq!(stats.level_sstable_counts[1], 1);
    }

    let engine = Engine::open(config)?;
    let stats = engine.stats().await;
    assert!(stats.level_sstable_counts[0] > 0, "L0 should be preserved");
    assert_eq!(stats.level_sstable_counts[1], 1, "L1 should be preserved");

    for i in 0..25u64 {
        assert!(engine.get(format!("k{:04}", i).as_bytes()).await?.is_some());
    }
    Ok(())
}

// --------------------- Ordering correctness across many flushes ---------------------

#[tokio::test]
async fn recovery_loads_sstables_in_newest_first_order() -> Result<()> {
    // Regression guard: recency order must come from the file_id recorded in
    // each SSTable's own header, not from lexicographic filename sort.
    let dir = tempdir()?;
    let config = test_config(dir.path(), 1, false);

    {
        let engine = Engine::open(config.clone())?;
        for i in 0..15u64 {
            engine.put(format!("k{:02}", i).into_bytes(), format!("v{}", i).into_bytes()).await?;
        }
    }

    let engine = Engine::open(config)?;
    for i in 0..15u64 {
        let key = format!("k{:02}", i).into_bytes();
        let expected = format!("v{}", i).into_bytes();
        let (_, val) = engine.get(&key).await?.unwrap_or_else(|| panic!("k{:02} missing", i));
        assert_eq!(val, expected, "k{:02} has wrong value", i);
    }
    Ok(())
}

#[tokio::test]
async fn sst_overwrite_across_flushes_returns_newest() -> Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), 1, false);

    {
        let engine = Engine::open(config.clone())?;
        for i in 0..12u64 {
            engine.put(b"shared".to_vec(), format!("v{}", i).into_bytes()).await?;
        }
    }

    let engine = Engine::open(config)?;
    let (_, val) = engine.get(b"shared").await?.expect("shared key missing");
    assert_eq!(val, b"v11", "should read newest value after recovery");
    Ok(())
}

// --------------------- Tmp file cleanup on recovery ---------------------

#[tokio::test]
async fn recovery_cleans_up_tmp_files() -> Result<()> {
    let dir = tempdir()?;
    let sst_dir = dir.path().join("sst");
    fs::create_dir_all(&sst_dir)?;

    let dat_tmp = sst_dir.join("sst_L0_1.dat.tmp");
    let bloom_tmp = sst_dir.join("sst_L0_1.bloom.tmp");
    fs::write(&dat_tmp, b"garbage")?;
    fs::write(&bloom_tmp, b"garbage")?;
    assert!(dat_tmp.exists());

    let _engine = Engine::open(test_config(dir.path(), 1024 * 1024, false))?;

    assert!(!dat_tmp.exists(), ".dat.tmp should be cleaned up on recovery");
    assert!(!bloom_tmp.exists(), ".bloom.tmp should be cleaned up on recovery");
    Ok(())
}

// --------------------- Seq recovery across WAL segment rotation ---------------------

#[tokio::test]
async fn seq_recovered_from_sstables_after_wal_rotation() -> Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path(), 1, false);

    {
        let engine = Engine::open(config.clone())?;
        engine.put(b"a".to_vec(), b"1".to_vec()).await?;
        engine.put(b"b".to_vec(), b"2".to_vec()).await?;
        engine.put(b"c".to_vec(), b"3".to_vec()).await?;
        // Every put flushed at threshold=1, rotating the WAL segment each
        // time and deleting the prior one, so nothing is left to replay.
    }

    let engine = Engine::open(config)?;
    assert!(
        engine.seq() >= 3,
        "seq should be recovered from SSTable headers, got {}",
        engine.seq()
    );

    engine.put(b"d".to_vec(), b"4".to_vec()).await?;
    assert!(engine.seq() > 3, "new write seq should exceed recovered seq, got {}", engine.seq());
    Ok(())
}

// --------------------- WAL open error propagation ---------------------

#[test]
fn replay_wal_propagates_non_notfound_errors() {
    let mut mem = memtable::Memtable::new();
    let result = replay_wal_and_build(std::path::Path::new("/nonexistent/path/wal.log"), &mut mem);
    assert!(result.is_ok());
    assert_eq!(result.unwrap(), 0);
}
