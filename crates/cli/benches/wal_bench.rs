use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::tempdir;
use wal::{WalRecord, WalWriter};

const N_RECORDS: u64 = 10_000;

fn wal_append_synced_benchmark(c: &mut Criterion) {
    c.bench_function("wal_append_10k_synced", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.log");
                let writer = WalWriter::create(&path, true).unwrap();
                (dir, writer)
            },
            |(_dir, mut writer)| {
                for seq in 1..=N_RECORDS {
                    let record = WalRecord::put(seq, format!("key{}", seq).into_bytes(), vec![b'x'; 100]);
                    writer.append(&record).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn wal_append_unsynced_benchmark(c: &mut Criterion) {
    c.bench_function("wal_append_10k_unsynced", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.log");
                let writer = WalWriter::create(&path, false).unwrap();
                (dir, writer)
            },
            |(_dir, mut writer)| {
                for seq in 1..=N_RECORDS {
                    let record = WalRecord::put(seq, format!("key{}", seq).into_bytes(), vec![b'x'; 100]);
                    writer.append(&record).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn wal_replay_benchmark(c: &mut Criterion) {
    c.bench_function("wal_replay_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.log");
                {
                    let mut writer = WalWriter::create(&path, false).unwrap();
                    for seq in 1..=N_RECORDS {
                        let record = WalRecord::put(seq, format!("key{}", seq).into_bytes(), vec![b'x'; 100]);
                        writer.append(&record).unwrap();
                    }
                }
                (dir, path)
            },
            |(_dir, path)| {
                let mut mem = memtable::Memtable::new();
                engine::replay_wal_and_build(&path, &mut mem).unwrap();
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    wal_append_synced_benchmark,
    wal_append_unsynced_benchmark,
    wal_replay_benchmark
);
criterion_main!(benches);
