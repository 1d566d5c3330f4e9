//! Read path: `get()` and `scan()`.
//!
//! Point lookups check the Memtable first (freshest data, tombstones
//! included), then SSTables level by level, newest-first within a level.
//! The first match at any layer is authoritative -- a newer tombstone always
//! shadows an older value, so there is no need to keep searching once a
//! match is found.
//!
//! Range scans merge every source into a `BTreeMap`, keep the highest-seq
//! entry per key, drop tombstones, and apply the caller's bounds and limit.

use memtable::ValueEntry;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use crate::{Engine, EngineError};

impl Engine {
    /// Looks up a key, returning `Some((seq, value))` if it exists and is live.
    pub async fn get(&self, key: &[u8]) -> Result<Option<(u64, Vec<u8>)>, EngineError> {
        self.inner.total_reads.fetch_add(1, Ordering::Relaxed);
        let state = self.inner.state.read().unwrap();

        if let Some(entry) = state.mem.get_entry(key) {
            return Ok(entry.value.as_ref().map(|v| (entry.seq, v.clone())));
        }

        for level in &state.levels {
            for sst in level {
                if let Some(entry) = sst.get(key)? {
                    return Ok(entry.value.map(|v| (entry.seq, v)));
                }
            }
        }

        Ok(None)
    }

    /// Scans a range of keys, returning live key-value pairs in ascending
    /// key order.
    ///
    /// `start` and `end` are both inclusive bounds;
    /// `None` leaves that side unbounded. `limit` truncates the result to at
    /// most that many pairs.
    pub async fn scan(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
        self.inner.total_reads.fetch_add(1, Ordering::Relaxed);
        let state = self.inner.state.read().unwrap();
        let mut merged: BTreeMap<Vec<u8>, ValueEntry> = BTreeMap::new();

        for (key, entry) in state.mem.range(start, end) {
            merge_in(&mut merged, key, entry.clone());
        }

        for level in &state.levels {
            for sst in level {
                for (key, entry) in sst.iter() {
                    if in_range(key, start, end) {
                        merge_in(&mut merged, key, entry.clone());
                    }
                }
            }
        }

        let mut result: Vec<(Vec<u8>, Vec<u8>)> = merged
            .into_iter()
            .filter_map(|(key, entry)| entry.value.map(|v| (key, v)))
            .collect();

        if let Some(limit) = limit {
            result.truncate(limit);
        }

        Ok(result)
    }
}

fn merge_in(map: &mut BTreeMap<Vec<u8>, ValueEntry>, key: &[u8], entry: ValueEntry) {
    match map.get(key) {
        Some(existing) if existing.seq >= entry.seq => {}
        _ => {
            map.insert(key.to_vec(), entry);
        }
    }
}

fn in_range(key: &[u8], start: Option<&[u8]>, end: Option<&[u8]>) -> bool {
    if let Some(start) = start {
        if key < start {
            return false;
        }
    }
    if let Some(end) = end {
        if key > end {
            return false;
        }
    }
    true
}
