//! Merge iterator over multiple [`SSTableReader`]s.
//!
//! Produces `(key, ValueEntry)` pairs in ascending key order. When the same
//! key appears in multiple SSTables, only the entry with the **highest
//! sequence number** is emitted (newest wins).
//!
//! This is the core primitive for compaction: walk N input SSTables in sorted
//! order, deduplicate by seq, and write the result to a new SSTable.
//!
//! Each reader already holds its entries decoded in memory ([`SSTableReader::iter`]),
//! so the merge never touches disk — it's a pure k-way merge over resident
//! `Vec`s via a heap.

use anyhow::Result;
use memtable::ValueEntry;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::SSTableReader;

/// A pending entry from one SSTable source, used for heap-based merge ordering.
struct HeapEntry {
    key: Vec<u8>,
    entry: ValueEntry,
    /// Index into the `iters` array.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the *smallest* key first,
        // so reverse the key comparison. On tie, prefer the entry from
        // the source with the lower index (arbitrary but deterministic).
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges multiple SSTables into a single sorted stream of `(key, ValueEntry)`.
///
/// Duplicate keys are resolved by keeping only the entry with the highest
/// sequence number. The iterator is lazy — it pulls one entry at a time from
/// each source's in-memory cache.
pub struct MergeIterator<'a> {
    /// Per-reader: cached entries remaining to be yielded.
    iters: Vec<std::vec::IntoIter<(Vec<u8>, ValueEntry)>>,
    heap: BinaryHeap<HeapEntry>,
    _readers: std::marker::PhantomData<&'a ()>,
}

impl<'a> MergeIterator<'a> {
    /// Creates a new merge iterator over the given SSTable readers.
    ///
    /// Each reader's cached entries are cloned into an owned iterator and the
    /// first entry from each source is pushed onto a min-heap.
    pub fn new(readers: &'a [SSTableReader]) -> Self {
        let mut iters: Vec<std::vec::IntoIter<(Vec<u8>, ValueEntry)>> = Vec::with_capacity(readers.len());
        let mut heap = BinaryHeap::new();

        for (i, reader) in readers.iter().enumerate() {
            let owned: Vec<(Vec<u8>, ValueEntry)> = reader
                .iter()
                .map(|(k, v)| (k.to_vec(), v.clone()))
                .collect();
            let mut iter = owned.into_iter();
            if let Some((key, entry)) = iter.next() {
                heap.push(HeapEntry {
                    key,
                    entry,
                    source: i,
                });
            }
            iters.push(iter);
        }

        Self {
            iters,
            heap,
            _readers: std::marker::PhantomData,
        }
    }

    /// Returns the next `(key, ValueEntry)` in sorted order, or `None` when
    /// all sources are exhausted.
    ///
    /// Duplicate keys (same key from multiple SSTables) are resolved by
    /// keeping only the entry with the highest sequence number.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, ValueEntry)>> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };

        if let Some((next_key, next_entry)) = self.iters[top.source].next() {
            self.heap.push(HeapEntry {
                key: next_key,
                entry: next_entry,
                source: top.source,
            });
        }

        let best_key = top.key;
        let mut best_entry = top.entry;

        // Drain all heap entries with the same key, keeping only the one
        // with the highest seq.
        while let Some(peek) = self.heap.peek() {
            if peek.key != best_key {
                break;
            }
            let dup = self.heap.pop().unwrap();

            if dup.entry.seq > best_entry.seq {
                best_entry = dup.entry;
            }

            if let Some((next_key, next_entry)) = self.iters[dup.source].next() {
                self.heap.push(HeapEntry {
                    key: next_key,
                    entry: next_entry,
                    source: dup.source,
                });
            }
        }

        Ok(Some((best_key, best_entry)))
    }

    /// Collects all remaining entries into a `Vec`.
    ///
    /// Useful for testing and for building a merged memtable for compaction.
    pub fn collect_all(&mut self) -> Result<Vec<(Vec<u8>, ValueEntry)>> {
        let mut result = Vec::new();
        while let Some(pair) = self.next_entry()? {
            result.push(pair);
        }
        Ok(result)
    }
}
