//! Engine-wide statistics (spec §4.8): byte/document counters, extrema, defrag totals, and
//! five 11-bucket exponential histograms.
//!
//! Grounded on the teacher's `allocator` crate's gauge/counter shape (`JemallocGlobalStats`,
//! `ThreadStats`): plain atomics updated inline by the code paths that already observe the
//! relevant deltas, read without synchronisation for reporting.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Exponential bucket boundaries shared by every histogram (spec §4.8): sizes up to and
/// including a boundary fall in that bucket; the last bucket is unbounded.
pub const BUCKET_BOUNDARIES: [u64; 11] = [
    0,
    256,
    1024,
    4 * 1024,
    16 * 1024,
    64 * 1024,
    256 * 1024,
    1024 * 1024,
    4 * 1024 * 1024,
    16 * 1024 * 1024,
    64 * 1024 * 1024,
];

/// Number of buckets, including the trailing unbounded one.
pub const NUM_BUCKETS: usize = BUCKET_BOUNDARIES.len() + 1;

/// Find the bucket index `n` falls into by binary search over the boundary array.
pub fn bucket_of(n: u64) -> usize {
    match BUCKET_BOUNDARIES.binary_search(&n) {
        Ok(i) => i,
        Err(i) => i,
    }
}

/// An 11-bucket exponential histogram with atomic per-bucket counts.
#[derive(Debug, Default)]
pub struct Histogram {
    buckets: [AtomicU64; NUM_BUCKETS],
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation of `n`.
    pub fn observe(&self, n: u64) {
        self.buckets[bucket_of(n)].fetch_add(1, Ordering::Relaxed);
    }

    /// Move one observation from the bucket for `old` to the bucket for `new`, used when a
    /// document's tracked size changes and it needs to migrate histogram buckets.
    pub fn transition(&self, old: u64, new: u64) {
        let old_b = bucket_of(old);
        let new_b = bucket_of(new);
        if old_b != new_b {
            self.buckets[old_b].fetch_sub(1, Ordering::Relaxed);
            self.buckets[new_b].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot all bucket counts.
    pub fn snapshot(&self) -> [u64; NUM_BUCKETS] {
        let mut out = [0u64; NUM_BUCKETS];
        for (i, b) in self.buckets.iter().enumerate() {
            out[i] = b.load(Ordering::Relaxed);
        }
        out
    }
}

/// A key and its observed extremal value, tracked for the `DEBUG MAX-DEPTH-KEY` /
/// `DEBUG MAX-SIZE-KEY` diagnostic scans (spec §6.2).
#[derive(Debug, Clone, Default)]
pub struct ExtremalKey {
    pub key: Option<String>,
    pub value: u64,
}

/// Process-wide engine statistics.
#[derive(Debug, Default)]
pub struct Stats {
    document_count: AtomicI64,
    max_depth_seen: AtomicU64,
    max_size_seen: AtomicU64,
    defrag_count: AtomicU64,
    defrag_bytes: AtomicU64,

    max_depth_key: Mutex<ExtremalKey>,
    max_size_key: Mutex<ExtremalKey>,

    pub doc_histogram: Histogram,
    pub read_histogram: Histogram,
    pub insert_histogram: Histogram,
    pub update_histogram: Histogram,
    pub delete_histogram: Histogram,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_created(&self) {
        self.document_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn document_destroyed(&self) {
        self.document_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn document_count(&self) -> i64 {
        self.document_count.load(Ordering::Relaxed)
    }

    /// Record a document's size moving from `old_size` to `new_size`, including the initial
    /// `old_size == 0` case on creation (still migrates into `doc_histogram`'s 0-bucket).
    pub fn record_size_transition(&self, key: &str, old_size: u64, new_size: u64) {
        self.doc_histogram.transition(old_size, new_size);
        self.max_size_seen.fetch_max(new_size, Ordering::Relaxed);
        let mut guard = self.max_size_key.lock().expect("max_size_key mutex poisoned");
        if new_size >= guard.value {
            guard.value = new_size;
            guard.key = Some(key.to_string());
        }
    }

    pub fn record_depth(&self, key: &str, depth: u64) {
        self.max_depth_seen.fetch_max(depth, Ordering::Relaxed);
        let mut guard = self.max_depth_key.lock().expect("max_depth_key mutex poisoned");
        if depth >= guard.value {
            guard.value = depth;
            guard.key = Some(key.to_string());
        }
    }

    pub fn record_defrag(&self, bytes: u64) {
        self.defrag_count.fetch_add(1, Ordering::Relaxed);
        self.defrag_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn max_depth_seen(&self) -> u64 {
        self.max_depth_seen.load(Ordering::Relaxed)
    }

    pub fn max_size_seen(&self) -> u64 {
        self.max_size_seen.load(Ordering::Relaxed)
    }

    pub fn defrag_totals(&self) -> (u64, u64) {
        (
            self.defrag_count.load(Ordering::Relaxed),
            self.defrag_bytes.load(Ordering::Relaxed),
        )
    }

    pub fn max_depth_key(&self) -> ExtremalKey {
        self.max_depth_key.lock().expect("max_depth_key mutex poisoned").clone()
    }

    pub fn max_size_key(&self) -> ExtremalKey {
        self.max_size_key.lock().expect("max_size_key mutex poisoned").clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bucket_boundaries_are_monotonic() {
        assert_eq!(bucket_of(0), 0);
        assert_eq!(bucket_of(256), 1);
        assert_eq!(bucket_of(257), 2);
        assert_eq!(bucket_of(u64::MAX), NUM_BUCKETS - 1);
    }

    #[test]
    fn transition_moves_count_between_buckets() {
        let h = Histogram::new();
        h.observe(0);
        let snap = h.snapshot();
        assert_eq!(snap[0], 1);

        h.transition(0, 5000);
        let snap = h.snapshot();
        assert_eq!(snap[0], 0);
        assert_eq!(snap[bucket_of(5000)], 1);
    }

    #[test]
    fn extremal_key_tracks_latest_max() {
        let stats = Stats::new();
        stats.record_size_transition("a", 0, 10);
        stats.record_size_transition("b", 0, 20);
        assert_eq!(stats.max_size_key().key.as_deref(), Some("b"));
        assert_eq!(stats.max_size_seen(), 20);
    }
}
