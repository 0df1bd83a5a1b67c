//! Accounting allocator (spec §4.1).
//!
//! Every byte reachable from a document should be allocated through this layer so that
//! total JSON memory, and the per-write delta charged to a single mutation, are observable
//! without walking the tree. Grounded on the teacher's `allocator` crate, which instruments
//! jemalloc with a process-wide atomic plus a `thread_local` counter and exposes a
//! begin/end-delta pair (`ThreadStatsReader::current()` / `ThreadStats::sub`) that mutation
//! code brackets its work with; this module reproduces that shape without requiring a custom
//! global allocator, so document byte accounting works the same whether or not the host also
//! swaps in its own `#[global_allocator]`.

use std::cell::Cell;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

thread_local! {
    static THREAD_BYTES: Cell<i64> = Cell::new(0);
}

static GLOBAL_BYTES: AtomicI64 = AtomicI64::new(0);
static ALLOC_OPS: AtomicU64 = AtomicU64::new(0);
static FREE_OPS: AtomicU64 = AtomicU64::new(0);
static REALLOC_OPS: AtomicU64 = AtomicU64::new(0);

/// A snapshot of the thread-local byte counter, returned by [`Accounting::begin_track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot(i64);

/// Handle onto the process's document-byte accounting. Cheap to construct; all state it
/// touches is global/thread-local, so any number of `Accounting` values may coexist.
#[derive(Debug, Default, Clone, Copy)]
pub struct Accounting {
    trap_mode: bool,
}

/// A heap allocation made through [`Accounting`], tracking both the caller-requested size
/// and the real allocated size (which trap-mode flanking, or allocator rounding, may exceed).
#[derive(Debug)]
pub struct Tracked {
    buf: Vec<u8>,
    requested: usize,
}

const TRAP_PREFIX: u64 = 0xDEC0_DED0_FEED_FACE;
const TRAP_SUFFIX: u64 = 0xCAFE_BABE_5EA1_5EED;
const TRAP_OVERHEAD: usize = 16; // one u64 flank on each side

impl Accounting {
    /// Create a new accounting handle with trap mode disabled.
    pub fn new() -> Self {
        Self { trap_mode: false }
    }

    /// Real allocated size for a requested size, accounting for trap-mode flanking.
    fn real_size(&self, requested: usize) -> usize {
        if self.trap_mode {
            requested + TRAP_OVERHEAD
        } else {
            requested
        }
    }

    fn charge(&self, delta: i64) {
        GLOBAL_BYTES.fetch_add(delta, Ordering::Relaxed);
        THREAD_BYTES.with(|c| c.set(c.get() + delta));
    }

    /// Allocate `n` bytes of document-attributable storage.
    pub fn alloc(&self, n: usize) -> Tracked {
        ALLOC_OPS.fetch_add(1, Ordering::Relaxed);
        let real = self.real_size(n);
        self.charge(real as i64);

        let mut buf = vec![0u8; real];
        if self.trap_mode {
            buf[0..8].copy_from_slice(&TRAP_PREFIX.to_le_bytes());
            buf[real - 8..real].copy_from_slice(&TRAP_SUFFIX.to_le_bytes());
        }
        Tracked { buf, requested: n }
    }

    /// Free a previously tracked allocation, charging back its real size.
    pub fn free(&self, t: Tracked) {
        FREE_OPS.fetch_add(1, Ordering::Relaxed);
        self.charge(-(self.alloc_size(&t) as i64));
    }

    /// Grow or shrink a tracked allocation to hold `n` bytes of payload, preserving the
    /// leading `min(old_requested, n)` bytes. Always allocate+copy+free under trap mode.
    pub fn realloc(&self, t: Tracked, n: usize) -> Tracked {
        REALLOC_OPS.fetch_add(1, Ordering::Relaxed);
        let old_real = self.alloc_size(&t);

        // `alloc` below already charges the new real size; we only need to
        // separately charge back the size of the allocation being replaced.
        let mut new = self.alloc(n);
        let copy_len = t.requested.min(n);
        new.payload_mut()[..copy_len].copy_from_slice(&t.payload()[..copy_len]);

        self.charge(-(old_real as i64));
        new
    }

    /// The real number of bytes actually allocated for `t` (may exceed the requested size).
    pub fn alloc_size(&self, t: &Tracked) -> usize {
        t.buf.len()
    }

    /// Validate a trap-mode allocation's flanking sentinels. Always true outside trap mode.
    pub fn validate(&self, t: &Tracked) -> bool {
        if !self.trap_mode {
            return true;
        }
        let real = t.buf.len();
        if real < TRAP_OVERHEAD {
            return false;
        }
        let prefix_ok = t.buf[0..8] == TRAP_PREFIX.to_le_bytes();
        let suffix_ok = t.buf[real - 8..real] == TRAP_SUFFIX.to_le_bytes();
        prefix_ok && suffix_ok
    }

    /// Enable or disable trap mode. Per spec §4.1 this may only be toggled when no
    /// outstanding allocations exist; since commands run serially on a single host
    /// thread (spec §5), the calling thread's own counter is used as the witness.
    pub fn set_trap_mode(&mut self, enabled: bool) -> crate::error::Result<()> {
        if THREAD_BYTES.with(|c| c.get()) != 0 {
            return Err(crate::error::Error::InvalidConfigValue("enable-memory-traps"));
        }
        self.trap_mode = enabled;
        Ok(())
    }

    /// Snapshot the current thread-local byte counter.
    pub fn begin_track(&self) -> Snapshot {
        Snapshot(THREAD_BYTES.with(|c| c.get()))
    }

    /// Return the signed delta in thread-local bytes since `snapshot` was taken.
    pub fn end_track(&self, snapshot: Snapshot) -> i64 {
        THREAD_BYTES.with(|c| c.get()) - snapshot.0
    }

    /// Current process-wide byte total.
    pub fn global_bytes(&self) -> i64 {
        GLOBAL_BYTES.load(Ordering::Relaxed)
    }

    /// Allocation/free/realloc operation counters, for diagnostics.
    pub fn op_counts(&self) -> (u64, u64, u64) {
        (
            ALLOC_OPS.load(Ordering::Relaxed),
            FREE_OPS.load(Ordering::Relaxed),
            REALLOC_OPS.load(Ordering::Relaxed),
        )
    }
}

impl Tracked {
    /// The payload bytes, excluding trap-mode flanking.
    pub fn payload(&self) -> &[u8] {
        if self.buf.len() == self.requested {
            &self.buf[..]
        } else {
            &self.buf[8..8 + self.requested]
        }
    }

    /// Mutable access to the payload bytes, excluding trap-mode flanking.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let requested = self.requested;
        if self.buf.len() == requested {
            &mut self.buf[..]
        } else {
            &mut self.buf[8..8 + requested]
        }
    }

    /// Number of payload bytes this allocation was requested to hold.
    pub fn len(&self) -> usize {
        self.requested
    }

    /// True if this allocation holds zero payload bytes.
    pub fn is_empty(&self) -> bool {
        self.requested == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn alloc_and_free_balance_thread_counter() {
        let acc = Accounting::new();
        let snap = acc.begin_track();
        let t = acc.alloc(128);
        assert_eq!(acc.end_track(snap), 128);
        acc.free(t);
        assert_eq!(acc.end_track(snap), 0);
    }

    #[test]
    fn realloc_preserves_prefix_and_accounts_delta() {
        let acc = Accounting::new();
        let snap = acc.begin_track();
        let mut t = acc.alloc(4);
        t.payload_mut().copy_from_slice(b"abcd");
        let t = acc.realloc(t, 8);
        assert_eq!(&t.payload()[..4], b"abcd");
        assert_eq!(acc.end_track(snap), 8);
        acc.free(t);
        assert_eq!(acc.end_track(snap), 0);
    }

    #[test]
    fn trap_mode_validates_sentinels() {
        let mut acc = Accounting::new();
        acc.set_trap_mode(true).unwrap();
        let t = acc.alloc(16);
        assert!(acc.validate(&t));
        acc.free(t);
    }

    #[test]
    fn trap_mode_toggle_rejected_with_outstanding_allocations() {
        let mut acc = Accounting::new();
        let t = acc.alloc(8);
        assert!(acc.set_trap_mode(true).is_err());
        acc.free(t);
    }
}
