//! Sequence counter implementation
//!
//! Sequences track progress through the ring buffer and coordinate between
//! producers and consumers. They provide atomic operations while preventing
//! false sharing through careful memory layout.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::INITIAL_CURSOR_VALUE;

/// Cache line size assumed for padding purposes.
///
/// 64 bytes covers current x86-64 and most AArch64 parts; the padding below
/// isolates the counter across two lines so adjacent-line prefetching cannot
/// pull a neighbour's data in either.
pub const CACHE_LINE_SIZE: usize = 64;

/// A 64-bit sequence counter isolated on its own cache line.
///
/// The payload is padded on both sides so that no other object can share a
/// cache line with it, regardless of where the allocator places neighbours.
/// The whole struct is two cache lines in size and aligned to that size.
///
/// Writes use release ordering and reads acquire ordering, so a thread that
/// observes a value `v` also observes every write that happened before the
/// corresponding `set(v)`. Relaxed variants exist for the cases where the
/// caller establishes ordering through another variable.
#[repr(C, align(128))]
pub struct Sequence {
    _left_padding: [u8; CACHE_LINE_SIZE - std::mem::size_of::<AtomicI64>()],
    value: AtomicI64,
    _right_padding: [u8; CACHE_LINE_SIZE],
}

// Layout invariants: payload isolated, total size two cache lines.
const _: () = assert!(std::mem::size_of::<Sequence>() == 2 * CACHE_LINE_SIZE);
const _: () = assert!(std::mem::align_of::<Sequence>() >= CACHE_LINE_SIZE);

impl Sequence {
    /// Create a new sequence with the given initial value.
    #[must_use]
    pub fn new(initial_value: i64) -> Self {
        Self {
            _left_padding: [0; CACHE_LINE_SIZE - std::mem::size_of::<AtomicI64>()],
            value: AtomicI64::new(initial_value),
            _right_padding: [0; CACHE_LINE_SIZE],
        }
    }

    /// Get the current value with acquire ordering.
    ///
    /// Pairs with [`set`](Self::set) to establish happens-before: any write
    /// performed before the release store is visible to a thread that
    /// observes its value here.
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Get the current value with no ordering.
    ///
    /// Use only when the caller has already established ordering through
    /// some other synchronizing operation.
    #[inline]
    pub fn get_relaxed(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Store `value` with release ordering.
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Store `value` with no ordering.
    ///
    /// Permitted only when this thread is the exclusive writer and
    /// visibility is carried by a later release on another variable.
    #[inline]
    pub fn set_relaxed(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Store `value` with sequentially consistent ordering.
    ///
    /// Used by the single-producer claim path to make forward progress
    /// visible to gating consumers before the producer starts spinning on
    /// them.
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically replace `expected` with `new`.
    ///
    /// Acquire-release ordering on success, acquire on failure. Returns
    /// whether the swap happened.
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Atomically increment by one and return the new value.
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Atomically add `increment` and return the new value.
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }

    /// Atomically add `increment` and return the previous value.
    #[inline]
    pub fn get_and_add(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel)
    }

    /// Minimum value across `sequences`, or `default_value` when the slice
    /// is empty.
    ///
    /// Producers gate their claims on this minimum; wait strategies use it
    /// to fold dependency sequences into the available sequence.
    #[must_use]
    pub fn minimum_sequence(sequences: &[Arc<Sequence>], default_value: i64) -> i64 {
        sequences
            .iter()
            .map(|sequence| sequence.get())
            .min()
            .unwrap_or(default_value)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence").field("value", &self.get()).finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}
