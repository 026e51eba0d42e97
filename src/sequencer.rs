//! Sequencer implementations
//!
//! Sequencers hand out sequence numbers to producers and track publication
//! so consumers never read a slot before it is fully written, and producers
//! never overwrite a slot the slowest consumer has not passed. Two
//! protocols are provided: a single-writer fast path and a CAS-coordinated
//! multi-producer variant with per-slot availability tracking.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;

use crate::sequence::Sequence;
use crate::wait_strategy::WaitStrategy;
use crate::{is_power_of_two, Result, RinglineError, INITIAL_CURSOR_VALUE};

/// Coordination point between producers and the gating consumers.
///
/// A sequencer owns the cursor (the claim/publication high-water mark), the
/// set of gating sequences (consumer progress counters the producer must
/// not overtake by more than the buffer size), and the publication
/// bookkeeping for its producer mode.
pub trait Sequencer: Send + Sync + std::fmt::Debug {
    /// The cursor sequence tracked by consumers of this sequencer.
    fn get_cursor(&self) -> Arc<Sequence>;

    /// Capacity of the ring this sequencer coordinates.
    fn buffer_size(&self) -> usize;

    /// True if `required_capacity` more slots could be claimed right now
    /// without overtaking the slowest gating sequence.
    fn has_available_capacity(&self, required_capacity: i64) -> bool;

    /// Number of slots that could currently be claimed.
    fn remaining_capacity(&self) -> i64;

    /// Claim the next sequence, blocking (spinning with yields) while the
    /// buffer is full.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] when the buffer size is
    /// zero-capacity for the claim (never for a valid construction).
    fn next(&self) -> Result<i64>;

    /// Claim the next `n` sequences, blocking while the buffer is full.
    /// Returns the highest claimed sequence; the claim covers
    /// `result - n + 1 ..= result`.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] unless `1 <= n <= buffer_size`.
    fn next_n(&self, n: i64) -> Result<i64>;

    /// Claim the next sequence without blocking.
    ///
    /// # Errors
    /// Returns [`RinglineError::InsufficientCapacity`] when the claim would
    /// overtake the slowest gating sequence.
    fn try_next(&self) -> Result<i64>;

    /// Claim the next `n` sequences without blocking.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] when `n < 1` and
    /// [`RinglineError::InsufficientCapacity`] when the buffer is too full.
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Mark `sequence` as produced and wake blocked consumers.
    fn publish(&self, sequence: i64);

    /// Mark every sequence in `low..=high` as produced and wake blocked
    /// consumers once.
    fn publish_range(&self, low: i64, high: i64);

    /// True if `sequence` has been published and not yet wrapped.
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence `s` such that every sequence in
    /// `lower_bound..=s` is published, at most `available_sequence`.
    ///
    /// Consumers in multi-producer mode must not read past this value even
    /// when the cursor is further ahead, because slots inside the claim
    /// window may still be unpublished.
    fn get_highest_published_sequence(&self, lower_bound: i64, available_sequence: i64) -> i64;

    /// Register consumer sequences the producer must gate on.
    ///
    /// Must be called before the producer starts claiming; the registry is
    /// not synchronized against in-flight claims.
    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]);

    /// Remove a gating sequence by identity. Returns whether it was found.
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Minimum over the gating sequences, or the cursor value when no
    /// gating sequence is registered.
    fn get_minimum_sequence(&self) -> i64;
}

/// Sequencer for a single publishing thread.
///
/// The claim counter and the cached gating minimum live in producer-local
/// state: this thread is their only writer, so they are read and written
/// with relaxed ordering and visibility rides on the cursor's release
/// store at publish time.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating_sequences: RwLock<Vec<Arc<Sequence>>>,
    /// Producer-local claim high-water mark. Not shared; relaxed access only.
    next_value: AtomicI64,
    /// Producer-local cache of the minimum gating sequence.
    cached_value: AtomicI64,
}

impl SingleProducerSequencer {
    /// Create a new single-producer sequencer.
    ///
    /// `buffer_size` must already be validated as a power of two by the
    /// ring buffer that owns this sequencer.
    #[must_use]
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        debug_assert!(is_power_of_two(buffer_size));
        Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            gating_sequences: RwLock::new(Vec::new()),
            next_value: AtomicI64::new(INITIAL_CURSOR_VALUE),
            cached_value: AtomicI64::new(INITIAL_CURSOR_VALUE),
        }
    }

    fn minimum_gating_sequence(&self, default_value: i64) -> i64 {
        Sequence::minimum_sequence(&self.gating_sequences.read(), default_value)
    }

    /// Capacity check shared by `try_next_n` and the public predicate.
    ///
    /// When `do_store` is set and the cached gating minimum was stale, the
    /// producer's private claim counter is republished to the cursor so
    /// consumers observe forward progress while the producer backs off.
    fn check_available_capacity(&self, required_capacity: i64, do_store: bool) -> bool {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let wrap_point = (next_value + required_capacity) - self.buffer_size as i64;
        let cached_gating = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating || cached_gating > next_value {
            if do_store {
                self.cursor.set_volatile(next_value);
            }

            let min_sequence = self.minimum_gating_sequence(next_value);
            self.cached_value.store(min_sequence, Ordering::Relaxed);
            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Sequencer for SingleProducerSequencer {
    fn get_cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.check_available_capacity(required_capacity, false)
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.next_value.load(Ordering::Relaxed);
        let consumed = self.minimum_gating_sequence(produced);
        self.buffer_size as i64 - (produced - consumed)
    }

    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        if n < 1 || n > self.buffer_size as i64 {
            return Err(RinglineError::InvalidClaimSize(n));
        }

        let next_value = self.next_value.load(Ordering::Relaxed);
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.buffer_size as i64;
        let cached_gating = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating || cached_gating > next_value {
            // Make forward progress visible before spinning on consumers.
            self.cursor.set_volatile(next_value);

            let mut min_sequence = self.minimum_gating_sequence(next_value);
            while wrap_point > min_sequence {
                thread::yield_now();
                min_sequence = self.minimum_gating_sequence(next_value);
            }
            self.cached_value.store(min_sequence, Ordering::Relaxed);
        }

        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        if n < 1 {
            return Err(RinglineError::InvalidClaimSize(n));
        }

        if !self.check_available_capacity(n, true) {
            return Err(RinglineError::InsufficientCapacity);
        }

        let next_sequence = self.next_value.load(Ordering::Relaxed) + n;
        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn publish(&self, sequence: i64) {
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _low: i64, high: i64) {
        // The cursor already implies contiguous publication below it.
        self.publish(high);
    }

    fn is_available(&self, sequence: i64) -> bool {
        let current = self.cursor.get();
        sequence <= current && sequence > current - self.buffer_size as i64
    }

    fn get_highest_published_sequence(&self, _lower_bound: i64, available_sequence: i64) -> i64 {
        available_sequence
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.gating_sequences.write().extend_from_slice(gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        let mut sequences = self.gating_sequences.write();
        if let Some(pos) = sequences.iter().position(|s| Arc::ptr_eq(s, sequence)) {
            sequences.remove(pos);
            true
        } else {
            false
        }
    }

    fn get_minimum_sequence(&self) -> i64 {
        self.minimum_gating_sequence(self.cursor.get())
    }
}

/// Sequencer coordinating any number of publishing threads.
///
/// Claims are allocated with an atomic fetch-add on the cursor, so racing
/// producers obtain disjoint intervals. Publication is tracked per slot in
/// an availability array: slot `s & (N-1)` holds the round number `s >> k`
/// once `s` is published, which lets the same slot be reused across rounds
/// without ambiguity.
#[derive(Debug)]
pub struct MultiProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating_sequences: RwLock<Vec<Arc<Sequence>>>,
    /// Per-slot round numbers; -1 means never published. Entries are 4
    /// bytes and deliberately unpadded: padding each one out to a cache
    /// line would multiply the array's footprint many times over.
    available_buffer: Box<[AtomicI32]>,
    index_mask: usize,
    index_shift: u32,
    /// Shared cache of the minimum gating sequence, padded like any other
    /// contended counter.
    gating_sequence_cache: Sequence,
}

impl MultiProducerSequencer {
    /// Create a new multi-producer sequencer.
    ///
    /// `buffer_size` must already be validated as a power of two by the
    /// ring buffer that owns this sequencer.
    #[must_use]
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        debug_assert!(is_power_of_two(buffer_size));

        let available_buffer: Box<[AtomicI32]> =
            (0..buffer_size).map(|_| AtomicI32::new(-1)).collect();

        Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            gating_sequences: RwLock::new(Vec::new()),
            available_buffer,
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
            gating_sequence_cache: Sequence::default(),
        }
    }

    fn minimum_gating_sequence(&self, default_value: i64) -> i64 {
        Sequence::minimum_sequence(&self.gating_sequences.read(), default_value)
    }

    #[inline]
    fn calculate_index(&self, sequence: i64) -> usize {
        (sequence as usize) & self.index_mask
    }

    #[inline]
    fn calculate_availability_flag(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    /// Release-store the round number for `sequence`. After this store, an
    /// acquire load of the same entry that observes the matching round also
    /// observes every slot write that preceded publication.
    fn set_available(&self, sequence: i64) {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].store(flag, Ordering::Release);
    }

    fn check_available_capacity(&self, required_capacity: i64, cursor_value: i64) -> bool {
        let wrap_point = (cursor_value + required_capacity) - self.buffer_size as i64;
        let cached_gating = self.gating_sequence_cache.get();

        if wrap_point > cached_gating || cached_gating > cursor_value {
            let min_sequence = self.minimum_gating_sequence(cursor_value);
            self.gating_sequence_cache.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Sequencer for MultiProducerSequencer {
    fn get_cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.check_available_capacity(required_capacity, self.cursor.get())
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.cursor.get();
        let consumed = self.minimum_gating_sequence(produced);
        self.buffer_size as i64 - (produced - consumed)
    }

    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        if n < 1 || n > self.buffer_size as i64 {
            return Err(RinglineError::InvalidClaimSize(n));
        }

        let current = self.cursor.get_and_add(n);
        let next_sequence = current + n;
        let wrap_point = next_sequence - self.buffer_size as i64;
        let cached_gating = self.gating_sequence_cache.get();

        if wrap_point > cached_gating || cached_gating > current {
            let mut gating_sequence = self.minimum_gating_sequence(current);
            while wrap_point > gating_sequence {
                thread::yield_now();
                gating_sequence = self.minimum_gating_sequence(current);
            }
            self.gating_sequence_cache.set(gating_sequence);
        }

        Ok(next_sequence)
    }

    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        if n < 1 {
            return Err(RinglineError::InvalidClaimSize(n));
        }

        loop {
            let current = self.cursor.get();
            let next_sequence = current + n;

            if !self.check_available_capacity(n, current) {
                return Err(RinglineError::InsufficientCapacity);
            }

            if self.cursor.compare_and_set(current, next_sequence) {
                return Ok(next_sequence);
            }
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, low: i64, high: i64) {
        // Low-to-high keeps the contiguity scan deterministic; consumers
        // only assume each slot is individually released.
        for sequence in low..=high {
            self.set_available(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].load(Ordering::Acquire) == flag
    }

    fn get_highest_published_sequence(&self, lower_bound: i64, available_sequence: i64) -> i64 {
        let mut sequence = lower_bound;
        while sequence <= available_sequence {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
            sequence += 1;
        }
        available_sequence
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.gating_sequences.write().extend_from_slice(gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        let mut sequences = self.gating_sequences.write();
        if let Some(pos) = sequences.iter().position(|s| Arc::ptr_eq(s, sequence)) {
            sequences.remove(pos);
            true
        } else {
            false
        }
    }

    fn get_minimum_sequence(&self) -> i64 {
        self.minimum_gating_sequence(self.cursor.get())
    }
}
