//! Batched publishing helper
//!
//! Claiming and publishing one sequence at a time pays the coordination
//! cost per event. The batch publisher amortizes it: claim a window of
//! slots in one call, fill them, release them in one publish. Two modes
//! are provided - a fixed-size accumulator and a dynamic window with
//! explicit begin/end.
//!
//! The publisher is producer-side state and is used from one producer
//! thread at a time; on a multi-producer ring each producer owns its own
//! publisher.

use std::sync::Arc;

use crate::ring_buffer::RingBuffer;
use crate::{Result, RinglineError};

/// Producer-side batched claim/publish helper over a [`RingBuffer`].
///
/// # Fixed mode
/// ```ignore
/// let mut publisher = ring.batch_publisher(100)?;
/// loop {
///     let event = publisher.claim()?;
///     event.value = next_value();
///     if publisher.is_full() {
///         publisher.publish_batch();
///     }
/// }
/// ```
///
/// # Dynamic mode
/// ```ignore
/// publisher.begin_batch(n)?;
/// for i in 0..n {
///     publisher.get_event(i).value = values[i as usize];
/// }
/// publisher.end_batch();
/// ```
pub struct BatchPublisher<T> {
    ring_buffer: Arc<RingBuffer<T>>,
    default_batch_size: i64,
    batch_capacity: i64,
    current_batch_size: i64,
    low_sequence: i64,
    high_sequence: i64,
    next_sequence: i64,
}

impl<T> BatchPublisher<T>
where
    T: Send + Sync,
{
    /// Create a publisher claiming `default_batch_size` slots per batch in
    /// fixed mode.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] unless
    /// `1 <= default_batch_size <= buffer_size`.
    pub fn new(ring_buffer: Arc<RingBuffer<T>>, default_batch_size: i64) -> Result<Self> {
        if default_batch_size < 1 || default_batch_size > ring_buffer.buffer_size() as i64 {
            return Err(RinglineError::InvalidClaimSize(default_batch_size));
        }

        Ok(Self {
            ring_buffer,
            default_batch_size,
            batch_capacity: 0,
            current_batch_size: 0,
            low_sequence: 0,
            high_sequence: 0,
            next_sequence: 0,
        })
    }

    // ---- Fixed mode ----

    /// Claim the next slot, starting a new batch of the default size when
    /// none is open. Publish with [`publish_batch`](Self::publish_batch)
    /// when [`is_full`](Self::is_full).
    ///
    /// # Errors
    /// Propagates claim errors from the ring buffer; blocks while the
    /// buffer is full.
    pub fn claim(&mut self) -> Result<&mut T> {
        debug_assert!(
            self.current_batch_size < self.batch_capacity || self.current_batch_size == 0,
            "claim() called on a full batch; publish_batch() first"
        );

        if self.current_batch_size == 0 {
            let high = self.ring_buffer.next_n(self.default_batch_size)?;
            self.high_sequence = high;
            self.low_sequence = high - self.default_batch_size + 1;
            self.next_sequence = self.low_sequence;
            self.batch_capacity = self.default_batch_size;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.current_batch_size += 1;
        // SAFETY: `sequence` lies inside the window this publisher claimed
        // and has not published; no consumer can see it yet.
        Ok(unsafe { &mut *self.ring_buffer.get_mut(sequence) })
    }

    /// True once every claimed slot of the current batch has been handed
    /// out by [`claim`](Self::claim).
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.batch_capacity > 0 && self.current_batch_size >= self.batch_capacity
    }

    /// Publish every slot claimed so far in the current batch.
    pub fn publish_batch(&mut self) {
        if self.current_batch_size > 0 {
            self.ring_buffer
                .publish_range(self.low_sequence, self.low_sequence + self.current_batch_size - 1);
            self.current_batch_size = 0;
        }
    }

    // ---- Dynamic mode ----

    /// Claim a window of exactly `size` slots, blocking while the buffer
    /// is full.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] unless
    /// `1 <= size <= buffer_size`.
    pub fn begin_batch(&mut self, size: i64) -> Result<()> {
        let high = self.ring_buffer.next_n(size)?;
        self.high_sequence = high;
        self.low_sequence = high - size + 1;
        self.next_sequence = self.low_sequence;
        self.batch_capacity = size;
        self.current_batch_size = size;
        Ok(())
    }

    /// Claim a window of `size` slots without blocking. Returns false when
    /// the buffer lacks capacity.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] when `size < 1`; a full
    /// buffer is reported as `Ok(false)`, not an error.
    pub fn try_begin_batch(&mut self, size: i64) -> Result<bool> {
        match self.ring_buffer.try_next_n(size) {
            Ok(high) => {
                self.high_sequence = high;
                self.low_sequence = high - size + 1;
                self.next_sequence = self.low_sequence;
                self.batch_capacity = size;
                self.current_batch_size = size;
                Ok(true)
            }
            Err(RinglineError::InsufficientCapacity) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Slot at `index` (0-based) within the current window.
    #[must_use]
    pub fn get_event(&mut self, index: i64) -> &mut T {
        debug_assert!(index >= 0 && index < self.batch_capacity);
        // SAFETY: the indexed sequence lies inside the claimed, unpublished
        // window.
        unsafe { &mut *self.ring_buffer.get_mut(self.low_sequence + index) }
    }

    /// Sequence number of the slot at `index` within the current window.
    #[must_use]
    pub fn sequence_at(&self, index: i64) -> i64 {
        self.low_sequence + index
    }

    /// Publish the whole current window.
    pub fn end_batch(&mut self) {
        self.ring_buffer
            .publish_range(self.low_sequence, self.high_sequence);
        self.current_batch_size = 0;
    }

    /// Publish only the first `count` slots of the current window.
    ///
    /// The remaining claimed slots stay unpublished; on a single-producer
    /// ring they are released by the next publish, on a multi-producer ring
    /// they would leave a gap, so partial publishes are meaningful mainly
    /// for the single-producer cursor protocol.
    pub fn end_batch_first(&mut self, count: i64) {
        if count > 0 && count <= self.batch_capacity {
            self.ring_buffer
                .publish_range(self.low_sequence, self.low_sequence + count - 1);
        }
        self.current_batch_size = 0;
    }

    // ---- Accessors ----

    /// Number of slots claimed in the current batch.
    #[must_use]
    pub fn current_batch_size(&self) -> i64 {
        self.current_batch_size
    }

    /// Capacity of the current batch window.
    #[must_use]
    pub fn batch_capacity(&self) -> i64 {
        self.batch_capacity
    }

    /// Lowest sequence of the current window.
    #[must_use]
    pub fn low_sequence(&self) -> i64 {
        self.low_sequence
    }

    /// Highest sequence of the current window.
    #[must_use]
    pub fn high_sequence(&self) -> i64 {
        self.high_sequence
    }
}
