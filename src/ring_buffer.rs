//! Ring buffer implementation
//!
//! The ring buffer owns the preallocated slot array and fronts a sequencer
//! with claim/publish/barrier plumbing. Slots are created exactly once by a
//! user-supplied factory during construction and addressed modulo the
//! power-of-two capacity; coordination is carried entirely by sequence
//! publication, never by locks around the slots.

use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::batch_publisher::BatchPublisher;
use crate::event_factory::EventFactory;
use crate::producer_type::ProducerType;
use crate::sequence::Sequence;
use crate::sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
use crate::sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
use crate::wait_strategy::WaitStrategy;
use crate::{is_power_of_two, Result, RinglineError};

/// Preallocated ring of event slots coordinated by a sequencer.
///
/// Access discipline: the producer that claimed sequence `s` owns
/// `slot(s)` exclusively until it publishes `s`; after publication every
/// downstream consumer may read the slot until the slowest gating sequence
/// moves past `s`, at which point the slot may be claimed again. The
/// buffer itself never validates this - sequencing does.
///
/// # Type Parameters
/// * `T` - The event type stored in each slot
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    index_mask: i64,
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
}

// SAFETY: slots are UnsafeCell but all aliasing is coordinated by sequence
// publication: a slot has one writer (the claiming producer) until the
// release store that publishes it, and only readers afterwards until the
// gating sequences pass it. The atomic sequence counters carry the
// happens-before edges.
unsafe impl<T: Send + Sync> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T>
where
    T: Send + Sync,
{
    /// Create a ring buffer with `buffer_size` slots populated by
    /// `event_factory`.
    ///
    /// The factory is invoked exactly `buffer_size` times before any
    /// producer or consumer can observe a slot.
    ///
    /// # Arguments
    /// * `buffer_size` - Number of slots; must be a power of two, at least 1
    /// * `producer_type` - Selects the sequencer implementation
    /// * `wait_strategy` - Shared by every barrier created from this buffer
    /// * `event_factory` - Called once per slot to preallocate events
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidBufferSize`] if `buffer_size` is not
    /// a power of two.
    pub fn new<F>(
        buffer_size: usize,
        producer_type: ProducerType,
        wait_strategy: Arc<dyn WaitStrategy>,
        event_factory: F,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        if !is_power_of_two(buffer_size) {
            return Err(RinglineError::InvalidBufferSize(buffer_size));
        }

        let sequencer: Arc<dyn Sequencer> = match producer_type {
            ProducerType::Single => Arc::new(SingleProducerSequencer::new(
                buffer_size,
                Arc::clone(&wait_strategy),
            )),
            ProducerType::Multi => Arc::new(MultiProducerSequencer::new(
                buffer_size,
                Arc::clone(&wait_strategy),
            )),
        };

        let slots: Box<[UnsafeCell<T>]> = (0..buffer_size)
            .map(|_| UnsafeCell::new(event_factory.new_instance()))
            .collect();

        Ok(Self {
            slots,
            index_mask: (buffer_size - 1) as i64,
            sequencer,
            wait_strategy,
        })
    }

    /// Create a single-producer ring buffer.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidBufferSize`] if `buffer_size` is not
    /// a power of two.
    pub fn create_single_producer<F>(
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
        event_factory: F,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::new(buffer_size, ProducerType::Single, wait_strategy, event_factory)
    }

    /// Create a multi-producer ring buffer.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidBufferSize`] if `buffer_size` is not
    /// a power of two.
    pub fn create_multi_producer<F>(
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
        event_factory: F,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::new(buffer_size, ProducerType::Multi, wait_strategy, event_factory)
    }

    /// Claim the next sequence, blocking while the buffer is full.
    ///
    /// # Errors
    /// See [`Sequencer::next`].
    pub fn next(&self) -> Result<i64> {
        self.sequencer.next()
    }

    /// Claim the next `n` sequences, blocking while the buffer is full.
    /// Returns the highest claimed sequence.
    ///
    /// # Errors
    /// See [`Sequencer::next_n`].
    pub fn next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.next_n(n)
    }

    /// Claim the next sequence without blocking.
    ///
    /// # Errors
    /// See [`Sequencer::try_next`].
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    /// Claim the next `n` sequences without blocking.
    ///
    /// # Errors
    /// See [`Sequencer::try_next_n`].
    pub fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    /// Mark `sequence` as produced.
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Mark every sequence in `low..=high` as produced.
    pub fn publish_range(&self, low: i64, high: i64) {
        self.sequencer.publish_range(low, high);
    }

    /// Shared reference to the slot for `sequence`.
    ///
    /// The caller must hold the right to read this sequence: either it was
    /// released by a barrier wait, or the caller claimed it and has not yet
    /// published.
    #[inline]
    pub fn get(&self, sequence: i64) -> &T {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: index is masked into bounds.
        let slot = unsafe { self.slots.get_unchecked(index) };
        unsafe { &*slot.get() }
    }

    /// Raw mutable pointer to the slot for `sequence`.
    ///
    /// # Safety
    /// The caller must have claimed `sequence` and not yet published it
    /// (producer side), or be the only consumer mutating it between
    /// publication and its own sequence advance. No other reference to the
    /// slot may be alive while the returned pointer is written through.
    #[inline]
    pub unsafe fn get_mut(&self, sequence: i64) -> *mut T {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: index is masked into bounds.
        let slot = self.slots.get_unchecked(index);
        slot.get()
    }

    /// Create a barrier gated on this buffer's cursor and the given
    /// dependency sequences.
    ///
    /// Pass an empty vector for consumers that depend only on the
    /// producers; pass upstream consumers' sequences to build pipeline or
    /// diamond topologies.
    #[must_use]
    pub fn new_barrier(&self, dependent_sequences: Vec<Arc<Sequence>>) -> Arc<dyn SequenceBarrier> {
        Arc::new(ProcessingSequenceBarrier::new(
            self.sequencer.get_cursor(),
            Arc::clone(&self.wait_strategy),
            dependent_sequences,
            Arc::clone(&self.sequencer),
        ))
    }

    /// Create a batched publisher over this buffer.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] unless
    /// `1 <= default_batch_size <= buffer_size`.
    pub fn batch_publisher(
        self: &Arc<Self>,
        default_batch_size: i64,
    ) -> Result<BatchPublisher<T>> {
        BatchPublisher::new(Arc::clone(self), default_batch_size)
    }

    /// Register consumer sequences the producers gate on.
    pub fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(gating_sequences);
    }

    /// Remove a gating sequence by identity. Returns whether it was found.
    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Number of slots in the ring.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    /// Current cursor value.
    #[must_use]
    pub fn cursor(&self) -> i64 {
        self.sequencer.get_cursor().get()
    }

    /// The cursor sequence itself.
    #[must_use]
    pub fn cursor_sequence(&self) -> Arc<Sequence> {
        self.sequencer.get_cursor()
    }

    /// Number of slots that could currently be claimed.
    #[must_use]
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// Minimum gating sequence, i.e. the slowest consumer's progress.
    #[must_use]
    pub fn minimum_gating_sequence(&self) -> i64 {
        self.sequencer.get_minimum_sequence()
    }

    /// True if `sequence` has been published and not yet wrapped.
    #[must_use]
    pub fn is_available(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// The sequencer backing this buffer.
    #[must_use]
    pub fn sequencer(&self) -> &Arc<dyn Sequencer> {
        &self.sequencer
    }
}
