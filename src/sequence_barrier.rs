//! Sequence barriers
//!
//! A sequence barrier is the consumer-side wait coordinator: it combines
//! the producer cursor, the sequences of any upstream consumers this
//! consumer depends on, an alert flag for cooperative shutdown, and the
//! sequencer's contiguity scan for multi-producer rings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::sequence::Sequence;
use crate::sequencer::Sequencer;
use crate::wait_strategy::WaitStrategy;
use crate::{Result, RinglineError};

/// Coordination barrier a consumer waits on before reading events.
pub trait SequenceBarrier: Send + Sync {
    /// Wait until `sequence` is produced by the cursor and reached by every
    /// dependency.
    ///
    /// Returns the highest sequence safe to consume, which is usually
    /// `>= sequence` but may be lower in multi-producer mode when a slot
    /// inside the claim window is still unpublished; callers treat a lower
    /// value as "retry".
    ///
    /// # Errors
    /// Returns [`RinglineError::Alert`] when the barrier is alerted while
    /// waiting.
    fn wait_for(&self, sequence: i64) -> Result<i64>;

    /// The cursor sequence this barrier tracks.
    fn get_cursor(&self) -> Arc<Sequence>;

    /// True if the barrier has been alerted and not yet cleared.
    fn is_alerted(&self) -> bool;

    /// Set the alert flag and wake any blocked waiters.
    fn alert(&self);

    /// Clear the alert flag so the barrier can be waited on again.
    fn clear_alert(&self);

    /// Fail fast with [`RinglineError::Alert`] if the barrier is alerted.
    fn check_alert(&self) -> Result<()>;
}

/// The production barrier implementation.
///
/// Holds the sequencer so `wait_for` can reduce the wait strategy's answer
/// to the highest *contiguously published* sequence; for single-producer
/// rings that reduction is the identity, so this one type serves both
/// producer modes.
pub struct ProcessingSequenceBarrier {
    cursor: Arc<Sequence>,
    wait_strategy: Arc<dyn WaitStrategy>,
    dependent_sequences: Vec<Arc<Sequence>>,
    sequencer: Arc<dyn Sequencer>,
    alerted: AtomicBool,
}

impl ProcessingSequenceBarrier {
    /// Create a barrier over `cursor` gated additionally on
    /// `dependent_sequences`.
    #[must_use]
    pub fn new(
        cursor: Arc<Sequence>,
        wait_strategy: Arc<dyn WaitStrategy>,
        dependent_sequences: Vec<Arc<Sequence>>,
        sequencer: Arc<dyn Sequencer>,
    ) -> Self {
        Self {
            cursor,
            wait_strategy,
            dependent_sequences,
            sequencer,
            alerted: AtomicBool::new(false),
        }
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available_sequence = self.wait_strategy.wait_for(
            sequence,
            &self.cursor,
            &self.dependent_sequences,
            &self.alerted,
        )?;

        if available_sequence < sequence {
            return Ok(available_sequence);
        }

        Ok(self
            .sequencer
            .get_highest_published_sequence(sequence, available_sequence))
    }

    fn get_cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            Err(RinglineError::Alert)
        } else {
            Ok(())
        }
    }
}
