//! Event processors
//!
//! A batch event processor is the standard broadcast consumer: it waits on
//! its barrier for the next sequence, drains the whole contiguous run of
//! available events through the handler, then advances its own sequence so
//! downstream consumers and gating producers observe progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event_handler::EventHandler;
use crate::exception_handler::{ExceptionHandler, FatalExceptionHandler};
use crate::ring_buffer::RingBuffer;
use crate::sequence::Sequence;
use crate::sequence_barrier::SequenceBarrier;
use crate::{Result, RinglineError};

/// A consumer loop the host runs on a thread of its choosing.
///
/// Lifecycle: Idle -> Running (`run`) -> Halting (`halt`) -> Idle. `halt`
/// is cooperative: it flips the running flag, alerts the barrier, and the
/// loop exits at its next suspension point. `halt` is idempotent.
pub trait EventProcessor: Send + Sync {
    /// Run the processing loop on the calling thread until halted.
    ///
    /// # Errors
    /// Returns [`RinglineError::AlreadyRunning`] if the processor is
    /// already running, or the terminal error when the exception policy
    /// decided to stop the consumer.
    fn run(&self) -> Result<()>;

    /// Request the processing loop to exit and wake it if blocked.
    fn halt(&self);

    /// True while the processing loop is executing.
    fn is_running(&self) -> bool;

    /// The sequence advertising this processor's progress. Register it as
    /// a gating sequence on the ring buffer before producing.
    fn get_sequence(&self) -> Arc<Sequence>;
}

/// Broadcast consumer that drains contiguous runs of published events.
///
/// # Type Parameters
/// * `T` - The event type stored in the ring buffer
pub struct BatchEventProcessor<T> {
    ring_buffer: Arc<RingBuffer<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    /// Handler guarded for the duration of `run`; `halt` never touches it.
    handler: Mutex<Box<dyn EventHandler<T>>>,
    exception_handler: Box<dyn ExceptionHandler<T>>,
    sequence: Arc<Sequence>,
    running: AtomicBool,
}

impl<T> BatchEventProcessor<T>
where
    T: Send + Sync + 'static,
{
    /// Create a processor with the fatal exception policy.
    #[must_use]
    pub fn new(
        ring_buffer: Arc<RingBuffer<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        handler: Box<dyn EventHandler<T>>,
    ) -> Self {
        Self::with_exception_handler(
            ring_buffer,
            barrier,
            handler,
            Box::new(FatalExceptionHandler::new()),
        )
    }

    /// Create a processor with an explicit exception policy.
    #[must_use]
    pub fn with_exception_handler(
        ring_buffer: Arc<RingBuffer<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        handler: Box<dyn EventHandler<T>>,
        exception_handler: Box<dyn ExceptionHandler<T>>,
    ) -> Self {
        Self {
            ring_buffer,
            barrier,
            handler: Mutex::new(handler),
            exception_handler,
            sequence: Arc::new(Sequence::default()),
            running: AtomicBool::new(false),
        }
    }

    /// The barrier this processor waits on.
    #[must_use]
    pub fn barrier(&self) -> &Arc<dyn SequenceBarrier> {
        &self.barrier
    }

    fn process_events(&self, handler: &mut Box<dyn EventHandler<T>>) -> Result<()> {
        let mut next_sequence = self.sequence.get() + 1;

        while self.running.load(Ordering::Acquire) {
            match self.barrier.wait_for(next_sequence) {
                Ok(available_sequence) => {
                    // May be below the target in multi-producer mode when a
                    // claimed slot is still unpublished; retry the wait.
                    if available_sequence < next_sequence {
                        continue;
                    }

                    let mut resume_at = None;
                    for sequence in next_sequence..=available_sequence {
                        let end_of_batch = sequence == available_sequence;
                        // SAFETY: the barrier released `sequence` to this
                        // consumer and its own sequence has not passed it,
                        // so the producer cannot reclaim the slot yet.
                        let event = unsafe { &mut *self.ring_buffer.get_mut(sequence) };

                        if let Err(error) = handler.on_event(event, sequence, end_of_batch) {
                            self.exception_handler
                                .handle_event_exception(error, sequence, &*event)
                                .map_err(|terminal| {
                                    // Advance past the failing event so
                                    // producers are not wedged behind a dead
                                    // consumer.
                                    self.sequence.set(sequence);
                                    terminal
                                })?;
                            resume_at = Some(sequence);
                            break;
                        }
                    }

                    if let Some(sequence) = resume_at {
                        self.sequence.set(sequence);
                        next_sequence = sequence + 1;
                    } else {
                        self.sequence.set(available_sequence);
                        next_sequence = available_sequence + 1;
                    }
                }
                Err(RinglineError::Alert) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    // Spurious alert: someone alerted and cleared the
                    // barrier without halting this processor.
                }
                Err(error) => return Err(error),
            }
        }

        Ok(())
    }
}

impl<T> EventProcessor for BatchEventProcessor<T>
where
    T: Send + Sync + 'static,
{
    fn run(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RinglineError::AlreadyRunning);
        }

        self.barrier.clear_alert();

        let mut handler = self.handler.lock();
        if let Err(error) = handler.on_start() {
            self.exception_handler.handle_on_start_exception(error);
        }

        let result = self.process_events(&mut handler);

        if let Err(error) = handler.on_shutdown() {
            self.exception_handler.handle_on_shutdown_exception(error);
        }
        self.running.store(false, Ordering::Release);

        result
    }

    fn halt(&self) {
        self.running.store(false, Ordering::Release);
        self.barrier.alert();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn get_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }
}
