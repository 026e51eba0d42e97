//! Work-queue processors
//!
//! A work pool splits the stream across workers so each published sequence
//! is handled by exactly one of them. Workers share a claim counter: each
//! atomically grabs a batch of sequences, waits for the claimed window to
//! be published, handles it, and advances its own gating sequence.
//! Combined producer gating uses the minimum over all worker sequences.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::event_handler::WorkHandler;
use crate::event_processor::EventProcessor;
use crate::exception_handler::{ExceptionHandler, IgnoreExceptionHandler};
use crate::ring_buffer::RingBuffer;
use crate::sequence::Sequence;
use crate::sequence_barrier::SequenceBarrier;
use crate::thread_management::{ManagedThread, ThreadBuilder};
use crate::{Result, RinglineError};

/// Consumer with work-queue semantics: sequences are claimed from a counter
/// shared with the other workers in the pool, so no sequence is handled
/// twice.
///
/// Handler failures are delivered to the exception policy and then
/// dropped - a work queue must not stall on one poisoned message.
pub struct WorkProcessor<T> {
    ring_buffer: Arc<RingBuffer<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    handler: Mutex<Box<dyn WorkHandler<T>>>,
    exception_handler: Box<dyn ExceptionHandler<T>>,
    /// Claim counter shared across the pool.
    work_sequence: Arc<Sequence>,
    /// This worker's gating sequence.
    sequence: Arc<Sequence>,
    running: AtomicBool,
    work_batch_size: i64,
    /// Inclusive upper bound for drain-and-stop runs; `i64::MAX` runs until
    /// halted.
    end_sequence: i64,
}

impl<T> WorkProcessor<T>
where
    T: Send + Sync + 'static,
{
    /// Create a work processor with the ignore exception policy.
    ///
    /// # Arguments
    /// * `ring_buffer` - Source of events
    /// * `barrier` - Barrier on the producers (workers have no consumer
    ///   dependencies of their own)
    /// * `handler` - The work handler
    /// * `work_sequence` - Claim counter shared with the rest of the pool
    /// * `work_batch_size` - Sequences claimed per counter hit; larger
    ///   batches reduce contention on the shared counter
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] when `work_batch_size < 1`.
    pub fn new(
        ring_buffer: Arc<RingBuffer<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        handler: Box<dyn WorkHandler<T>>,
        work_sequence: Arc<Sequence>,
        work_batch_size: i64,
    ) -> Result<Self> {
        Self::with_exception_handler(
            ring_buffer,
            barrier,
            handler,
            Box::new(IgnoreExceptionHandler::new()),
            work_sequence,
            work_batch_size,
        )
    }

    /// Create a work processor with an explicit exception policy.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] when `work_batch_size < 1`.
    pub fn with_exception_handler(
        ring_buffer: Arc<RingBuffer<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        handler: Box<dyn WorkHandler<T>>,
        exception_handler: Box<dyn ExceptionHandler<T>>,
        work_sequence: Arc<Sequence>,
        work_batch_size: i64,
    ) -> Result<Self> {
        if work_batch_size < 1 {
            return Err(RinglineError::InvalidClaimSize(work_batch_size));
        }

        Ok(Self {
            ring_buffer,
            barrier,
            handler: Mutex::new(handler),
            exception_handler,
            work_sequence,
            sequence: Arc::new(Sequence::default()),
            running: AtomicBool::new(false),
            work_batch_size,
            end_sequence: i64::MAX,
        })
    }

    /// Bound the run to sequences up to `end_sequence` inclusive; the
    /// worker exits once its claims pass the bound.
    #[must_use]
    pub fn with_end_sequence(mut self, end_sequence: i64) -> Self {
        self.end_sequence = end_sequence;
        self
    }

    fn process_events(&self, handler: &mut Box<dyn WorkHandler<T>>) {
        let mut next_sequence: i64 = 0;
        let mut claimed_high: i64 = -1;

        while self.running.load(Ordering::Acquire) {
            if next_sequence > claimed_high {
                // Claim a fresh window; batching amortizes contention on
                // the shared counter.
                let base = self.work_sequence.get_and_add(self.work_batch_size);
                next_sequence = base + 1;
                claimed_high = base + self.work_batch_size;

                if next_sequence > self.end_sequence {
                    self.sequence.set(self.end_sequence);
                    break;
                }
                if claimed_high > self.end_sequence {
                    claimed_high = self.end_sequence;
                }
            }

            match self.barrier.wait_for(next_sequence) {
                Ok(available_sequence) => {
                    if available_sequence < next_sequence {
                        continue;
                    }

                    // Drain the overlap of the claimed window and the
                    // published window in one pass.
                    let high = available_sequence.min(claimed_high);
                    for sequence in next_sequence..=high {
                        // SAFETY: the claim counter makes this worker the
                        // only consumer of `sequence`, and the barrier saw
                        // it published.
                        let event = unsafe { &mut *self.ring_buffer.get_mut(sequence) };
                        if let Err(error) = handler.on_event(event, sequence) {
                            // Deliver and drop: the verdict is ignored by
                            // design for work queues.
                            let _ = self
                                .exception_handler
                                .handle_event_exception(error, sequence, &*event);
                        }
                    }

                    next_sequence = high + 1;
                    self.sequence.set(high);
                }
                Err(RinglineError::Alert) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }
}

impl<T> EventProcessor for WorkProcessor<T>
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

        self.process_events(&mut handler);

        if let Err(error) = handler.on_shutdown() {
            self.exception_handler.handle_on_shutdown_exception(error);
        }
        self.running.store(false, Ordering::Release);

        Ok(())
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

/// Convenience wrapper owning a set of [`WorkProcessor`]s over one shared
/// claim counter, with thread management for start/halt/join.
///
/// The pool does not register its workers as gating sequences; call
/// [`RingBuffer::add_gating_sequences`] with
/// [`worker_sequences`](Self::worker_sequences) before producing.
pub struct WorkerPool<T> {
    work_sequence: Arc<Sequence>,
    processors: Vec<Arc<WorkProcessor<T>>>,
    threads: Vec<ManagedThread>,
}

impl<T> WorkerPool<T>
where
    T: Send + Sync + 'static,
{
    /// Create a pool with one worker per handler.
    ///
    /// # Errors
    /// Returns [`RinglineError::InvalidClaimSize`] when `work_batch_size < 1`.
    pub fn new(
        ring_buffer: &Arc<RingBuffer<T>>,
        handlers: Vec<Box<dyn WorkHandler<T>>>,
        work_batch_size: i64,
    ) -> Result<Self> {
        let work_sequence = Arc::new(Sequence::default());
        let mut processors = Vec::with_capacity(handlers.len());

        for handler in handlers {
            processors.push(Arc::new(WorkProcessor::new(
                Arc::clone(ring_buffer),
                ring_buffer.new_barrier(Vec::new()),
                handler,
                Arc::clone(&work_sequence),
                work_batch_size,
            )?));
        }

        Ok(Self {
            work_sequence,
            processors,
            threads: Vec::new(),
        })
    }

    /// The gating sequences of all workers, for registration on the ring
    /// buffer.
    #[must_use]
    pub fn worker_sequences(&self) -> Vec<Arc<Sequence>> {
        self.processors
            .iter()
            .map(|processor| processor.get_sequence())
            .collect()
    }

    /// The shared claim counter.
    #[must_use]
    pub fn work_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.work_sequence)
    }

    /// Number of workers in the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.processors.len()
    }

    /// True while any worker's loop is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.processors.iter().any(|processor| processor.is_running())
    }

    /// Spawn one thread per worker and start their loops.
    ///
    /// # Errors
    /// Returns an [`std::io::Error`] from thread spawning wrapped as a
    /// panic-free failure; workers already started keep running.
    pub fn start(&mut self) -> std::io::Result<()> {
        debug!(workers = self.processors.len(), "starting worker pool");
        for (index, processor) in self.processors.iter().enumerate() {
            let processor = Arc::clone(processor);
            let thread = ThreadBuilder::new()
                .thread_name(format!("worker-{index}"))
                .spawn(move || {
                    if let Err(run_error) = processor.run() {
                        error!(worker = index, %run_error, "worker exited with error");
                    }
                })?;
            self.threads.push(thread);
        }
        Ok(())
    }

    /// Request every worker to stop and wake any that are blocked.
    pub fn halt(&self) {
        debug!(workers = self.processors.len(), "halting worker pool");
        for processor in &self.processors {
            processor.halt();
        }
    }

    /// Wait for every worker thread started by [`start`](Self::start) to
    /// finish.
    pub fn join(&mut self) {
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_factory::DefaultEventFactory;
    use crate::event_handler::ClosureWorkHandler;
    use crate::wait_strategy::BusySpinWaitStrategy;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicI64;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Debug, Default)]
    struct TestEvent {
        value: i64,
    }

    fn multi_ring(buffer_size: usize) -> Arc<RingBuffer<TestEvent>> {
        Arc::new(
            RingBuffer::create_multi_producer(
                buffer_size,
                Arc::new(BusySpinWaitStrategy::new()),
                DefaultEventFactory::<TestEvent>::new(),
            )
            .unwrap(),
        )
    }

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::yield_now();
        }
        condition()
    }

    #[test]
    fn test_work_batch_size_validation() {
        let ring = multi_ring(8);
        let work_sequence = Arc::new(Sequence::default());
        let result = WorkProcessor::new(
            Arc::clone(&ring),
            ring.new_barrier(Vec::new()),
            Box::new(ClosureWorkHandler::new(|_: &mut TestEvent, _| Ok(()))),
            work_sequence,
            0,
        );
        assert!(matches!(result, Err(RinglineError::InvalidClaimSize(0))));
    }

    #[test]
    fn test_single_worker_drains_everything() {
        let ring = multi_ring(64);
        let count = Arc::new(AtomicI64::new(0));
        let handler = {
            let count = Arc::clone(&count);
            ClosureWorkHandler::new(move |_event: &mut TestEvent, _sequence| {
                count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
        };

        let mut pool = WorkerPool::new(&ring, vec![Box::new(handler)], 4).unwrap();
        ring.add_gating_sequences(&pool.worker_sequences());
        pool.start().unwrap();

        for value in 0..32 {
            let sequence = ring.next().unwrap();
            unsafe { (*ring.get_mut(sequence)).value = value };
            ring.publish(sequence);
        }

        assert!(wait_until(Duration::from_secs(5), || {
            count.load(Ordering::Relaxed) == 32
        }));

        pool.halt();
        pool.join();
        assert!(!pool.is_running());
    }

    #[test]
    fn test_workers_process_disjoint_sequences() {
        let ring = multi_ring(128);
        let worker_count = 3;
        let total: i64 = 90;

        let seen: Vec<Arc<parking_lot::Mutex<HashSet<i64>>>> = (0..worker_count)
            .map(|_| Arc::new(parking_lot::Mutex::new(HashSet::new())))
            .collect();

        let handlers: Vec<Box<dyn WorkHandler<TestEvent>>> = seen
            .iter()
            .map(|set| {
                let set = Arc::clone(set);
                Box::new(ClosureWorkHandler::new(
                    move |_event: &mut TestEvent, sequence| {
                        set.lock().insert(sequence);
                        Ok(())
                    },
                )) as Box<dyn WorkHandler<TestEvent>>
            })
            .collect();

        let mut pool = WorkerPool::new(&ring, handlers, 2).unwrap();
        ring.add_gating_sequences(&pool.worker_sequences());
        pool.start().unwrap();

        for value in 0..total {
            let sequence = ring.next().unwrap();
            unsafe { (*ring.get_mut(sequence)).value = value };
            ring.publish(sequence);
        }

        assert!(wait_until(Duration::from_secs(5), || {
            seen.iter().map(|set| set.lock().len()).sum::<usize>() == total as usize
        }));

        pool.halt();
        pool.join();

        let mut union = HashSet::new();
        let mut counted = 0;
        for set in &seen {
            let set = set.lock();
            counted += set.len();
            union.extend(set.iter().copied());
        }
        // Pairwise disjoint and complete.
        assert_eq!(counted, union.len());
        assert_eq!(union, (0..total).collect::<HashSet<i64>>());
    }

    #[test]
    fn test_handler_errors_do_not_stall_pool() {
        let ring = multi_ring(32);
        let processed = Arc::new(AtomicI64::new(0));
        let handler = {
            let processed = Arc::clone(&processed);
            ClosureWorkHandler::new(move |event: &mut TestEvent, _sequence| {
                if event.value % 2 == 0 {
                    return Err(RinglineError::Handler("even values rejected".into()));
                }
                processed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
        };

        let mut pool = WorkerPool::new(&ring, vec![Box::new(handler)], 1).unwrap();
        ring.add_gating_sequences(&pool.worker_sequences());
        pool.start().unwrap();

        for value in 0..10 {
            let sequence = ring.next().unwrap();
            unsafe { (*ring.get_mut(sequence)).value = value };
            ring.publish(sequence);
        }

        // All ten delivered; five rejected, five processed, none replayed.
        assert!(wait_until(Duration::from_secs(5), || {
            processed.load(Ordering::Relaxed) == 5
        }));
        assert!(wait_until(Duration::from_secs(1), || {
            ring.minimum_gating_sequence() >= 9
        }));

        pool.halt();
        pool.join();
        assert_eq!(processed.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_end_sequence_bounds_worker() {
        let ring = multi_ring(32);
        let count = Arc::new(AtomicI64::new(0));
        let handler = {
            let count = Arc::clone(&count);
            ClosureWorkHandler::new(move |_event: &mut TestEvent, _sequence| {
                count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
        };

        let work_sequence = Arc::new(Sequence::default());
        let processor = Arc::new(
            WorkProcessor::new(
                Arc::clone(&ring),
                ring.new_barrier(Vec::new()),
                Box::new(handler),
                work_sequence,
                4,
            )
            .unwrap()
            .with_end_sequence(7),
        );
        ring.add_gating_sequences(&[processor.get_sequence()]);

        for value in 0..16 {
            let sequence = ring.next().unwrap();
            unsafe { (*ring.get_mut(sequence)).value = value };
            ring.publish(sequence);
        }

        // The worker drains 0..=7 and exits on its own.
        let worker = {
            let processor = Arc::clone(&processor);
            thread::spawn(move || processor.run())
        };
        worker.join().unwrap().unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 8);
        assert_eq!(processor.get_sequence().get(), 7);
    }
}
