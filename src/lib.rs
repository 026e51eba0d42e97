//! `ringline` - In-Process Event Exchange Core
//!
//! A high-throughput, low-latency event exchange built around a preallocated
//! ring buffer shared by one or more producers and one or more consumers.
//! Producers claim sequence numbers, write into preallocated slots, and
//! publish; consumers wait on sequence barriers and drain contiguous runs of
//! published events in batches.
//!
//! ## Features
//!
//! - **Lock-free hot path**: claim and publish use only atomic operations
//!   and memory fences; locks appear solely in the blocking wait strategy
//!   and the gating-sequence registry
//! - **Zero-allocation**: every slot is created once by a user-supplied
//!   factory during construction and reused for the life of the buffer
//! - **Mechanical sympathy**: sequence counters are padded and aligned so
//!   no two of them share a cache line
//! - **Single and multi producer**: a fast single-writer claim protocol and
//!   a CAS-based protocol with per-slot availability tracking
//! - **Pluggable waiting**: busy-spin, yielding, sleeping, and blocking
//!   strategies with cooperative alert-based shutdown
//! - **Broadcast and work-queue topologies**: batch processors deliver every
//!   event to every handler; worker pools deliver each event to exactly one
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! use ringline::{
//!     BatchEventProcessor, BusySpinWaitStrategy, ClosureEventHandler,
//!     DefaultEventFactory, EventProcessor, ProducerType, RingBuffer,
//! };
//!
//! #[derive(Debug, Default)]
//! struct Tick {
//!     value: i64,
//! }
//!
//! # fn main() -> ringline::Result<()> {
//! let ring = Arc::new(RingBuffer::new(
//!     8,
//!     ProducerType::Single,
//!     Arc::new(BusySpinWaitStrategy::new()),
//!     DefaultEventFactory::<Tick>::new(),
//! )?);
//!
//! let sum = Arc::new(AtomicI64::new(0));
//! let handler = {
//!     let sum = Arc::clone(&sum);
//!     ClosureEventHandler::new(move |event: &mut Tick, _sequence, _end_of_batch| {
//!         sum.fetch_add(event.value, Ordering::Relaxed);
//!         Ok(())
//!     })
//! };
//!
//! let processor = Arc::new(BatchEventProcessor::new(
//!     Arc::clone(&ring),
//!     ring.new_barrier(Vec::new()),
//!     Box::new(handler),
//! ));
//! ring.add_gating_sequences(&[processor.get_sequence()]);
//!
//! let consumer = {
//!     let processor = Arc::clone(&processor);
//!     std::thread::spawn(move || processor.run())
//! };
//!
//! for value in 1..=4 {
//!     let sequence = ring.next()?;
//!     // SAFETY: this producer just claimed `sequence` and has not published it.
//!     unsafe { (*ring.get_mut(sequence)).value = value };
//!     ring.publish(sequence);
//! }
//!
//! while sum.load(Ordering::Relaxed) < 10 {
//!     std::thread::yield_now();
//! }
//! processor.halt();
//! consumer.join().expect("consumer thread panicked")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Sequence`]: cache-line-isolated atomic progress counter
//! - [`RingBuffer`]: preallocated slot array and façade over a sequencer
//! - [`Sequencer`]: claim/publish coordination ([`SingleProducerSequencer`],
//!   [`MultiProducerSequencer`])
//! - [`SequenceBarrier`]: consumer-side wait coordinator with dependency
//!   tracking and alerting
//! - [`WaitStrategy`]: how consumers wait for publication
//! - [`BatchEventProcessor`]: broadcast consumer loop with lifecycle hooks
//! - [`WorkProcessor`] / [`WorkerPool`]: exactly-once work-queue consumers
//! - [`BatchPublisher`]: producer-side batched claim/publish helper
//! - [`ExceptionHandler`]: pluggable policy for handler failures

pub mod batch_publisher;
pub mod event_factory;
pub mod event_handler;
pub mod event_processor;
pub mod exception_handler;
pub mod producer_type;
pub mod ring_buffer;
pub mod sequence;
pub mod sequence_barrier;
pub mod sequencer;
pub mod thread_management;
pub mod wait_strategy;
pub mod work_processor;


pub use batch_publisher::BatchPublisher;
pub use event_factory::{
    event_factory, CloneEventFactory, ClosureEventFactory, DefaultEventFactory, EventFactory,
};
pub use event_handler::{
    ClosureEventHandler, ClosureWorkHandler, EventHandler, NoOpEventHandler, WorkHandler,
};
pub use event_processor::{BatchEventProcessor, EventProcessor};
pub use exception_handler::{
    ClosureExceptionHandler, ExceptionHandler, FatalExceptionHandler, IgnoreExceptionHandler,
};
pub use producer_type::ProducerType;
pub use ring_buffer::RingBuffer;
pub use sequence::Sequence;
pub use sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use thread_management::{available_cores, ManagedThread, ThreadBuilder};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, WaitStrategy,
    YieldingWaitStrategy,
};
pub use work_processor::{WorkProcessor, WorkerPool};

/// The initial value of every sequence counter before anything is claimed
/// or published.
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Errors surfaced by the event exchange core.
#[derive(Debug, thiserror::Error)]
pub enum RinglineError {
    /// The requested buffer size is not a power of two or is zero.
    #[error("buffer size must be a power of two and at least 1, got: {0}")]
    InvalidBufferSize(usize),

    /// A claim was requested for fewer than one slot, or for more slots
    /// than the buffer holds on a blocking claim path.
    #[error("invalid claim size: {0}")]
    InvalidClaimSize(i64),

    /// A non-blocking claim could not make room without overtaking the
    /// slowest gating sequence. The caller decides whether to retry, back
    /// off, or drop.
    #[error("insufficient capacity in ring buffer")]
    InsufficientCapacity,

    /// A wait was interrupted because the barrier was alerted, normally as
    /// part of a processor halt.
    #[error("sequence barrier alerted")]
    Alert,

    /// `run()` was invoked on a processor that is already running.
    #[error("event processor is already running")]
    AlreadyRunning,

    /// An event handler reported a failure.
    #[error("event handler failed: {0}")]
    Handler(String),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RinglineError>;

/// Returns true if `n` is a non-zero power of two.
#[must_use]
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}
