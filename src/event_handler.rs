//! Event and work handlers
//!
//! Handlers are the consumer-side callbacks. Broadcast consumers implement
//! [`EventHandler`] and see every event with an end-of-batch flag; work
//! queue consumers implement [`WorkHandler`] and see each event exactly
//! once across the pool. Both carry optional lifecycle hooks invoked from
//! the processor thread.

use crate::Result;

/// Handler invoked by a [`BatchEventProcessor`](crate::BatchEventProcessor)
/// for every published event.
pub trait EventHandler<T>: Send + Sync {
    /// Process one event.
    ///
    /// `end_of_batch` is true on the last event of the current drain and is
    /// the handler's signal to flush any buffered work: the next event may
    /// be arbitrarily far away in time.
    ///
    /// # Errors
    /// A returned error is routed through the processor's
    /// [`ExceptionHandler`](crate::ExceptionHandler).
    fn on_event(&mut self, event: &mut T, sequence: i64, end_of_batch: bool) -> Result<()>;

    /// Called once on the processor thread before the first event.
    ///
    /// # Errors
    /// Errors are reported to the exception handler and do not abort the
    /// processor.
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on the processor thread after the last event.
    ///
    /// # Errors
    /// Errors are reported to the exception handler and do not abort
    /// shutdown.
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Handler invoked by a [`WorkProcessor`](crate::WorkProcessor) for the
/// events that worker claimed.
///
/// Unlike [`EventHandler`] there is no end-of-batch flag: neighbouring
/// sequences are usually handled by different workers, so batch boundaries
/// carry no meaning here.
pub trait WorkHandler<T>: Send + Sync {
    /// Process one event. Exactly one worker in the pool sees each
    /// sequence.
    ///
    /// # Errors
    /// A returned error is delivered to the worker's exception handler and
    /// then dropped; the pool never stalls on a poisoned event.
    fn on_event(&mut self, event: &mut T, sequence: i64) -> Result<()>;

    /// Called once on the worker thread before the first event.
    ///
    /// # Errors
    /// Errors are reported to the exception handler and do not abort the
    /// worker.
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once on the worker thread after the last event.
    ///
    /// # Errors
    /// Errors are reported to the exception handler and do not abort
    /// shutdown.
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// [`EventHandler`] backed by a closure.
pub struct ClosureEventHandler<T, F>
where
    F: FnMut(&mut T, i64, bool) -> Result<()> + Send + Sync,
{
    handler: F,
    _phantom: std::marker::PhantomData<fn(&mut T)>,
}

impl<T, F> ClosureEventHandler<T, F>
where
    F: FnMut(&mut T, i64, bool) -> Result<()> + Send + Sync,
{
    /// Create a handler from `handler`.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventHandler<T> for ClosureEventHandler<T, F>
where
    T: Send + Sync,
    F: FnMut(&mut T, i64, bool) -> Result<()> + Send + Sync,
{
    fn on_event(&mut self, event: &mut T, sequence: i64, end_of_batch: bool) -> Result<()> {
        (self.handler)(event, sequence, end_of_batch)
    }
}

/// [`WorkHandler`] backed by a closure.
pub struct ClosureWorkHandler<T, F>
where
    F: FnMut(&mut T, i64) -> Result<()> + Send + Sync,
{
    handler: F,
    _phantom: std::marker::PhantomData<fn(&mut T)>,
}

impl<T, F> ClosureWorkHandler<T, F>
where
    F: FnMut(&mut T, i64) -> Result<()> + Send + Sync,
{
    /// Create a handler from `handler`.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> WorkHandler<T> for ClosureWorkHandler<T, F>
where
    T: Send + Sync,
    F: FnMut(&mut T, i64) -> Result<()> + Send + Sync,
{
    fn on_event(&mut self, event: &mut T, sequence: i64) -> Result<()> {
        (self.handler)(event, sequence)
    }
}

/// Handler that does nothing. Useful for measuring framework overhead.
pub struct NoOpEventHandler<T> {
    _phantom: std::marker::PhantomData<fn(&mut T)>,
}

impl<T> NoOpEventHandler<T> {
    /// Create a new no-op handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> Default for NoOpEventHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventHandler<T> for NoOpEventHandler<T>
where
    T: Send + Sync,
{
    fn on_event(&mut self, _event: &mut T, _sequence: i64, _end_of_batch: bool) -> Result<()> {
        Ok(())
    }
}
