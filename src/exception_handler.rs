//! Exception handling policies
//!
//! An exception handler decides what a processor does when user handler
//! code fails. The policy is injected per processor at construction - there
//! is no global default. Two built-ins cover the common cases: fatal
//! (log and terminate the consumer) and ignore (log and keep consuming).

use tracing::{error, warn};

use crate::{Result, RinglineError};

/// Policy for handler failures inside a processor loop.
///
/// `handle_event_exception` doubles as the policy decision: returning
/// `Ok(())` tells the processor to continue with the next event, returning
/// an error tells it to stop and surface that error from `run()`.
pub trait ExceptionHandler<T>: Send + Sync {
    /// Invoked when `on_event` fails.
    ///
    /// # Arguments
    /// * `error` - The error the handler returned
    /// * `sequence` - Sequence of the failing event
    /// * `event` - The event being processed when the failure occurred
    ///
    /// # Errors
    /// Returning an error terminates the processor loop; the processor's
    /// own sequence has already been advanced to `sequence` so producers do
    /// not wedge behind the dead consumer.
    fn handle_event_exception(&self, error: RinglineError, sequence: i64, event: &T)
        -> Result<()>;

    /// Invoked when `on_start` fails. Never aborts the processor.
    fn handle_on_start_exception(&self, error: RinglineError);

    /// Invoked when `on_shutdown` fails. Never aborts shutdown.
    fn handle_on_shutdown_exception(&self, error: RinglineError);
}

/// Log the failure and terminate the consumer.
///
/// The default policy for [`BatchEventProcessor`](crate::BatchEventProcessor):
/// a broadcast consumer that silently skipped events would leave downstream
/// consumers with inconsistent views.
#[derive(Debug, Default)]
pub struct FatalExceptionHandler<T> {
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T> FatalExceptionHandler<T> {
    /// Create a new fatal policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> ExceptionHandler<T> for FatalExceptionHandler<T>
where
    T: Send + Sync,
{
    fn handle_event_exception(
        &self,
        error: RinglineError,
        sequence: i64,
        _event: &T,
    ) -> Result<()> {
        error!(sequence, %error, "event handler failed, terminating processor");
        Err(error)
    }

    fn handle_on_start_exception(&self, error: RinglineError) {
        error!(%error, "handler failed during on_start");
    }

    fn handle_on_shutdown_exception(&self, error: RinglineError) {
        error!(%error, "handler failed during on_shutdown");
    }
}

/// Log the failure and keep consuming.
///
/// The default policy for [`WorkProcessor`](crate::WorkProcessor): a work
/// queue must not stall on a single poisoned message.
#[derive(Debug, Default)]
pub struct IgnoreExceptionHandler<T> {
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T> IgnoreExceptionHandler<T> {
    /// Create a new ignore policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> ExceptionHandler<T> for IgnoreExceptionHandler<T>
where
    T: Send + Sync,
{
    fn handle_event_exception(
        &self,
        error: RinglineError,
        sequence: i64,
        _event: &T,
    ) -> Result<()> {
        warn!(sequence, %error, "event handler failed, continuing");
        Ok(())
    }

    fn handle_on_start_exception(&self, error: RinglineError) {
        warn!(%error, "handler failed during on_start");
    }

    fn handle_on_shutdown_exception(&self, error: RinglineError) {
        warn!(%error, "handler failed during on_shutdown");
    }
}

/// Policy assembled from closures, for ad-hoc behaviors in tests and hosts
/// that already have their own error plumbing.
pub struct ClosureExceptionHandler<T, F, S, H>
where
    F: Fn(RinglineError, i64, &T) -> Result<()> + Send + Sync,
    S: Fn(RinglineError) + Send + Sync,
    H: Fn(RinglineError) + Send + Sync,
{
    event_handler: F,
    start_handler: S,
    shutdown_handler: H,
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T, F, S, H> ClosureExceptionHandler<T, F, S, H>
where
    F: Fn(RinglineError, i64, &T) -> Result<()> + Send + Sync,
    S: Fn(RinglineError) + Send + Sync,
    H: Fn(RinglineError) + Send + Sync,
{
    /// Create a policy from the three hook closures.
    pub fn new(event_handler: F, start_handler: S, shutdown_handler: H) -> Self {
        Self {
            event_handler,
            start_handler,
            shutdown_handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F, S, H> ExceptionHandler<T> for ClosureExceptionHandler<T, F, S, H>
where
    T: Send + Sync,
    F: Fn(RinglineError, i64, &T) -> Result<()> + Send + Sync,
    S: Fn(RinglineError) + Send + Sync,
    H: Fn(RinglineError) + Send + Sync,
{
    fn handle_event_exception(&self, error: RinglineError, sequence: i64, event: &T) -> Result<()> {
        (self.event_handler)(error, sequence, event)
    }

    fn handle_on_start_exception(&self, error: RinglineError) {
        (self.start_handler)(error);
    }

    fn handle_on_shutdown_exception(&self, error: RinglineError) {
        (self.shutdown_handler)(error);
    }
}
