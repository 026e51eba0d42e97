//! Wait strategies
//!
//! Wait strategies determine how a consumer waits for a target sequence to
//! become available. Each trades CPU usage against wake-up latency: from a
//! dedicated-core busy spin down to condition-variable blocking. One
//! strategy instance may be shared by every barrier under a ring buffer;
//! producers signal it unconditionally after publishing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::sequence::Sequence;
use crate::{Result, RinglineError};

/// Strategy for waiting until a target sequence has been produced.
///
/// `wait_for` returns the available sequence, which is at least `sequence`
/// unless the wait was interrupted. All variants compute availability as
/// the minimum over the dependency sequences, falling back to the cursor
/// when there are none, and return [`RinglineError::Alert`] once they
/// observe the alert flag.
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Block, spin, or yield until `sequence` is available.
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    /// * `cursor` - The producer's published high-water mark
    /// * `dependents` - Sequences of upstream consumers this wait also
    ///   gates on (may be empty)
    /// * `alerted` - Alert flag owned by the calling barrier
    ///
    /// # Errors
    /// Returns [`RinglineError::Alert`] when the alert flag is observed.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64>;

    /// Wake any threads blocked inside `wait_for`.
    ///
    /// Only the blocking strategy has real work to do here; the polling
    /// strategies observe progress on their own. Producers and barriers
    /// call this unconditionally after publishing or alerting.
    fn signal_all_when_blocking(&self);
}

/// Effective available sequence: the slowest dependency, or the cursor when
/// the consumer has no dependencies.
#[inline]
fn available_sequence(cursor: &Sequence, dependents: &[Arc<Sequence>]) -> i64 {
    Sequence::minimum_sequence(dependents, cursor.get())
}

/// Busy-spin wait strategy.
///
/// Spins on the CPU pause hint without yielding. Lowest latency, burns a
/// full core while waiting; use only when cores can be dedicated to
/// consumers. The alert flag is sampled every 256 iterations to keep it off
/// the hot path.
#[derive(Debug, Default)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    /// Create a new busy-spin wait strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut counter: u32 = 0;
        loop {
            counter = counter.wrapping_add(1);
            if (counter & 0xFF) == 0 && alerted.load(Ordering::Relaxed) {
                return Err(RinglineError::Alert);
            }

            let available = available_sequence(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Yielding wait strategy.
///
/// Spins for a bounded number of pause iterations, then yields the thread
/// between checks. A reasonable default when consumers share cores with
/// other work but latency still matters.
#[derive(Debug, Default)]
pub struct YieldingWaitStrategy;

const SPIN_TRIES: u32 = 100;

impl YieldingWaitStrategy {
    /// Create a new yielding wait strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = SPIN_TRIES;
        loop {
            let available = available_sequence(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            if counter == 0 {
                // The alert check rides on the slow path only.
                if alerted.load(Ordering::Relaxed) {
                    return Err(RinglineError::Alert);
                }
                thread::yield_now();
                counter = SPIN_TRIES;
            } else {
                counter -= 1;
                std::hint::spin_loop();
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Sleeping wait strategy with progressive back-off.
///
/// Spins, then yields, then falls back to short sleeps. The cheapest
/// polling strategy in CPU terms at the cost of wake-up latency in the
/// sleep phase.
#[derive(Debug)]
pub struct SleepingWaitStrategy {
    sleep_duration: Duration,
}

const SLEEP_SPIN_TRIES: u32 = 200;
const SLEEP_YIELD_TRIES: u32 = 100;

impl SleepingWaitStrategy {
    /// Create a sleeping wait strategy with the default ~100ns sleep.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sleep_duration: Duration::from_nanos(100),
        }
    }

    /// Create a sleeping wait strategy with a custom sleep duration.
    #[must_use]
    pub fn with_sleep(sleep_duration: Duration) -> Self {
        Self { sleep_duration }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = SLEEP_SPIN_TRIES + SLEEP_YIELD_TRIES;
        loop {
            if alerted.load(Ordering::Relaxed) {
                return Err(RinglineError::Alert);
            }

            let available = available_sequence(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            if counter > SLEEP_YIELD_TRIES {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(self.sleep_duration);
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Blocking wait strategy using a condition variable.
///
/// Consumers park on a condvar and are woken by `signal_all_when_blocking`
/// from publishing producers or alerting barriers. The wait uses a short
/// internal timeout purely to bound sleep latency against missed signals;
/// it is not a user-facing deadline.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

const BLOCKING_WAIT_TIMEOUT: Duration = Duration::from_micros(50);

impl BlockingWaitStrategy {
    /// Create a new blocking wait strategy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut guard = self.mutex.lock();
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(RinglineError::Alert);
            }

            let available = available_sequence(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }

            self.condvar.wait_for(&mut guard, BLOCKING_WAIT_TIMEOUT);
        }
    }

    fn signal_all_when_blocking(&self) {
        // Lock-free notify: a signal racing a waiter between its check and
        // its wait is recovered by the wait timeout.
        self.condvar.notify_all();
    }
}
