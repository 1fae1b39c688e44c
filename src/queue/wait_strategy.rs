//! Wait Strategy Implementation
//!
//! Wait strategies decide how the consumer thread idles while the producer
//! sequence has not yet reached the next sequence it wants to process. The
//! set is closed: a lock-based blocking strategy, the same with a bounded
//! wait, and a lock-free spin/yield/sleep strategy.

use crate::queue::Sequence;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Reasons a wait ended without the requested sequence becoming available
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("Timeout waiting for sequence")]
    Timeout,

    #[error("Wait interrupted")]
    Interrupted,
}

/// Strategy for waiting for the producer sequence to advance
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Wait until `producer` reaches `sequence`
    ///
    /// # Arguments
    /// * `sequence` - The next sequence the consumer wants to process
    /// * `producer` - The producer sequence
    /// * `interrupted` - Raised when the consumer has been asked to stop
    ///
    /// # Returns
    /// The highest available sequence, which may be greater than `sequence`
    ///
    /// # Errors
    /// [`WaitError::Interrupted`] if `interrupted` was raised before the
    /// sequence became available, [`WaitError::Timeout`] if a bounded wait
    /// elapsed.
    fn wait_for(
        &self,
        sequence: i64,
        producer: &Sequence,
        interrupted: &AtomicBool,
    ) -> Result<i64, WaitError>;

    /// Wake the consumer if it is parked waiting for data
    ///
    /// Called by producers after every publication.
    fn signal(&self);

    /// Wake the consumer unconditionally
    ///
    /// Used when halting the consumer thread.
    fn signal_all(&self) {
        self.signal();
    }
}

/// Mutex and condition variable shared by the lock-based strategies
///
/// The consumer raises `needs_wake` before re-checking the producer sequence
/// under the lock, so a producer that publishes between the first check and
/// the wait always sees the flag and notifies.
#[derive(Debug, Default)]
struct Notifier {
    mutex: Mutex<()>,
    condvar: Condvar,
    needs_wake: AtomicBool,
}

impl Notifier {
    fn signal(&self) {
        if self.needs_wake.swap(false, Ordering::SeqCst) {
            let _guard = self.mutex.lock();
            self.condvar.notify_all();
        }
    }

    fn signal_all(&self) {
        self.needs_wake.store(false, Ordering::SeqCst);
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    /// Block until `producer` reaches `sequence`, optionally until `deadline`
    fn wait(
        &self,
        sequence: i64,
        producer: &Sequence,
        interrupted: &AtomicBool,
        deadline: Option<Instant>,
    ) -> Result<i64, WaitError> {
        let mut available = producer.get();
        if available >= sequence {
            return Ok(available);
        }

        let mut guard = self.mutex.lock();
        loop {
            self.needs_wake.store(true, Ordering::SeqCst);
            available = producer.get_volatile();
            if available >= sequence {
                return Ok(available);
            }
            if interrupted.load(Ordering::Acquire) {
                return Err(WaitError::Interrupted);
            }

            match deadline {
                None => self.condvar.wait(&mut guard),
                Some(deadline) => {
                    if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                        available = producer.get_volatile();
                        if available >= sequence {
                            return Ok(available);
                        }
                        return Err(WaitError::Timeout);
                    }
                }
            }
        }
    }
}

/// Blocking wait strategy using a lock and a condition variable
///
/// Lowest CPU usage, highest wake-up latency.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    notifier: Notifier,
}

impl BlockingWaitStrategy {
    /// Create a new blocking wait strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        producer: &Sequence,
        interrupted: &AtomicBool,
    ) -> Result<i64, WaitError> {
        self.notifier.wait(sequence, producer, interrupted, None)
    }

    fn signal(&self) {
        self.notifier.signal();
    }

    fn signal_all(&self) {
        self.notifier.signal_all();
    }
}

/// Blocking wait strategy with a bounded wait
///
/// Each call to `wait_for` waits at most `timeout`; when it elapses with no
/// new data the consumer gets a chance to run its timeout callback (for
/// example to flush a partially filled batch).
#[derive(Debug)]
pub struct TimeoutWaitStrategy {
    timeout: Duration,
    notifier: Notifier,
}

impl TimeoutWaitStrategy {
    /// Create a new timeout wait strategy
    ///
    /// # Arguments
    /// * `timeout` - Budget for a single wait
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            notifier: Notifier::default(),
        }
    }
}

impl WaitStrategy for TimeoutWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        producer: &Sequence,
        interrupted: &AtomicBool,
    ) -> Result<i64, WaitError> {
        // A budget too large to represent as an instant never elapses
        let deadline = Instant::now().checked_add(self.timeout);
        self.notifier.wait(sequence, producer, interrupted, deadline)
    }

    fn signal(&self) {
        self.notifier.signal();
    }

    fn signal_all(&self) {
        self.notifier.signal_all();
    }
}

/// Spin iterations performed before the strategy starts yielding
const SPIN_THRESHOLD: u32 = 100;

/// Sleeping wait strategy
///
/// Polls the producer sequence without locking. The first
/// `retries - 100` polls spin, the next 100 yield the thread, and every poll
/// after that sleeps for `park_duration`.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    park_duration: Duration,
}

impl SleepingWaitStrategy {
    /// Create a new sleeping wait strategy
    ///
    /// # Arguments
    /// * `retries` - Polls performed before the strategy starts sleeping
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            park_duration: Duration::from_nanos(1),
        }
    }

    /// Override how long each poll sleeps once retries are exhausted
    pub fn with_park_duration(mut self, park_duration: Duration) -> Self {
        self.park_duration = park_duration;
        self
    }

    fn apply_wait_method(&self, counter: u32) -> u32 {
        if counter > SPIN_THRESHOLD {
            std::hint::spin_loop();
            counter - 1
        } else if counter > 0 {
            thread::yield_now();
            counter - 1
        } else {
            thread::sleep(self.park_duration);
            counter
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new(200)
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        producer: &Sequence,
        interrupted: &AtomicBool,
    ) -> Result<i64, WaitError> {
        let mut counter = self.retries;
        loop {
            let available = producer.get();
            if available >= sequence {
                return Ok(available);
            }
            if interrupted.load(Ordering::Acquire) {
                return Err(WaitError::Interrupted);
            }
            counter = self.apply_wait_method(counter);
        }
    }

    fn signal(&self) {
        // Nothing ever parks on a lock
    }
}
