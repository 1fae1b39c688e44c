//! Batch forwarding processor
//!
//! Groups elements coming out of the queue and forwards them as one `Vec`
//! once the batch is full or has been open for longer than a given duration.
//! Combined with [`TimeoutWaitStrategy`](crate::queue::TimeoutWaitStrategy),
//! a partially filled batch is also forwarded while the queue sits idle.

use crate::queue::{BoxError, Processor, QueueError};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

struct BatchState<T> {
    events: Vec<T>,
    /// `None` when the duration is too large to ever elapse
    batch_end: Option<Instant>,
}

impl<T> BatchState<T> {
    fn expired(&self) -> bool {
        self.batch_end.is_some_and(|end| Instant::now() > end)
    }
}

/// Processor that aggregates elements into batches
///
/// # Type Parameters
/// * `T` - The element type, cloned into the pending batch
/// * `F` - The closure receiving each complete batch
pub struct BatchForwarder<T, F>
where
    F: Fn(Vec<T>) -> Result<(), BoxError> + Send + Sync,
{
    batch_size: usize,
    duration: Duration,
    forward_fn: F,
    state: Mutex<BatchState<T>>,
}

impl<T, F> BatchForwarder<T, F>
where
    F: Fn(Vec<T>) -> Result<(), BoxError> + Send + Sync,
{
    /// Create a new batch forwarder
    ///
    /// # Arguments
    /// * `batch_size` - Number of elements that triggers a forward
    /// * `duration` - Maximum time a batch stays open
    /// * `forward_fn` - Receives every batch
    pub fn new(batch_size: usize, duration: Duration, forward_fn: F) -> Self {
        Self {
            batch_size: batch_size.max(1),
            duration,
            forward_fn,
            state: Mutex::new(BatchState {
                events: Vec::with_capacity(batch_size),
                batch_end: Instant::now().checked_add(duration),
            }),
        }
    }

    /// Number of elements waiting in the current batch
    pub fn pending(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Forward the current batch now, even if it is not full
    pub fn flush(&self) {
        let events = {
            let mut state = self.state.lock();
            if state.events.is_empty() {
                return;
            }
            self.take_batch(&mut state)
        };
        self.forward(events);
    }

    fn should_forward(&self, state: &BatchState<T>) -> bool {
        state.events.len() >= self.batch_size || state.expired()
    }

    /// Swap out the pending batch and open a new one
    fn take_batch(&self, state: &mut BatchState<T>) -> Vec<T> {
        state.batch_end = Instant::now().checked_add(self.duration);
        std::mem::replace(&mut state.events, Vec::with_capacity(self.batch_size))
    }

    /// Hand a batch to the callback; the state lock must not be held
    fn forward(&self, events: Vec<T>) {
        let size = events.len();
        if let Err(error) = (self.forward_fn)(events) {
            tracing::error!(size, error = %error, "failed to forward batch");
        }
    }
}

impl<T, F> Processor<T> for BatchForwarder<T, F>
where
    T: Clone + Send,
    F: Fn(Vec<T>) -> Result<(), BoxError> + Send + Sync,
{
    fn process(&self, value: &T) -> Result<(), BoxError> {
        let ready = {
            let mut state = self.state.lock();
            state.events.push(value.clone());
            self.should_forward(&state).then(|| self.take_batch(&mut state))
        };
        if let Some(events) = ready {
            self.forward(events);
        }
        Ok(())
    }

    fn on_timeout(&self, _last_sequence: i64) {
        let ready = {
            let mut state = self.state.lock();
            (!state.events.is_empty() && state.expired()).then(|| self.take_batch(&mut state))
        };
        if let Some(events) = ready {
            self.forward(events);
        }
    }

    fn on_error(&self, _value: &T, error: QueueError) {
        tracing::error!(error = %error, "element was not added to a batch");
    }
}
