//! Processor Implementation
//!
//! A processor is the consuming end of the queue: it receives every element
//! in reservation order, is told when a bounded wait elapsed without data,
//! and is handed every failure together with the element that caused it.

use crate::queue::{BoxError, QueueError};
use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Consumer of queue elements
///
/// `process` runs on the consumer thread, or on the thread calling `stop`
/// while the queue drains. `on_error` may additionally run on producer
/// threads, which report elements they could not enqueue because the queue
/// was closed.
///
/// # Type Parameters
/// * `T` - The element type carried by the queue
pub trait Processor<T>: Send + Sync {
    /// Process one element
    ///
    /// # Errors
    /// Any error is reported back through [`Processor::on_error`] with the
    /// same element; processing continues with the next element.
    fn process(&self, value: &T) -> Result<(), BoxError>;

    /// Called when a bounded wait elapsed without new data
    ///
    /// # Arguments
    /// * `last_sequence` - The last sequence handed to `process`
    fn on_timeout(&self, last_sequence: i64) {
        tracing::trace!(last_sequence, "wait timed out without new elements");
    }

    /// Called for any failure related to `value`
    ///
    /// Receives [`QueueError::Process`] or [`QueueError::ProcessorPanicked`]
    /// for failed calls to `process`, and [`QueueError::Closed`] when a
    /// producer tried to enqueue `value` after the queue was stopped.
    fn on_error(&self, _value: &T, error: QueueError) {
        tracing::error!(error = %error, "failed to process queue element");
    }
}

impl<T, P> Processor<T> for Arc<P>
where
    P: Processor<T> + ?Sized,
{
    fn process(&self, value: &T) -> Result<(), BoxError> {
        (**self).process(value)
    }

    fn on_timeout(&self, last_sequence: i64) {
        (**self).on_timeout(last_sequence);
    }

    fn on_error(&self, value: &T, error: QueueError) {
        (**self).on_error(value, error);
    }
}

/// Closure-based processor
///
/// Failures are logged through the default `on_error`.
///
/// # Type Parameters
/// * `T` - The element type
/// * `F` - The closure processing each element
pub struct ClosureProcessor<T, F>
where
    F: Fn(&T) -> Result<(), BoxError> + Send + Sync,
{
    process_fn: F,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, F> ClosureProcessor<T, F>
where
    F: Fn(&T) -> Result<(), BoxError> + Send + Sync,
{
    /// Create a new closure-based processor
    pub fn new(process_fn: F) -> Self {
        Self {
            process_fn,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> Processor<T> for ClosureProcessor<T, F>
where
    F: Fn(&T) -> Result<(), BoxError> + Send + Sync,
{
    fn process(&self, value: &T) -> Result<(), BoxError> {
        (self.process_fn)(value)
    }
}

/// Run `process` for one element and route any failure to `on_error`
///
/// Panics raised by the processor are caught and reported as
/// [`QueueError::ProcessorPanicked`] so a single bad element cannot take the
/// consumer thread down.
pub(crate) fn process_element<T>(processor: &dyn Processor<T>, value: &T) {
    match panic::catch_unwind(AssertUnwindSafe(|| processor.process(value))) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => processor.on_error(value, QueueError::Process(error)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            processor.on_error(value, QueueError::ProcessorPanicked(message));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
