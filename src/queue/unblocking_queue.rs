//! Unblocking queue facade
//!
//! Producers reserve a sequence by CAS on the producer sequence, bounded by
//! the consumer sequence so that `producer - consumer <= capacity` always
//! holds, then write their element into the matching slot and signal the wait
//! strategy. A single consumer thread drains the slots in sequence order.
//!
//! Shutdown closes the producer sequence, halts the consumer thread and then
//! drains whatever is left on the calling thread, so no element that was
//! accepted by `put` is dropped silently.

use crate::queue::config::QueueConfig;
use crate::queue::consumer::Consumer;
use crate::queue::processor::{process_element, Processor};
use crate::queue::sequence::{Sequence, CLOSED_SEQUENCE};
use crate::queue::slots::SlotArray;
use crate::queue::thread_management::ThreadBuilder;
use crate::queue::{QueueError, Result, WaitStrategy, INITIAL_SEQUENCE_VALUE};
use crossbeam_utils::Backoff;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How long a producer parks once spinning and yielding did not free a slot
const PRODUCER_PARK: Duration = Duration::from_nanos(1);

/// State shared between producers, the consumer thread and the facade
pub(crate) struct QueueCore<T> {
    /// Highest sequence reserved by a producer
    pub(crate) producer: Sequence,
    /// Highest sequence fully processed
    pub(crate) consumer: Sequence,
    pub(crate) slots: SlotArray<T>,
    pub(crate) capacity: i64,
    pub(crate) processor: Arc<dyn Processor<T>>,
    pub(crate) wait_strategy: Arc<dyn WaitStrategy>,
}

impl<T> QueueCore<T> {
    /// Write a reserved element and wake the consumer
    #[inline]
    fn publish(&self, sequence: i64, value: T) {
        // SAFETY: the caller won the CAS that reserved `sequence`, and the
        // capacity check guarantees the consumer already vacated its slot.
        unsafe { self.slots.publish(sequence, value) };
        self.wait_strategy.signal();
    }

    /// Take and drop the elements of `from..=to` without processing them
    fn discard(&self, from: i64, to: i64) -> u64 {
        let mut discarded = 0;
        for sequence in from..=to {
            // SAFETY: no consumer thread is running and every sequence up to
            // `to` was reserved before the queue closed.
            drop(unsafe { self.slots.take(sequence) });
            discarded += 1;
        }
        discarded
    }
}

/// Lifecycle of the consumer thread
#[derive(Debug)]
enum Lifecycle {
    /// Never started; producers may already fill the slots
    Idle,
    Running(Consumer),
    /// Stopped and drained; the queue is closed until the next `start`
    Stopped,
    /// A timed stop gave up while the consumer thread was still alive
    Abandoned {
        consumer: Consumer,
        last_reserved: i64,
    },
}

/// Bounded multi-producer queue with a dedicated consumer thread
///
/// # Examples
/// ```
/// use ringflush::{ClosureProcessor, QueueBuilder, SleepingWaitStrategy};
///
/// let queue = QueueBuilder::<String>::new()
///     .thread_name("example")
///     .capacity(64)
///     .wait_strategy(SleepingWaitStrategy::default())
///     .processor(ClosureProcessor::new(|line: &String| {
///         println!("{line}");
///         Ok(())
///     }))
///     .build()
///     .unwrap();
///
/// queue.start().unwrap();
/// queue.put("hello".to_string());
/// queue.stop().unwrap();
/// ```
pub struct UnblockingQueue<T> {
    core: Arc<QueueCore<T>>,
    config: QueueConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl<T> UnblockingQueue<T>
where
    T: Send + 'static,
{
    pub(crate) fn new(
        config: QueueConfig,
        processor: Arc<dyn Processor<T>>,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self> {
        config.validate()?;

        let core = QueueCore {
            producer: Sequence::new(INITIAL_SEQUENCE_VALUE),
            consumer: Sequence::new(INITIAL_SEQUENCE_VALUE),
            slots: SlotArray::new(config.capacity),
            capacity: config.capacity as i64,
            processor,
            wait_strategy,
        };

        Ok(Self {
            core: Arc::new(core),
            config,
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Launch the consumer thread
    ///
    /// Reopens a stopped queue. Elements enqueued before the first `start`
    /// are processed first, in order.
    ///
    /// # Errors
    /// Returns a configuration error if the capacity is invalid,
    /// [`QueueError::AlreadyRunning`] if the consumer is running,
    /// [`QueueError::ConsumerStillRunning`] if a consumer abandoned by a timed
    /// out stop has not exited yet, and [`QueueError::Spawn`] if the thread
    /// could not be created.
    pub fn start(&self) -> Result<()> {
        self.config.validate()?;

        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle => *lifecycle = Lifecycle::Idle,
            Lifecycle::Stopped => {}
            Lifecycle::Running(consumer) => {
                *lifecycle = Lifecycle::Running(consumer);
                return Err(QueueError::AlreadyRunning);
            }
            Lifecycle::Abandoned {
                consumer,
                last_reserved,
            } => {
                if consumer.is_running() {
                    let name = consumer.thread_name().to_string();
                    *lifecycle = Lifecycle::Abandoned {
                        consumer,
                        last_reserved,
                    };
                    return Err(QueueError::ConsumerStillRunning(name));
                }
                let _ = consumer.join(None);

                let core = &*self.core;
                let discarded = core.discard(core.consumer.get() + 1, last_reserved);
                if discarded > 0 {
                    tracing::warn!(
                        queue = %self.config.thread_name,
                        discarded,
                        "dropped elements left behind by a timed out stop"
                    );
                }
                core.consumer.set(INITIAL_SEQUENCE_VALUE);
            }
        }

        let mut builder = ThreadBuilder::new().thread_name(self.config.thread_name.clone());
        if let Some(core_id) = self.config.pin_to_core {
            builder = builder.pin_at_core(core_id);
        }

        let consumer = Consumer::spawn(self.core.clone(), builder).map_err(|source| {
            QueueError::Spawn {
                name: self.config.thread_name.clone(),
                source,
            }
        })?;

        if self.core.producer.is_closed() {
            self.core.producer.set(INITIAL_SEQUENCE_VALUE);
        }
        *lifecycle = Lifecycle::Running(consumer);

        tracing::info!(
            queue = %self.config.thread_name,
            capacity = self.config.capacity,
            "queue started"
        );
        Ok(())
    }
}

impl<T> UnblockingQueue<T> {
    /// Enqueue `value`, waiting for a free slot if the queue is full
    ///
    /// Passing `None` is a no-op. If the queue has been stopped, `value` is
    /// handed to the processor's `on_error` with [`QueueError::Closed`].
    pub fn put<V>(&self, value: V)
    where
        V: Into<Option<T>>,
    {
        let Some(value) = value.into() else {
            return;
        };

        let core = &*self.core;
        let backoff = Backoff::new();
        loop {
            let current = core.producer.get();
            if current == CLOSED_SEQUENCE {
                core.processor.on_error(&value, QueueError::Closed);
                return;
            }

            let next = current + 1;
            if next - core.capacity > core.consumer.get() {
                if backoff.is_completed() {
                    thread::park_timeout(PRODUCER_PARK);
                } else {
                    backoff.snooze();
                }
                continue;
            }

            if core.producer.compare_and_set(current, next) {
                core.publish(next, value);
                return;
            }
        }
    }

    /// Enqueue `value` only if a slot is free right now
    ///
    /// Returns `false` without blocking if the queue is full or closed; the
    /// value is dropped in that case. Passing `None` is a no-op that returns
    /// `true`.
    pub fn try_put<V>(&self, value: V) -> bool
    where
        V: Into<Option<T>>,
    {
        let Some(value) = value.into() else {
            return true;
        };

        let core = &*self.core;
        loop {
            let current = core.producer.get();
            if current == CLOSED_SEQUENCE {
                return false;
            }

            let next = current + 1;
            if next - core.capacity > core.consumer.get() {
                return false;
            }

            if core.producer.compare_and_set(current, next) {
                core.publish(next, value);
                return true;
            }
        }
    }

    /// Stop the consumer and drain every pending element
    ///
    /// Waits without bound for the consumer thread to exit, then processes
    /// all remaining elements on the calling thread.
    ///
    /// # Errors
    /// Never times out; kept fallible to share the shutdown path with
    /// [`UnblockingQueue::stop_timeout`].
    pub fn stop(&self) -> Result<()> {
        self.shutdown(None)
    }

    /// Stop the consumer and drain pending elements within `timeout`
    ///
    /// The deadline covers both waiting for the consumer thread and the
    /// drain. Elements still pending when it passes are dropped without being
    /// processed. A timeout too large to represent as an instant behaves like
    /// [`UnblockingQueue::stop`].
    ///
    /// # Errors
    /// Returns [`QueueError::ShutdownTimeout`] with the number of undelivered
    /// elements if the deadline passed.
    pub fn stop_timeout(&self, timeout: Duration) -> Result<()> {
        self.shutdown(Instant::now().checked_add(timeout))
    }

    fn shutdown(&self, deadline: Option<Instant>) -> Result<()> {
        let core = &*self.core;
        let mut lifecycle = self.lifecycle.lock();

        let (consumer, last_reserved) = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        {
            Lifecycle::Stopped => return Ok(()),
            Lifecycle::Idle => (None, self.close()),
            Lifecycle::Running(consumer) => {
                let last_reserved = self.close();
                consumer.halt(core);
                (Some(consumer), last_reserved)
            }
            Lifecycle::Abandoned {
                consumer,
                last_reserved,
            } => (Some(consumer), last_reserved),
        };

        if let Some(consumer) = consumer {
            if let Err(consumer) = consumer.join(deadline) {
                let abandoned = (last_reserved - core.consumer.get()).max(0) as u64;
                tracing::warn!(
                    queue = %self.config.thread_name,
                    abandoned,
                    "consumer thread did not exit before the stop deadline"
                );
                *lifecycle = Lifecycle::Abandoned {
                    consumer,
                    last_reserved,
                };
                return Err(QueueError::ShutdownTimeout { abandoned });
            }
        }

        let result = self.drain(last_reserved, deadline);
        core.consumer.set(INITIAL_SEQUENCE_VALUE);
        tracing::info!(queue = %self.config.thread_name, "queue stopped");
        result
    }

    /// Close the producer sequence and return the last reserved sequence
    fn close(&self) -> i64 {
        self.core
            .producer
            .close()
            .unwrap_or_else(|| self.core.consumer.get())
    }

    /// Process every element after the consumer sequence up to `last_reserved`
    fn drain(&self, last_reserved: i64, deadline: Option<Instant>) -> Result<()> {
        let core = &*self.core;
        let first = core.consumer.get() + 1;
        let mut drained = 0u64;

        for sequence in first..=last_reserved {
            if deadline.is_some_and(|deadline| Instant::now() > deadline) {
                let abandoned = core.discard(sequence, last_reserved);
                tracing::warn!(
                    queue = %self.config.thread_name,
                    drained,
                    abandoned,
                    "stop deadline passed while draining"
                );
                return Err(QueueError::ShutdownTimeout { abandoned });
            }

            // SAFETY: the consumer thread has exited, so this thread is the
            // only consumer, and `sequence` was reserved before closing.
            let value = unsafe { core.slots.take(sequence) };
            process_element(core.processor.as_ref(), &value);
            drained += 1;
        }

        if drained > 0 {
            tracing::debug!(queue = %self.config.thread_name, drained, "drained pending elements");
        }
        Ok(())
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Name of the consumer thread
    pub fn thread_name(&self) -> &str {
        &self.config.thread_name
    }

    /// Configuration the queue was built with
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Number of slots that can be reserved right now
    pub fn remaining_capacity(&self) -> i64 {
        let producer = self.core.producer.get();
        if producer == CLOSED_SEQUENCE {
            return 0;
        }
        self.core.capacity - (producer - self.core.consumer.get())
    }

    /// Whether the consumer thread is running
    pub fn is_running(&self) -> bool {
        matches!(&*self.lifecycle.lock(), Lifecycle::Running(consumer) if consumer.is_running())
    }

    /// Whether producers are currently turned away
    pub fn is_closed(&self) -> bool {
        self.core.producer.is_closed()
    }

    /// Current producer sequence
    pub fn producer_sequence(&self) -> i64 {
        self.core.producer.get()
    }

    /// Current consumer sequence
    pub fn consumer_sequence(&self) -> i64 {
        self.core.consumer.get()
    }
}

impl<T> Drop for UnblockingQueue<T> {
    fn drop(&mut self) {
        // Dropping without `stop` still delivers everything accepted so far
        if let Err(error) = self.shutdown(None) {
            tracing::warn!(queue = %self.config.thread_name, error = %error, "stop on drop failed");
        }
    }
}

impl<T> std::fmt::Debug for UnblockingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnblockingQueue")
            .field("thread_name", &self.config.thread_name)
            .field("capacity", &self.config.capacity)
            .field("producer", &self.core.producer)
            .field("consumer", &self.core.consumer)
            .finish()
    }
}
