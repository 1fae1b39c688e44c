//! Consumer loop
//!
//! The consumer runs on its own thread: it waits for the producer sequence to
//! move past the next expected sequence, hands every newly available element
//! to the processor in order, and then publishes its progress through the
//! consumer sequence so producers can reuse the freed slots.

use crate::queue::processor::process_element;
use crate::queue::thread_management::{ManagedThread, ThreadBuilder};
use crate::queue::unblocking_queue::QueueCore;
use crate::queue::wait_strategy::WaitError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Handle to a running consumer thread
#[derive(Debug)]
pub struct Consumer {
    thread: ManagedThread,
    interrupted: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when the consumer thread exits, even by unwinding
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Consumer {
    /// Spawn the consumer loop over `core` on a thread built by `builder`
    pub(crate) fn spawn<T>(core: Arc<QueueCore<T>>, builder: ThreadBuilder) -> std::io::Result<Self>
    where
        T: Send + 'static,
    {
        let interrupted = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let interrupted_clone = interrupted.clone();
        let running_guard = RunningGuard(running.clone());

        let thread = builder.spawn(move || {
            let _running = running_guard;
            consumer_loop(&core, &interrupted_clone);
        });

        match thread {
            Ok(thread) => Ok(Self {
                thread,
                interrupted,
                running,
            }),
            Err(e) => {
                running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Name of the consumer thread
    pub fn thread_name(&self) -> &str {
        self.thread.thread_name()
    }

    /// Whether the consumer loop is still executing
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the consumer loop to exit and wake it if it is parked
    ///
    /// The loop finishes the batch it is processing, publishes its progress
    /// and exits at the next top-of-loop check.
    pub(crate) fn halt<T>(&self, core: &QueueCore<T>) {
        self.interrupted.store(true, Ordering::SeqCst);
        core.wait_strategy.signal_all();
    }

    /// Wait for the consumer thread to exit
    ///
    /// Returns the handle back as `Err` if the thread is still alive when
    /// `deadline` passes. Without a deadline the wait is unbounded.
    pub(crate) fn join(self, deadline: Option<Instant>) -> Result<(), Consumer> {
        let Consumer {
            thread,
            interrupted,
            running,
        } = self;

        let joined = match deadline {
            None => thread.join(),
            Some(deadline) => match thread.join_until(deadline) {
                Ok(joined) => joined,
                Err(thread) => {
                    return Err(Consumer {
                        thread,
                        interrupted,
                        running,
                    })
                }
            },
        };

        if joined.is_err() {
            tracing::error!("consumer thread panicked");
        }
        Ok(())
    }
}

/// Body of the consumer thread
fn consumer_loop<T>(core: &QueueCore<T>, interrupted: &AtomicBool) {
    let processor = core.processor.as_ref();
    let mut next = core.consumer.get() + 1;
    tracing::debug!(next, "consumer loop started");

    loop {
        if interrupted.load(Ordering::Acquire) {
            break;
        }

        match core
            .wait_strategy
            .wait_for(next, &core.producer, interrupted)
        {
            Ok(available) => {
                while next <= available {
                    // SAFETY: this thread is the only consumer while the loop
                    // runs, and `next` was reserved since it is <= available.
                    let value = unsafe { core.slots.take(next) };
                    process_element(processor, &value);
                    next += 1;
                }
                core.consumer.set(available);
            }
            Err(WaitError::Timeout) => processor.on_timeout(next - 1),
            Err(WaitError::Interrupted) => {}
        }
    }

    tracing::debug!(last_processed = next - 1, "consumer loop stopped");
}
