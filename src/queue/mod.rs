//! RingFlush queue implementation
//!
//! A bounded, lock-free ring buffer fed by any number of producer threads and
//! drained in reservation order by a single dedicated consumer thread.

pub mod batch;
pub mod builder;
pub mod config;
pub mod consumer;
pub mod processor;
pub mod sequence;
pub mod slots;
pub mod thread_management;
pub mod unblocking_queue;
pub mod wait_strategy;

#[cfg(test)]
mod property_tests;

pub use batch::BatchForwarder;
pub use builder::QueueBuilder;
pub use config::{QueueConfig, WaitStrategyConfig};
pub use processor::{ClosureProcessor, Processor};
pub use sequence::Sequence;
pub use unblocking_queue::UnblockingQueue;
pub use wait_strategy::{
    BlockingWaitStrategy, SleepingWaitStrategy, TimeoutWaitStrategy, WaitError, WaitStrategy,
};

/// The initial value of both the producer and the consumer sequence
pub const INITIAL_SEQUENCE_VALUE: i64 = -1;

/// Boxed error returned by processors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the queue
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Capacity must be a power of 2, got: {0}")]
    InvalidCapacity(usize),

    #[error("No processor configured")]
    MissingProcessor,

    #[error("No wait strategy configured")]
    MissingWaitStrategy,

    #[error("Queue is already running")]
    AlreadyRunning,

    #[error("Consumer thread '{0}' from a previous run has not exited yet")]
    ConsumerStillRunning(String),

    #[error("Failed to spawn consumer thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Queue is closed")]
    Closed,

    #[error("Processor failed: {0}")]
    Process(#[source] BoxError),

    #[error("Processor panicked: {0}")]
    ProcessorPanicked(String),

    #[error("Timed out stopping the queue, {abandoned} element(s) left undelivered")]
    ShutdownTimeout { abandoned: u64 },
}

impl QueueError {
    /// Whether this error was caused by an invalid queue configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            QueueError::InvalidCapacity(_)
                | QueueError::MissingProcessor
                | QueueError::MissingWaitStrategy
        )
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Utility function to check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}
