//! `RingFlush` - Bounded Multi-Producer Event Queue
//!
//! A fixed-capacity ring buffer that any number of producer threads write into
//! without locks, drained in reservation order by one dedicated consumer
//! thread. Producers that find the buffer full back off and retry (`put`) or
//! give up immediately (`try_put`); they never take a lock.
//!
//! ## Features
//!
//! - **Lock-free producers**: a single CAS reserves a slot
//! - **Ordered delivery**: elements reach the processor in reservation order
//! - **Pluggable waiting**: blocking, timeout or spin/yield/sleep consumer
//! - **Drain on stop**: everything accepted before `stop` is processed
//! - **Bounded shutdown**: `stop_timeout` trades delivery for latency
//!
//! ## Quick Start
//!
//! ```rust
//! use ringflush::{ClosureProcessor, QueueBuilder, TimeoutWaitStrategy};
//! use std::time::Duration;
//!
//! let queue = QueueBuilder::<String>::new()
//!     .thread_name("access-log")
//!     .capacity(1024)
//!     .wait_strategy(TimeoutWaitStrategy::new(Duration::from_millis(100)))
//!     .processor(ClosureProcessor::new(|line: &String| {
//!         println!("{line}");
//!         Ok(())
//!     }))
//!     .build()
//!     .unwrap();
//!
//! // Elements put before `start` are kept and processed first
//! queue.put("booting".to_string());
//! queue.start().unwrap();
//!
//! queue.put("ready".to_string());
//! if !queue.try_put("maybe".to_string()) {
//!     // buffer full
//! }
//!
//! queue.stop().unwrap();
//! ```
//!
//! ## Architecture
//!
//! - **`Sequence`**: padded atomic counters for the producer and consumer side
//! - **`UnblockingQueue`**: slot array, reservation protocol and lifecycle
//! - **`Processor`**: receives elements, wait timeouts and failures
//! - **`WaitStrategy`**: how the consumer idles while the buffer is empty
//! - **`QueueBuilder`** / **`QueueConfig`**: assembly and serializable settings
//! - **`BatchForwarder`**: groups elements by count or age before forwarding

pub mod queue;

// Re-export the main types for convenience
pub use queue::{
    // Utility functions
    is_power_of_two,
    // Processors
    BatchForwarder,
    // Wait strategies
    BlockingWaitStrategy,
    // Error types
    BoxError,
    ClosureProcessor,
    Processor,
    // Construction
    QueueBuilder,
    QueueConfig,
    QueueError,
    Result,
    Sequence,
    SleepingWaitStrategy,
    TimeoutWaitStrategy,
    // Core types
    UnblockingQueue,
    WaitError,
    WaitStrategy,
    WaitStrategyConfig,
    // Constants
    INITIAL_SEQUENCE_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `RingFlush` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
