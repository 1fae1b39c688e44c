//! Builder module for creating queues with a fluent API
//!
//! A queue needs a thread name, a capacity, a processor and a wait strategy.
//! The builder collects them and reports anything missing or invalid as a
//! configuration error from `build`.

use crate::queue::{
    Processor, QueueConfig, QueueError, Result, UnblockingQueue, WaitStrategy,
};
use std::sync::Arc;

/// Fluent builder for [`UnblockingQueue`]
///
/// # Examples
///
/// ```rust
/// use ringflush::{BlockingWaitStrategy, ClosureProcessor, QueueBuilder};
///
/// let queue = QueueBuilder::<u64>::new()
///     .thread_name("audit")
///     .capacity(1024)
///     .wait_strategy(BlockingWaitStrategy::new())
///     .processor(ClosureProcessor::new(|_event: &u64| Ok(())))
///     .build()
///     .unwrap();
/// assert_eq!(queue.capacity(), 1024);
/// ```
pub struct QueueBuilder<T> {
    config: QueueConfig,
    processor: Option<Arc<dyn Processor<T>>>,
    wait_strategy: Option<Arc<dyn WaitStrategy>>,
}

impl<T> QueueBuilder<T>
where
    T: Send + 'static,
{
    /// Start from the default configuration, with no processor and no wait
    /// strategy
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            processor: None,
            wait_strategy: None,
        }
    }

    /// Start from `config`, including the wait strategy it selects
    pub fn from_config(config: QueueConfig) -> Self {
        let wait_strategy = config.wait_strategy.build();
        Self {
            config,
            processor: None,
            wait_strategy: Some(wait_strategy),
        }
    }

    /// Set the consumer thread name
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Set the number of slots (must be a power of 2)
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Pin the consumer thread to a CPU core
    pub fn pin_at_core(mut self, core_id: usize) -> Self {
        self.config.pin_to_core = Some(core_id);
        self
    }

    /// Set the processor receiving every element
    pub fn processor<P>(mut self, processor: P) -> Self
    where
        P: Processor<T> + 'static,
    {
        self.processor = Some(Arc::new(processor));
        self
    }

    /// Set a processor that is shared with other owners
    pub fn shared_processor(mut self, processor: Arc<dyn Processor<T>>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Set the wait strategy, replacing the one selected by the configuration
    pub fn wait_strategy<W>(mut self, wait_strategy: W) -> Self
    where
        W: WaitStrategy + 'static,
    {
        self.wait_strategy = Some(Arc::new(wait_strategy));
        self
    }

    /// Assemble the queue
    ///
    /// The slots are allocated here so producers can enqueue before the
    /// consumer is started.
    ///
    /// # Errors
    /// Returns [`QueueError::InvalidCapacity`],
    /// [`QueueError::MissingProcessor`] or [`QueueError::MissingWaitStrategy`].
    pub fn build(self) -> Result<UnblockingQueue<T>> {
        self.config.validate()?;
        let processor = self.processor.ok_or(QueueError::MissingProcessor)?;
        let wait_strategy = self.wait_strategy.ok_or(QueueError::MissingWaitStrategy)?;
        UnblockingQueue::new(self.config, processor, wait_strategy)
    }
}

impl<T> Default for QueueBuilder<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ClosureProcessor, SleepingWaitStrategy, WaitStrategyConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> impl Processor<i32> + 'static {
        ClosureProcessor::new(|_value: &i32| Ok(()))
    }

    #[test]
    fn test_build_with_all_parts() {
        let queue = QueueBuilder::<i32>::new()
            .thread_name("builder-test")
            .capacity(16)
            .processor(noop())
            .wait_strategy(SleepingWaitStrategy::default())
            .build()
            .unwrap();

        assert_eq!(queue.capacity(), 16);
        assert_eq!(queue.thread_name(), "builder-test");
        assert_eq!(queue.remaining_capacity(), 16);
        assert!(!queue.is_running());
    }

    #[test]
    fn test_invalid_capacity_is_rejected() {
        let result = QueueBuilder::<i32>::new()
            .capacity(12)
            .processor(noop())
            .wait_strategy(SleepingWaitStrategy::default())
            .build();
        assert!(matches!(result, Err(QueueError::InvalidCapacity(12))));
    }

    #[test]
    fn test_missing_parts_are_rejected() {
        let result = QueueBuilder::<i32>::new()
            .wait_strategy(SleepingWaitStrategy::default())
            .build();
        assert!(matches!(result, Err(QueueError::MissingProcessor)));

        let result = QueueBuilder::<i32>::new().processor(noop()).build();
        assert!(matches!(result, Err(QueueError::MissingWaitStrategy)));
    }

    #[test]
    fn test_queues_share_one_processor() {
        let count = Arc::new(AtomicUsize::new(0));
        let processor: Arc<dyn Processor<i32>> = {
            let count = count.clone();
            Arc::new(ClosureProcessor::new(move |_value: &i32| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        };

        let first = QueueBuilder::<i32>::new()
            .capacity(4)
            .wait_strategy(SleepingWaitStrategy::default())
            .shared_processor(processor.clone())
            .build()
            .unwrap();
        let second = QueueBuilder::<i32>::new()
            .capacity(4)
            .wait_strategy(SleepingWaitStrategy::default())
            .shared_processor(processor)
            .build()
            .unwrap();

        first.put(1i32);
        second.put(2i32);
        second.put(3i32);
        first.stop().unwrap();
        second.stop().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_from_config_supplies_wait_strategy() {
        let config = QueueConfig {
            thread_name: "configured".to_string(),
            capacity: 8,
            wait_strategy: WaitStrategyConfig::Sleeping { retries: 50 },
            pin_to_core: None,
        };

        let queue = QueueBuilder::from_config(config.clone())
            .processor(noop())
            .build()
            .unwrap();
        assert_eq!(queue.config(), &config);
    }
}
