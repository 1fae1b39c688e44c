//! Configuration Management
//!
//! Serializable queue settings. Every field has a default so a partial
//! document (or `QueueConfig::default()`) is enough to build a queue.

use crate::queue::{
    is_power_of_two, BlockingWaitStrategy, QueueError, Result, SleepingWaitStrategy,
    TimeoutWaitStrategy, WaitStrategy,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default consumer thread name
pub const DEFAULT_THREAD_NAME: &str = "ringflush-consumer";

/// Default number of slots
pub const DEFAULT_CAPACITY: usize = 1024;

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Name of the consumer thread
    pub thread_name: String,
    /// Number of slots (must be a power of 2)
    pub capacity: usize,
    /// How the consumer waits for new elements
    pub wait_strategy: WaitStrategyConfig,
    /// CPU core to pin the consumer thread to
    pub pin_to_core: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            capacity: DEFAULT_CAPACITY,
            wait_strategy: WaitStrategyConfig::default(),
            pin_to_core: None,
        }
    }
}

impl QueueConfig {
    /// Check the settings that can be checked without a processor
    ///
    /// # Errors
    /// Returns [`QueueError::InvalidCapacity`] if the capacity is not a power
    /// of two.
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.capacity) {
            return Err(QueueError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }
}

/// Wait strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitStrategyConfig {
    /// Lock and condition variable, unbounded wait
    #[default]
    Blocking,
    /// Lock and condition variable, each wait bounded by `timeout_ms`
    Timeout { timeout_ms: u64 },
    /// Spin, then yield, then sleep; `retries` polls before sleeping
    Sleeping { retries: u32 },
}

impl WaitStrategyConfig {
    /// Build the configured wait strategy
    pub fn build(&self) -> Arc<dyn WaitStrategy> {
        match *self {
            WaitStrategyConfig::Blocking => Arc::new(BlockingWaitStrategy::new()),
            WaitStrategyConfig::Timeout { timeout_ms } => {
                Arc::new(TimeoutWaitStrategy::new(Duration::from_millis(timeout_ms)))
            }
            WaitStrategyConfig::Sleeping { retries } => {
                Arc::new(SleepingWaitStrategy::new(retries))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = QueueConfig::default();
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.wait_strategy, WaitStrategyConfig::Blocking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_capacity() {
        let config = QueueConfig {
            capacity: 1000,
            ..QueueConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(QueueError::InvalidCapacity(1000))
        ));

        let config = QueueConfig {
            capacity: 0,
            ..QueueConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: QueueConfig = serde_json::from_str(
            r#"{
                "thread_name": "audit-log",
                "wait_strategy": { "type": "sleeping", "retries": 300 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.thread_name, "audit-log");
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(
            config.wait_strategy,
            WaitStrategyConfig::Sleeping { retries: 300 }
        );
        assert_eq!(config.pin_to_core, None);
    }

    #[test]
    fn test_config_round_trip() {
        let config = QueueConfig {
            thread_name: "metrics".to_string(),
            capacity: 64,
            wait_strategy: WaitStrategyConfig::Timeout { timeout_ms: 250 },
            pin_to_core: Some(1),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""type":"timeout""#));
        let back: QueueConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_build_wait_strategies() {
        let blocking = WaitStrategyConfig::Blocking.build();
        assert!(format!("{blocking:?}").contains("BlockingWaitStrategy"));

        let timeout = WaitStrategyConfig::Timeout { timeout_ms: 5 }.build();
        assert!(format!("{timeout:?}").contains("5ms"));

        let sleeping = WaitStrategyConfig::Sleeping { retries: 10 }.build();
        assert!(format!("{sleeping:?}").contains("retries: 10"));
    }
}
