//! Pipeline Configuration

use crate::PipelineError;
use ring_buffer::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the ingest pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hand-off queue capacity in snapshots (default: 1000)
    pub queue_capacity: usize,
    /// Records per store commit (default: 100)
    pub batch_size: usize,
    /// Delay between successful feed polls in milliseconds
    pub poll_interval_ms: u64,
    /// Delay after a failed fetch or decode in milliseconds
    pub retry_backoff_ms: u64,
    /// Granularity of shutdown checks while the producer sleeps
    pub shutdown_check_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            batch_size: 100,
            poll_interval_ms: 30_000,
            retry_backoff_ms: 5_000,
            shutdown_check_ms: 100,
        }
    }
}

impl PipelineConfig {
    /// Reject settings the workers cannot run with
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.retry_backoff_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "retry_backoff_ms must be non-zero".to_string(),
            ));
        }
        if self.shutdown_check_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "shutdown_check_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn shutdown_check(&self) -> Duration {
        Duration::from_millis(self.shutdown_check_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, DEFAULT_CAPACITY);
        assert_eq!(DEFAULT_CAPACITY, 1000);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.shutdown_check(), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_values_rejected() {
        for config in [
            PipelineConfig {
                queue_capacity: 0,
                ..Default::default()
            },
            PipelineConfig {
                batch_size: 0,
                ..Default::default()
            },
            PipelineConfig {
                poll_interval_ms: 0,
                ..Default::default()
            },
            PipelineConfig {
                retry_backoff_ms: 0,
                ..Default::default()
            },
            PipelineConfig {
                shutdown_check_ms: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(PipelineError::InvalidConfig(_))
            ));
        }
    }
}
