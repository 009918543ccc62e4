//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync drains.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum delivery attempts per operation before it is left failed.
    pub max_retries: u32,
    /// Fixed delay before a failed operation becomes pending again.
    pub retry_delay: Duration,
    /// Queue length at which a drain switches to the batch path.
    pub batch_threshold: usize,
    /// Maximum operations per batched remote call.
    pub batch_size: usize,
    /// Per-request timeout, independent of cancellation.
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            batch_threshold: 10,
            batch_size: 20,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the maximum retry attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the fixed retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the batch-path threshold.
    pub fn with_batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    /// Sets the batch chunk size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = SyncConfig::new()
            .with_max_retries(5)
            .with_retry_delay(Duration::from_millis(100))
            .with_batch_threshold(4)
            .with_batch_size(8)
            .with_request_timeout(Duration::from_secs(10));

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(100));
        assert_eq!(config.batch_threshold, 4);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn batch_size_is_never_zero() {
        let config = SyncConfig::new().with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }
}
