//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// Configuration for chunk dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Chunks in flight at once. Further chunks queue for a free slot.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Retries per chunk for non-flaky failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Deadline for a single worker invocation (milliseconds).
    /// An expired deadline counts as a flaky failure.
    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout_ms: u64,

    /// Pause before re-invoking a failed chunk (milliseconds).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Platform ceiling on concurrent invocations.
    /// The planner never produces more chunks than this.
    #[serde(default = "default_max_concurrent_invocations")]
    pub max_concurrent_invocations: usize,

    /// Persist an error report object for every failed attempt.
    #[serde(default = "default_true")]
    pub write_error_reports: bool,
}

fn default_concurrency_limit() -> usize {
    16
}

fn default_max_retries() -> u32 {
    1
}

fn default_invocation_timeout() -> u64 {
    900_000 // 15 minutes
}

fn default_retry_delay() -> u64 {
    500
}

fn default_max_concurrent_invocations() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            max_retries: default_max_retries(),
            invocation_timeout_ms: default_invocation_timeout(),
            retry_delay_ms: default_retry_delay(),
            max_concurrent_invocations: default_max_concurrent_invocations(),
            write_error_reports: true,
        }
    }
}

impl DispatcherConfig {
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_invocation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.invocation_timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Slots actually used: the configured limit, capped by the platform
    /// ceiling, never zero.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency_limit
            .min(self.max_concurrent_invocations)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.concurrency_limit, 16);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.max_concurrent_invocations, 200);
        assert!(config.write_error_reports);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: DispatcherConfig = toml::from_str("max_retries = 3").unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
    }

    #[test]
    fn test_effective_concurrency() {
        let mut config = DispatcherConfig::default().with_concurrency_limit(500);
        assert_eq!(config.effective_concurrency(), 200);
        config.concurrency_limit = 0;
        assert_eq!(config.effective_concurrency(), 1);
    }
}
