use super::{
    types::{Config, StorageBackend},
    ConfigError,
};
use crate::cost::LambdaPricing;

/// Memory sizes a worker function may be configured with.
pub const MEMORY_RANGE_MB: std::ops::RangeInclusive<u32> = 128..=10_240;

/// Ephemeral disk sizes a worker function may be configured with.
pub const DISK_RANGE_MB: std::ops::RangeInclusive<u32> = 512..=10_240;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - At least one finished render is retained
/// - Worker endpoint is set
/// - Concurrency fits under the invocation ceiling
/// - Memory and disk sizes are within platform limits
/// - The pricing region is known
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.server.max_finished_renders == 0 {
        return Err(invalid("server.max_finished_renders must be at least 1"));
    }

    if config.worker.endpoint.trim().is_empty() {
        return Err(invalid("worker.endpoint cannot be empty"));
    }

    if config.storage.backend == StorageBackend::Filesystem
        && config.storage.root.as_os_str().is_empty()
    {
        return Err(invalid("storage.root is required for the filesystem backend"));
    }

    let dispatcher = &config.dispatcher;
    if dispatcher.max_concurrent_invocations == 0 {
        return Err(invalid("dispatcher.max_concurrent_invocations cannot be 0"));
    }
    if dispatcher.concurrency_limit == 0 {
        return Err(invalid("dispatcher.concurrency_limit cannot be 0"));
    }
    if dispatcher.concurrency_limit > dispatcher.max_concurrent_invocations {
        return Err(invalid(format!(
            "dispatcher.concurrency_limit ({}) exceeds max_concurrent_invocations ({})",
            dispatcher.concurrency_limit, dispatcher.max_concurrent_invocations
        )));
    }
    if config.planner.default_concurrency == 0 {
        return Err(invalid("planner.default_concurrency cannot be 0"));
    }
    if config.planner.alignment == Some(0) {
        return Err(invalid("planner.alignment cannot be 0"));
    }

    let pricing = &config.pricing;
    if !MEMORY_RANGE_MB.contains(&pricing.memory_size_mb) {
        return Err(invalid(format!(
            "pricing.memory_size_mb must be between {} and {}, got {}",
            MEMORY_RANGE_MB.start(),
            MEMORY_RANGE_MB.end(),
            pricing.memory_size_mb
        )));
    }
    if !DISK_RANGE_MB.contains(&pricing.disk_size_mb) {
        return Err(invalid(format!(
            "pricing.disk_size_mb must be between {} and {}, got {}",
            DISK_RANGE_MB.start(),
            DISK_RANGE_MB.end(),
            pricing.disk_size_mb
        )));
    }
    if !LambdaPricing::supports_region(&pricing.region) {
        return Err(invalid(format!(
            "pricing.region '{}' is not a known region",
            pricing.region
        )));
    }

    if config.cleanup.batch_size == 0 {
        return Err(invalid("cleanup.batch_size cannot be 0"));
    }

    Ok(())
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(config: &Config) {
        let err = validate_config(config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_finished_render_retention() {
        let mut config = Config::default();
        config.server.max_finished_renders = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_concurrency_over_ceiling_fails() {
        let mut config = Config::default();
        config.dispatcher.max_concurrent_invocations = 10;
        config.dispatcher.concurrency_limit = 11;
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_memory_bounds() {
        let mut config = Config::default();
        config.pricing.memory_size_mb = 64;
        assert_invalid(&config);
        config.pricing.memory_size_mb = 10_240;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_disk_bounds() {
        let mut config = Config::default();
        config.pricing.disk_size_mb = 20_000;
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_unknown_region_fails() {
        let mut config = Config::default();
        config.pricing.region = "mars-north-1".to_string();
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_empty_endpoint_fails() {
        let mut config = Config::default();
        config.worker.endpoint = "  ".to_string();
        assert_invalid(&config);
    }
}
