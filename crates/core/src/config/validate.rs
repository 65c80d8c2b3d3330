use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Cache byte budget and TTL are non-zero when the cache is enabled
/// - Async-plugin timeouts and worker bounds are sane
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.cache.enabled {
        if config.cache.memory_max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "cache.memory_max_bytes cannot be 0".to_string(),
            ));
        }
        if config.cache.ttl_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "cache.ttl_minutes cannot be 0".to_string(),
            ));
        }
    }

    if config.async_plugin.enabled {
        if config.async_plugin.max_background_workers == 0 {
            return Err(ConfigError::ValidationError(
                "async_plugin.max_background_workers cannot be 0".to_string(),
            ));
        }
        if config.async_plugin.max_background_tasks < config.async_plugin.max_background_workers {
            return Err(ConfigError::ValidationError(
                "async_plugin.max_background_tasks cannot be smaller than max_background_workers"
                    .to_string(),
            ));
        }
        if config.async_plugin.response_timeout_secs >= config.async_plugin.processing_timeout_secs
        {
            return Err(ConfigError::ValidationError(
                "async_plugin.response_timeout_secs must be smaller than processing_timeout_secs"
                    .to_string(),
            ));
        }
    }

    Ok(())
}
