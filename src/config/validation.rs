use super::models::Config;
use crate::registry::host_of;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Worker tick must be positive")]
    ZeroTick,

    #[error("Job queue capacity must be positive")]
    ZeroQueueCapacity,

    #[error("max_failures must be positive")]
    ZeroMaxFailures,

    #[error("Buffer growth block must be positive")]
    ZeroGrowthBlock,

    #[error("Initial buffer capacity ({initial}) exceeds max_capacity ({max})")]
    InitialCapacityExceedsMax { initial: u64, max: u64 },

    #[error("Resource URL '{url}' is invalid: {reason}")]
    InvalidResourceUrl { url: String, reason: String },

    #[error("Resource '{url}' has a zero refresh interval")]
    ZeroResourceInterval { url: String },

    #[error("Host '{host}' is declared by more than one resource")]
    DuplicateResourceHost { host: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_buffer(config)?;
    validate_resources(config)?;
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    if config.worker.tick_ms == 0 {
        return Err(ValidationError::ZeroTick);
    }
    if config.worker.queue_capacity == 0 {
        return Err(ValidationError::ZeroQueueCapacity);
    }
    if config.retry.max_failures == 0 {
        return Err(ValidationError::ZeroMaxFailures);
    }
    Ok(())
}

fn validate_buffer(config: &Config) -> Result<(), ValidationError> {
    let buffer = &config.buffer;
    if buffer.growth_block.as_u64() == 0 {
        return Err(ValidationError::ZeroGrowthBlock);
    }
    if buffer.initial_capacity > buffer.max_capacity {
        return Err(ValidationError::InitialCapacityExceedsMax {
            initial: buffer.initial_capacity.as_u64(),
            max: buffer.max_capacity.as_u64(),
        });
    }
    Ok(())
}

/// Registration keys resources by host, so two entries on one host would
/// silently collapse into one.
fn validate_resources(config: &Config) -> Result<(), ValidationError> {
    let mut hosts = HashSet::new();

    for resource in &config.resources {
        let host = host_of(&resource.url).map_err(|e| ValidationError::InvalidResourceUrl {
            url: resource.url.clone(),
            reason: e.to_string(),
        })?;

        if resource.interval_minutes == 0 {
            return Err(ValidationError::ZeroResourceInterval {
                url: resource.url.clone(),
            });
        }

        if !hosts.insert(host.clone()) {
            return Err(ValidationError::DuplicateResourceHost { host });
        }
    }

    Ok(())
}
