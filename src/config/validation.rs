use crate::config::types::{Config, EngineConfig, FetcherConfig, LimitConfig, StorageConfig, TaskConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound on `worker-count`
pub const MAX_WORKERS: usize = 256;

/// Lower bound on `timeout-ms`
pub const MIN_TIMEOUT_MS: u64 = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_storage_config(&config.storage)?;
    validate_tasks(&config.tasks)?;
    Ok(())
}

/// Validates engine configuration
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.worker_count < 1 || config.worker_count > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "worker-count must be between 1 and {}, got {}",
            MAX_WORKERS, config.worker_count
        )));
    }

    if config.output_buffer < 1 {
        return Err(ConfigError::Validation(
            "output-buffer must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.timeout_ms < MIN_TIMEOUT_MS {
        return Err(ConfigError::Validation(format!(
            "timeout-ms must be >= {}ms, got {}ms",
            MIN_TIMEOUT_MS, config.timeout_ms
        )));
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.batch_count < 1 {
        return Err(ConfigError::Validation(
            "batch-count must be >= 1".to_string(),
        ));
    }

    if matches!(&config.database_path, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the seed task entries
fn validate_tasks(tasks: &[TaskConfig]) -> Result<(), ConfigError> {
    if tasks.is_empty() {
        return Err(ConfigError::Validation(
            "At least one [[task]] entry is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        if task.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Task name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(task.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Task '{}' is listed more than once",
                task.name
            )));
        }

        for limit in &task.limits {
            validate_limit(&task.name, limit)?;
        }
    }

    Ok(())
}

fn validate_limit(task: &str, limit: &LimitConfig) -> Result<(), ConfigError> {
    if limit.event_count < 1 {
        return Err(ConfigError::Validation(format!(
            "Task '{}': event-count must be >= 1",
            task
        )));
    }

    if limit.event_dur < 1 {
        return Err(ConfigError::Validation(format!(
            "Task '{}': event-dur must be >= 1 second",
            task
        )));
    }

    if limit.bucket < 1 {
        return Err(ConfigError::Validation(format!(
            "Task '{}': bucket must be >= 1",
            task
        )));
    }

    Ok(())
}
