//! Turning configuration into engine inputs

use crate::config::types::{Config, EngineConfig, FetcherKind, LimitConfig};
use crate::crawler::{build_fetcher, EngineBuilder, Fetcher, Seed};
use crate::limiter::{per, MultiLimiter, RateLimiter, TokenBucket};
use crate::storage::Storage;
use crate::FetchError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builds the limiter for one task; `None` when the task has no limits
pub fn build_limiter(limits: &[LimitConfig]) -> Option<Arc<dyn RateLimiter>> {
    if limits.is_empty() {
        return None;
    }

    let buckets: Vec<Arc<dyn RateLimiter>> = limits
        .iter()
        .map(|limit| {
            let rate = per(limit.event_count, Duration::from_secs(limit.event_dur));
            Arc::new(TokenBucket::new(rate, limit.bucket)) as Arc<dyn RateLimiter>
        })
        .collect();

    Some(Arc::new(MultiLimiter::new(buckets)))
}

/// Builds one seed per `[[task]]` entry
///
/// Tasks using the same fetch strategy share one fetcher. Every seed gets `storage`
/// when it is given.
///
/// # Returns
///
/// * `Ok(Vec<Seed>)` - One seed per task entry, in file order
/// * `Err(FetchError)` - A fetcher could not be built (bad proxy, TLS setup)
pub fn build_seeds(
    config: &Config,
    storage: Option<Arc<dyn Storage>>,
) -> Result<Vec<Seed>, FetchError> {
    let mut fetchers: HashMap<FetcherKind, Arc<dyn Fetcher>> = HashMap::new();
    let mut seeds = Vec::with_capacity(config.tasks.len());

    for entry in &config.tasks {
        let fetcher = match fetchers.get(&entry.fetcher) {
            Some(fetcher) => Arc::clone(fetcher),
            None => {
                let fetcher = build_fetcher(entry.fetcher, &config.fetcher)?;
                fetchers.insert(entry.fetcher, Arc::clone(&fetcher));
                fetcher
            }
        };

        let mut seed = Seed::new(&entry.name).with_fetcher(fetcher);
        if let Some(storage) = &storage {
            seed = seed.with_storage(Arc::clone(storage));
        }
        if let Some(limiter) = build_limiter(&entry.limits) {
            seed = seed.with_limiter(limiter);
        }
        seed.wait_time = entry.wait_time();
        seed.reload = entry.reload;
        seed.max_depth = entry.max_depth;
        seed.cookie = entry.cookie.clone();

        seeds.push(seed);
    }

    Ok(seeds)
}

/// Applies the `[engine]` section to an engine builder
pub fn configure_engine(builder: EngineBuilder, config: &EngineConfig) -> EngineBuilder {
    builder
        .worker_count(config.worker_count)
        .min_content_length(config.min_content_length)
        .output_buffer(config.output_buffer)
        .queue_policy(config.queue_policy())
}
