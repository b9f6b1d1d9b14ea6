//! Token bucket limiter
//!
//! A thin layer over a `governor` direct limiter. The bucket holds up to `burst`
//! cells and refills at `limit` cells per second. Governor reads time through
//! [`TokioClock`], and waiting sleeps on `tokio::time`, so a paused test clock drives
//! the bucket. A waiter only takes a cell once it is allowed through, so a cancelled
//! waiter leaves the bucket untouched.

use crate::limiter::{Limit, LimiterError, RateLimiter};
use async_trait::async_trait;
use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Governor clock backed by `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into_std()
    }
}

type DirectLimiter =
    governor::RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<std::time::Instant>>;

/// Token-bucket rate limiter
pub struct TokenBucket {
    limit: Limit,
    burst: u32,
    // None for an infinite or a zero rate
    cells: Option<DirectLimiter>,
}

impl TokenBucket {
    /// Creates a full bucket
    ///
    /// # Arguments
    ///
    /// * `limit` - Refill rate
    /// * `burst` - Bucket size; a zero burst is treated as 1
    pub fn new(limit: Limit, burst: u32) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let cells = quota(limit, burst)
            .map(|quota| governor::RateLimiter::direct_with_clock(quota, TokioClock));

        Self {
            limit,
            burst: burst.get(),
            cells,
        }
    }

    /// Returns the bucket size
    pub fn burst(&self) -> u32 {
        self.burst
    }
}

/// Converts a rate into a governor quota; infinite and zero rates have none
fn quota(limit: Limit, burst: NonZeroU32) -> Option<Quota> {
    if limit.is_inf() || limit.as_f64() <= 0.0 {
        return None;
    }

    let period = Duration::try_from_secs_f64(1.0 / limit.as_f64()).ok()?;
    Quota::with_period(period).map(|quota| quota.allow_burst(burst))
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("limit", &self.limit)
            .field("burst", &self.burst)
            .finish()
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn wait(&self, cancel: &CancellationToken) -> Result<(), LimiterError> {
        if cancel.is_cancelled() {
            return Err(LimiterError::Cancelled);
        }

        let Some(cells) = &self.cells else {
            if self.limit.is_inf() {
                return Ok(());
            }
            // A zero rate never lets anything through
            cancel.cancelled().await;
            return Err(LimiterError::Cancelled);
        };

        loop {
            let delay = match cells.check() {
                Ok(()) => return Ok(()),
                Err(not_until) => not_until.wait_time_from(TokioClock.now()),
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(LimiterError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn limit(&self) -> Limit {
        self.limit
    }
}
