//! Rate limiting for fetch pacing
//!
//! This module provides:
//! - The `RateLimiter` trait consulted by workers before every fetch
//! - `TokenBucket`, a cancellable token-bucket limiter on the tokio clock
//! - `MultiLimiter`, which stacks several limiters for one task
//!
//! All waiting is done on `tokio::time`, so tests can drive limiters with a paused clock.

mod bucket;
mod multi;

pub use bucket::TokenBucket;
pub use multi::MultiLimiter;

use async_trait::async_trait;
use std::cmp::Ordering;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur while waiting on a limiter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimiterError {
    #[error("Rate limiter wait cancelled")]
    Cancelled,
}

/// A steady-state event rate, in events per second
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit(f64);

impl Limit {
    /// No limit at all
    pub const INF: Limit = Limit(f64::INFINITY);

    /// Creates a limit of `events` per second
    pub fn per_second(events: f64) -> Self {
        Self(events.max(0.0))
    }

    /// Creates a limit allowing one event every `interval`
    pub fn every(interval: Duration) -> Self {
        if interval.is_zero() {
            return Self::INF;
        }
        Self(1.0 / interval.as_secs_f64())
    }

    /// Returns the rate in events per second
    pub fn as_f64(&self) -> f64 {
        self.0
    }

    /// Returns true if this limit never delays anything
    pub fn is_inf(&self) -> bool {
        self.0.is_infinite()
    }
}

impl PartialOrd for Limit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.total_cmp(&other.0))
    }
}

/// Builds a limit allowing `count` events per `duration`
///
/// # Example
///
/// ```
/// use spindle::limiter::per;
/// use std::time::Duration;
///
/// // 20 fetches per minute
/// let limit = per(20, Duration::from_secs(60));
/// assert!((limit.as_f64() - 1.0 / 3.0).abs() < 1e-9);
/// ```
pub fn per(count: u32, duration: Duration) -> Limit {
    Limit::every(duration / count.max(1))
}

/// A limiter a worker waits on before issuing a fetch
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Blocks until an event is permitted, or returns early when `cancel` fires
    async fn wait(&self, cancel: &CancellationToken) -> Result<(), LimiterError>;

    /// The limiter's steady-state rate
    fn limit(&self) -> Limit;
}
