//! Composite limiter
//!
//! Stacks several limiters for one task, e.g. "one fetch per two seconds" together with
//! "twenty fetches per minute". Limiters are sorted by ascending rate once, at
//! construction, and waited on in that order.

use crate::limiter::{Limit, LimiterError, RateLimiter};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A limiter that waits on every limiter it holds, tightest first
pub struct MultiLimiter {
    limiters: Vec<Arc<dyn RateLimiter>>,
}

impl MultiLimiter {
    /// Creates a composite from the given limiters
    pub fn new(mut limiters: Vec<Arc<dyn RateLimiter>>) -> Self {
        limiters.sort_by(|a, b| a.limit().as_f64().total_cmp(&b.limit().as_f64()));
        Self { limiters }
    }

    /// Returns the limits of the held limiters in wait order
    pub fn limits(&self) -> Vec<Limit> {
        self.limiters.iter().map(|l| l.limit()).collect()
    }

    /// Returns the number of held limiters
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Returns true if the composite holds no limiters
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

impl std::fmt::Debug for MultiLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiLimiter")
            .field("limits", &self.limits())
            .finish()
    }
}

#[async_trait]
impl RateLimiter for MultiLimiter {
    async fn wait(&self, cancel: &CancellationToken) -> Result<(), LimiterError> {
        for limiter in &self.limiters {
            limiter.wait(cancel).await?;
        }
        Ok(())
    }

    fn limit(&self) -> Limit {
        self.limiters
            .first()
            .map(|l| l.limit())
            .unwrap_or(Limit::INF)
    }
}
