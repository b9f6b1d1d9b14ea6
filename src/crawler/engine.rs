//! Engine - crawl orchestration
//!
//! This module wires one crawl run together:
//! - Resolving seeds against the task registry and binding their collaborators
//! - Pushing each task's root requests
//! - Running the scheduler, the worker pool and the result sink
//! - Stopping when the crawl goes idle or the caller cancels

use crate::crawler::scheduler::{QueuePolicy, Scheduler};
use crate::crawler::sink::ResultSink;
use crate::crawler::stats::{EngineStats, StatsSnapshot};
use crate::crawler::worker::{WorkerPool, WorkerShared, DEFAULT_MIN_CONTENT_LENGTH};
use crate::crawler::{Seed, Task, TaskRegistry};
use crate::state::{FailureSet, VisitedSet};
use crate::storage::Storage;
use crate::CrawlError;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default number of workers
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Default capacity of the channel between workers and the result sink
pub const DEFAULT_OUTPUT_BUFFER: usize = 16;

/// Outcome of one crawl run
#[derive(Debug)]
pub struct EngineReport {
    pub stats: StatsSnapshot,

    /// Fingerprints visited during the run
    pub visited: Arc<VisitedSet>,

    /// Requests that failed at least once
    pub failures: Arc<FailureSet>,

    /// True if the run was stopped by the caller rather than running out of work
    pub cancelled: bool,
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    registry: Arc<TaskRegistry>,
    worker_count: usize,
    min_content_length: usize,
    output_buffer: usize,
    queue_policy: QueuePolicy,
    storage: Option<Arc<dyn Storage>>,
}

impl EngineBuilder {
    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    /// Bodies shorter than this are handed to the failure policy
    pub fn min_content_length(mut self, min_content_length: usize) -> Self {
        self.min_content_length = min_content_length;
        self
    }

    pub fn output_buffer(mut self, output_buffer: usize) -> Self {
        self.output_buffer = output_buffer.max(1);
        self
    }

    pub fn queue_policy(mut self, queue_policy: QueuePolicy) -> Self {
        self.queue_policy = queue_policy;
        self
    }

    /// Storage used for tasks that have none bound
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            registry: self.registry,
            worker_count: self.worker_count,
            min_content_length: self.min_content_length,
            output_buffer: self.output_buffer,
            queue_policy: self.queue_policy,
            storage: self.storage,
        }
    }
}

/// Runs crawls over the tasks of a registry
///
/// Every call to [`Engine::run`] starts with an empty visited set and failure set.
pub struct Engine {
    registry: Arc<TaskRegistry>,
    worker_count: usize,
    min_content_length: usize,
    output_buffer: usize,
    queue_policy: QueuePolicy,
    storage: Option<Arc<dyn Storage>>,
}

impl Engine {
    pub fn builder(registry: Arc<TaskRegistry>) -> EngineBuilder {
        EngineBuilder {
            registry,
            worker_count: DEFAULT_WORKER_COUNT,
            min_content_length: DEFAULT_MIN_CONTENT_LENGTH,
            output_buffer: DEFAULT_OUTPUT_BUFFER,
            queue_policy: QueuePolicy::unbounded(),
            storage: None,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Runs one crawl
    ///
    /// # Arguments
    ///
    /// * `seeds` - Registered task names plus the collaborators to bind onto them
    /// * `cancel` - Stops the crawl early when cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(EngineReport)` - The crawl ran out of work or was cancelled
    /// * `Err(CrawlError)` - A seed names an unknown task or has no fetcher
    pub async fn run(
        &self,
        seeds: Vec<Seed>,
        cancel: CancellationToken,
    ) -> Result<EngineReport, CrawlError> {
        let tasks = self.bind_seeds(&seeds)?;
        let start_time = Instant::now();

        let stats = Arc::new(EngineStats::new());
        let visited = Arc::new(VisitedSet::new());
        let failures = Arc::new(FailureSet::new());

        let run_token = cancel.child_token();
        let (scheduler, handle) = Scheduler::new(self.queue_policy);
        let dispatcher = tokio::spawn(scheduler.run(run_token.clone()));

        let (output, harvests) = mpsc::channel(self.output_buffer);
        let sink = tokio::spawn(
            ResultSink::new(self.storage.clone(), Arc::clone(&stats)).run(harvests),
        );

        let workers = WorkerPool::spawn(
            self.worker_count,
            Arc::new(WorkerShared {
                scheduler: handle.clone(),
                visited: Arc::clone(&visited),
                failures: Arc::clone(&failures),
                stats: Arc::clone(&stats),
                output,
                min_content_length: self.min_content_length,
            }),
            &run_token,
        );
        tracing::info!(
            "Starting crawl: {} tasks, {} workers",
            tasks.len(),
            workers.len()
        );

        // Holds the run open until every seed has been pushed
        let in_flight = Arc::clone(handle.in_flight());
        in_flight.add(1);
        for task in &tasks {
            match task.roots() {
                Ok(roots) => {
                    tracing::info!(task = %task.name(), "Seeding {} root requests", roots.len());
                    if let Err(e) = handle.push(roots).await {
                        tracing::warn!(task = %task.name(), "Could not seed requests: {}", e);
                    }
                }
                Err(e) => {
                    tracing::error!(task = %task.name(), "Root requests failed: {}", e);
                }
            }
        }
        in_flight.done();

        let cancelled = tokio::select! {
            _ = run_token.cancelled() => true,
            _ = in_flight.wait_idle() => false,
        };
        if cancelled {
            tracing::info!("Crawl cancelled, shutting down");
        } else {
            tracing::info!("No requests left, shutting down");
        }

        run_token.cancel();
        workers.join().await;
        drop(handle);

        if let Err(e) = dispatcher.await {
            tracing::error!("Scheduler task failed: {}", e);
        }
        if let Err(e) = sink.await {
            tracing::error!("Result sink task failed: {}", e);
        }

        let snapshot = stats.snapshot();
        tracing::info!(
            "Crawl finished in {:.2?}: {} pages fetched, {} items",
            start_time.elapsed(),
            snapshot.fetched,
            snapshot.items
        );

        Ok(EngineReport {
            stats: snapshot,
            visited,
            failures,
            cancelled,
        })
    }

    /// Resolves every seed before anything starts
    fn bind_seeds(&self, seeds: &[Seed]) -> Result<Vec<Arc<Task>>, CrawlError> {
        seeds
            .iter()
            .map(|seed| {
                let registered = self
                    .registry
                    .get(&seed.name)
                    .ok_or_else(|| CrawlError::UnknownTask(seed.name.clone()))?;

                let task = registered.bind(seed);
                if task.fetcher.is_none() {
                    return Err(CrawlError::MissingFetcher(seed.name.clone()));
                }
                Ok(Arc::new(task))
            })
            .collect()
    }
}
