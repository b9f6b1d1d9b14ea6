//! Crawl workers
//!
//! Each worker loops: pull a request, gate it on depth and the visited set, wait on
//! the task's rate limiter and a random pause, fetch, parse, push discovered requests
//! back to the scheduler and hand the items to the result sink.
//!
//! A request whose fetch or parse fails gets exactly one retry per run. A panic in
//! any single iteration is caught and logged; the worker moves on to the next request.

use crate::crawler::scheduler::SchedulerHandle;
use crate::crawler::stats::{bump, EngineStats};
use crate::crawler::{Context, ParseResult, Request, Task};
use crate::state::{FailureSet, VisitedSet};
use crate::storage::Item;
use crate::FetchError;
use futures::FutureExt;
use rand::Rng;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bodies shorter than this many bytes are treated as block or error pages
pub const DEFAULT_MIN_CONTENT_LENGTH: usize = 6000;

/// Items parsed from one page, on their way to the result sink
#[derive(Debug)]
pub struct Harvest {
    pub task: Arc<Task>,
    pub url: String,
    pub items: Vec<Item>,
}

/// State every worker shares
pub struct WorkerShared {
    pub scheduler: SchedulerHandle,
    pub visited: Arc<VisitedSet>,
    pub failures: Arc<FailureSet>,
    pub stats: Arc<EngineStats>,
    pub output: mpsc::Sender<Harvest>,
    pub min_content_length: usize,
}

/// One crawl worker
pub struct Worker {
    id: usize,
    shared: Arc<WorkerShared>,
}

impl Worker {
    pub fn new(id: usize, shared: Arc<WorkerShared>) -> Self {
        Self { id, shared }
    }

    /// Serves requests until cancelled or until the scheduler stops
    pub async fn run(self, cancel: CancellationToken) {
        tracing::debug!(worker = self.id, "Worker started");

        loop {
            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                pulled = self.shared.scheduler.pull() => match pulled {
                    Some(request) => request,
                    None => break,
                },
            };

            bump(&self.shared.stats.pulled);
            let url = request.url.clone();

            let outcome = AssertUnwindSafe(self.handle(request, &cancel))
                .catch_unwind()
                .await;
            if let Err(panic) = outcome {
                bump(&self.shared.stats.panics);
                tracing::error!(
                    worker = self.id,
                    url = %url,
                    "Worker recovered from panic: {}",
                    panic_message(panic.as_ref())
                );
            }

            self.shared.scheduler.in_flight().done();
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    /// Processes one pulled request
    async fn handle(&self, request: Request, cancel: &CancellationToken) {
        let stats = &self.shared.stats;

        if let Err(e) = request.check() {
            bump(&stats.depth_exceeded);
            tracing::warn!(url = %request.url, task = %request.task_name(), "{}", e);
            return;
        }

        if !request.task.property.reload && !self.shared.visited.insert(request.fingerprint()) {
            bump(&stats.duplicates);
            tracing::debug!(url = %request.url, "Request has been visited");
            return;
        }

        if let Some(limiter) = &request.task.limiter {
            if limiter.wait(cancel).await.is_err() {
                return;
            }
        }

        let pause = jitter(request.task.property.wait_time);
        if !pause.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        let fetched = match &request.task.fetcher {
            Some(fetcher) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = fetcher.get(&request) => result,
                }
            }
            None => Err(FetchError::NoFetcher(request.task_name().to_string())),
        };

        let body = match fetched {
            Ok(body) if body.len() >= self.shared.min_content_length => body,
            Ok(body) => {
                bump(&stats.fetch_failures);
                tracing::error!(
                    url = %request.url,
                    "Body too short: {} bytes, expected at least {}",
                    body.len(),
                    self.shared.min_content_length
                );
                self.handle_failure(request);
                return;
            }
            Err(e) => {
                bump(&stats.fetch_failures);
                tracing::error!(url = %request.url, "Fetch failed: {}", e);
                self.handle_failure(request);
                return;
            }
        };
        bump(&stats.fetched);

        let Some(rule) = request.task.rules.get(&request.rule_name) else {
            bump(&stats.parse_failures);
            tracing::error!(
                url = %request.url,
                task = %request.task_name(),
                "Rule {} not found",
                request.rule_name
            );
            return;
        };

        let parsed = (rule.parse)(&Context::new(&body, &request));
        let ParseResult { requests, items } = match parsed {
            Ok(result) => result,
            Err(e) => {
                bump(&stats.parse_failures);
                tracing::error!(url = %request.url, rule = %request.rule_name, "Parse failed: {}", e);
                self.handle_failure(request);
                return;
            }
        };

        if !requests.is_empty() {
            let children: Vec<Request> = requests
                .into_iter()
                .map(|mut child| {
                    child.depth = request.depth + 1;
                    child
                })
                .collect();

            tracing::debug!(url = %request.url, "Discovered {} requests", children.len());
            self.push(children);
        }

        let harvest = Harvest {
            task: Arc::clone(&request.task),
            url: request.url.clone(),
            items,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            sent = self.shared.output.send(harvest) => {
                if sent.is_err() {
                    tracing::debug!(url = %request.url, "Result sink is closed");
                }
            }
        }
    }

    /// Applies the retry-once policy to a failed request
    fn handle_failure(&self, mut request: Request) {
        if !request.task.property.reload {
            self.shared.visited.remove(&request.fingerprint());
        }

        if self.shared.failures.record_first(&request) {
            bump(&self.shared.stats.retries);
            tracing::warn!(url = %request.url, task = %request.task_name(), "Retrying request");
            request.priority = 0;
            self.push(vec![request]);
        } else {
            bump(&self.shared.stats.dropped_after_retry);
            tracing::warn!(
                url = %request.url,
                task = %request.task_name(),
                "Request failed again, dropping it"
            );
        }
    }

    /// Worker pushes never wait for queue capacity, since this worker may be the one
    /// that has to pull to make room
    fn push(&self, requests: Vec<Request>) {
        if let Err(e) = self.shared.scheduler.push_nowait(requests) {
            tracing::warn!("Could not push requests: {}", e);
        }
    }
}

/// The running workers of one engine
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `count` workers on the current runtime
    pub fn spawn(count: usize, shared: Arc<WorkerShared>, cancel: &CancellationToken) -> Self {
        let handles = (0..count)
            .map(|id| tokio::spawn(Worker::new(id, Arc::clone(&shared)).run(cancel.clone())))
            .collect();
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker to stop
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker task failed: {}", e);
            }
        }
    }
}

/// Picks a random pause in `[0, max)`
fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..max)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
