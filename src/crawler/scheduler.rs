//! Request queue and dispatch loop
//!
//! The scheduler keeps two FIFO queues: one for priority requests (priority > 0) and
//! one for everything else. A single dispatch loop owns both queues. On each turn it
//! picks a candidate (priority queue first) and then services whichever happens first:
//! a worker taking the candidate, a new push, or cancellation. A push is never lost
//! while a candidate is on offer.
//!
//! Producers and workers talk to the loop through a cloneable `SchedulerHandle`.
//! With a bounded queue, each queued request holds a capacity permit until it is
//! dispatched. Only outside producers ever wait for a permit: workers feed the queue
//! they drain, so their pushes go through `push_nowait`.

use crate::crawler::Request;
use crate::CrawlError;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

/// What `push` does once a bounded queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overflow {
    /// Outside producers wait until the dispatcher hands a queued request to a
    /// worker; worker pushes are accepted over capacity
    #[default]
    Block,

    /// Discard the request and log it
    Drop,
}

/// Queue capacity and overflow behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueuePolicy {
    /// Maximum number of queued requests; `None` means unbounded
    pub capacity: Option<usize>,

    pub overflow: Overflow,
}

impl QueuePolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize, overflow: Overflow) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            overflow,
        }
    }
}

/// Counts requests that were pushed but are not fully handled yet
///
/// A request stays in flight from the moment it is pushed until the worker that
/// pulled it has finished its iteration, including pushing any children or a retry.
/// The count reaching zero therefore means the crawl has nothing left to do.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        self.count.fetch_add(n, Ordering::SeqCst);
    }

    /// Marks one request as handled
    pub fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Waits until nothing is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A pushed request and the capacity permit it holds, if any
struct Queued {
    request: Request,
    _permit: Option<OwnedSemaphorePermit>,
}

/// The dispatch loop; consumed by [`Scheduler::run`]
pub struct Scheduler {
    request_rx: mpsc::UnboundedReceiver<Queued>,
    worker_tx: mpsc::Sender<Request>,
    capacity: Option<Arc<Semaphore>>,
}

/// Cloneable access to a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    request_tx: mpsc::UnboundedSender<Queued>,
    worker_rx: Arc<Mutex<mpsc::Receiver<Request>>>,
    capacity: Option<Arc<Semaphore>>,
    overflow: Overflow,
    in_flight: Arc<InFlight>,
}

impl Scheduler {
    /// Creates a scheduler and the handle used to push to and pull from it
    ///
    /// Nothing is dispatched until [`Scheduler::run`] is started.
    pub fn new(policy: QueuePolicy) -> (Scheduler, SchedulerHandle) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (worker_tx, worker_rx) = mpsc::channel(1);
        let capacity = policy.capacity.map(|n| Arc::new(Semaphore::new(n)));

        let scheduler = Scheduler {
            request_rx,
            worker_tx,
            capacity: capacity.clone(),
        };
        let handle = SchedulerHandle {
            request_tx,
            worker_rx: Arc::new(Mutex::new(worker_rx)),
            capacity,
            overflow: policy.overflow,
            in_flight: Arc::new(InFlight::new()),
        };

        (scheduler, handle)
    }

    /// Runs the dispatch loop until cancelled or until every handle is gone and the
    /// queues are empty
    ///
    /// When the loop exits, later pushes fail with `CrawlError::SchedulerClosed` and
    /// pulls return `None` once the hand-off slot is drained.
    pub async fn run(self, cancel: CancellationToken) {
        let Scheduler {
            mut request_rx,
            worker_tx,
            capacity,
        } = self;

        let mut priority: VecDeque<Queued> = VecDeque::new();
        let mut normal: VecDeque<Queued> = VecDeque::new();
        let mut candidate: Option<Queued> = None;
        let mut open = true;

        loop {
            // Take everything already pushed before choosing a candidate
            while let Ok(request) = request_rx.try_recv() {
                enqueue(&mut priority, &mut normal, request);
            }

            if candidate.is_none() {
                candidate = priority.pop_front().or_else(|| normal.pop_front());
            }

            if !open && candidate.is_none() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!(
                        "Scheduler cancelled with {} requests queued",
                        priority.len() + normal.len() + usize::from(candidate.is_some())
                    );
                    break;
                }

                permit = worker_tx.reserve(), if candidate.is_some() => {
                    let Ok(permit) = permit else {
                        tracing::debug!("All workers are gone, stopping scheduler");
                        break;
                    };
                    // Dropping the queued entry releases its capacity permit
                    if let Some(Queued { request, .. }) = candidate.take() {
                        tracing::trace!(url = %request.url, priority = request.priority, "dispatch request");
                        permit.send(request);
                    }
                }

                received = request_rx.recv(), if open => {
                    match received {
                        Some(request) => enqueue(&mut priority, &mut normal, request),
                        None => open = false,
                    }
                }
            }
        }

        if let Some(capacity) = capacity {
            capacity.close();
        }
    }
}

fn enqueue(priority: &mut VecDeque<Queued>, normal: &mut VecDeque<Queued>, queued: Queued) {
    if queued.request.is_priority() {
        priority.push_back(queued);
    } else {
        normal.push_back(queued);
    }
}

impl SchedulerHandle {
    /// Enqueues requests in order
    ///
    /// With an unbounded queue this never waits. With a bounded queue the overflow
    /// policy decides between waiting for room and dropping the request. Workers must
    /// use [`SchedulerHandle::push_nowait`] instead, since a worker waiting here cannot
    /// pull the request that would make room.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of requests accepted
    /// * `Err(CrawlError::SchedulerClosed)` - The dispatch loop has stopped
    pub async fn push(&self, requests: Vec<Request>) -> Result<usize, CrawlError> {
        let mut accepted = 0;

        for request in requests {
            let permit = match &self.capacity {
                None => None,
                Some(capacity) => match self.overflow {
                    Overflow::Block => match Arc::clone(capacity).acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return Err(CrawlError::SchedulerClosed),
                    },
                    Overflow::Drop => match Arc::clone(capacity).try_acquire_owned() {
                        Ok(permit) => Some(permit),
                        Err(TryAcquireError::Closed) => return Err(CrawlError::SchedulerClosed),
                        Err(TryAcquireError::NoPermits) => {
                            tracing::warn!(url = %request.url, task = %request.task_name(), "Queue full, dropping request");
                            continue;
                        }
                    },
                },
            };

            self.send(request, permit)?;
            accepted += 1;
        }

        Ok(accepted)
    }

    /// Enqueues requests without ever waiting for capacity
    ///
    /// Used by workers for discovered requests and retries. A request takes a
    /// capacity permit when one is free. When the queue is full, `Overflow::Block`
    /// accepts it over capacity and `Overflow::Drop` discards it.
    pub fn push_nowait(&self, requests: Vec<Request>) -> Result<usize, CrawlError> {
        let mut accepted = 0;

        for request in requests {
            let permit = match &self.capacity {
                None => None,
                Some(capacity) => match Arc::clone(capacity).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(TryAcquireError::Closed) => return Err(CrawlError::SchedulerClosed),
                    Err(TryAcquireError::NoPermits) => match self.overflow {
                        Overflow::Block => {
                            tracing::debug!(url = %request.url, "Queue full, accepting worker push over capacity");
                            None
                        }
                        Overflow::Drop => {
                            tracing::warn!(url = %request.url, task = %request.task_name(), "Queue full, dropping request");
                            continue;
                        }
                    },
                },
            };

            self.send(request, permit)?;
            accepted += 1;
        }

        Ok(accepted)
    }

    fn send(&self, request: Request, permit: Option<OwnedSemaphorePermit>) -> Result<(), CrawlError> {
        self.in_flight.add(1);
        let queued = Queued {
            request,
            _permit: permit,
        };
        if self.request_tx.send(queued).is_err() {
            self.in_flight.done();
            return Err(CrawlError::SchedulerClosed);
        }
        Ok(())
    }

    /// Waits for the next dispatched request
    ///
    /// Returns `None` once the dispatch loop has stopped.
    pub async fn pull(&self) -> Option<Request> {
        self.worker_rx.lock().await.recv().await
    }

    /// Returns the shared in-flight counter
    pub fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }
}
