//! Crawler module: the scheduling engine and its data model
//!
//! This module contains the core crawling logic, including:
//! - Requests, tasks, rule trees and the task registry
//! - The priority-aware scheduler and its dispatch loop
//! - The worker pool with deduplication and the retry-once failure policy
//! - Fetch strategies and parse helpers
//! - The result sink and the engine tying everything together

mod engine;
mod fetcher;
mod parser;
mod registry;
mod request;
mod scheduler;
mod sink;
mod stats;
mod task;
mod worker;

pub use engine::{Engine, EngineBuilder, EngineReport, DEFAULT_OUTPUT_BUFFER, DEFAULT_WORKER_COUNT};
pub use fetcher::{
    build_fetcher, decode_body, BrowserFetcher, Fetcher, HttpFetcher, BROWSER_USER_AGENT,
    DEFAULT_USER_AGENT,
};
pub use parser::{extract_links, Context, ParseResult};
pub use registry::TaskRegistry;
pub use request::{Fingerprint, Request, TmpData, DEFAULT_METHOD};
pub use scheduler::{InFlight, Overflow, QueuePolicy, Scheduler, SchedulerHandle};
pub use sink::ResultSink;
pub use stats::{EngineStats, StatsSnapshot};
pub use task::{ParseFn, Property, RootFn, Rule, RuleTree, Seed, Task};
pub use worker::{Harvest, Worker, WorkerPool, WorkerShared, DEFAULT_MIN_CONTENT_LENGTH};
