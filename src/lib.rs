//! Spindle: a concurrent, rule-driven crawl engine
//!
//! This crate schedules, deduplicates, rate-limits, fetches and parses pages for a set
//! of registered crawl tasks, feeding parsed items to a storage backend and discovered
//! links back into its own request queue.

pub mod config;
pub mod crawler;
pub mod limiter;
pub mod state;
pub mod storage;
pub mod tasks;

use thiserror::Error;

/// Main error type for Spindle operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task {0} has no fetcher bound")]
    MissingFetcher(String),

    #[error("Scheduler is closed")]
    SchedulerClosed,

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors returned by a [`crawler::Fetcher`]
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Task {0} has no fetcher bound")]
    NoFetcher(String),

    #[error("{0}")]
    Other(String),
}

/// Errors returned by a rule's parse function or root producer
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Missing temporary data: {0}")]
    MissingTmpData(String),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by [`crawler::Request::check`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Max depth limit reached: depth {depth} > {max_depth}")]
    DepthExceeded { depth: u32, max_depth: u32 },
}

/// Result type alias for Spindle operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    Context, Engine, EngineBuilder, EngineReport, Fetcher, Fingerprint, ParseResult, Request,
    Rule, RuleTree, Seed, Task, TaskRegistry,
};
pub use limiter::{per, Limit, MultiLimiter, RateLimiter, TokenBucket};
pub use state::{FailureSet, VisitedSet};
pub use storage::{Item, Storage};
