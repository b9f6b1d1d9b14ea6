use crate::crawler::{Overflow, QueuePolicy, DEFAULT_MIN_CONTENT_LENGTH};
use crate::storage::DEFAULT_BATCH_COUNT;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Spindle
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// One seed per entry
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskConfig>,
}

/// Engine behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of concurrent workers
    #[serde(rename = "worker-count", default = "default_worker_count")]
    pub worker_count: usize,

    /// Bodies shorter than this are treated as failed fetches
    #[serde(rename = "min-content-length", default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Capacity of the channel between workers and the result sink
    #[serde(rename = "output-buffer", default = "default_output_buffer")]
    pub output_buffer: usize,

    /// Maximum number of queued requests (0 = unbounded)
    #[serde(rename = "queue-capacity", default)]
    pub queue_capacity: usize,

    /// What to do when a bounded queue is full
    #[serde(rename = "queue-overflow", default)]
    pub queue_overflow: Overflow,
}

impl EngineConfig {
    pub fn queue_policy(&self) -> QueuePolicy {
        if self.queue_capacity == 0 {
            QueuePolicy::unbounded()
        } else {
            QueuePolicy::bounded(self.queue_capacity, self.queue_overflow)
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            min_content_length: default_min_content_length(),
            output_buffer: default_output_buffer(),
            queue_capacity: 0,
            queue_overflow: Overflow::default(),
        }
    }
}

/// Settings shared by every fetcher
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// User agent for the browser fetcher; empty means the built-in desktop agent
    #[serde(rename = "user-agent", default)]
    pub user_agent: String,

    /// Request timeout (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Proxy URL for the browser fetcher
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            timeout_ms: default_timeout_ms(),
            proxy: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file; items are only logged when absent
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,

    /// Number of buffered items that triggers a write
    #[serde(rename = "batch-count", default = "default_batch_count")]
    pub batch_count: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            batch_count: default_batch_count(),
        }
    }
}

/// Fetch strategy of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    #[default]
    Http,
    Browser,
}

/// A seed: a registered task name plus runtime settings
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Name of a registered task
    pub name: String,

    #[serde(default)]
    pub fetcher: FetcherKind,

    /// Upper bound of the random pause before each fetch (seconds)
    #[serde(rename = "wait-time", default)]
    pub wait_time: Option<u64>,

    #[serde(default)]
    pub reload: Option<bool>,

    #[serde(rename = "max-depth", default)]
    pub max_depth: Option<u32>,

    #[serde(default)]
    pub cookie: Option<String>,

    /// Rate limits, all of which apply
    #[serde(default)]
    pub limits: Vec<LimitConfig>,
}

impl TaskConfig {
    pub fn wait_time(&self) -> Option<Duration> {
        self.wait_time.map(Duration::from_secs)
    }
}

/// A token bucket: `event-count` events every `event-dur` seconds
#[derive(Debug, Clone, Deserialize)]
pub struct LimitConfig {
    #[serde(rename = "event-count")]
    pub event_count: u32,

    /// Window length (seconds)
    #[serde(rename = "event-dur")]
    pub event_dur: u64,

    /// Bucket size
    #[serde(default = "default_bucket")]
    pub bucket: u32,
}

fn default_worker_count() -> usize {
    5
}

fn default_min_content_length() -> usize {
    DEFAULT_MIN_CONTENT_LENGTH
}

fn default_output_buffer() -> usize {
    16
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_batch_count() -> usize {
    DEFAULT_BATCH_COUNT
}

fn default_bucket() -> u32 {
    1
}
