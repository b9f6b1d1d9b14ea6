//! Crawl requests and their fingerprints
//!
//! A `Request` is one unit of crawl work: a URL bound to the task that owns it, the
//! name of the rule that parses its response, its depth in the crawl tree, and an
//! optional bag of data handed down from the parent page's parser.

use crate::crawler::Task;
use crate::RequestError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// HTTP method used when none is given
pub const DEFAULT_METHOD: &str = "GET";

/// Deduplication key of a request: SHA-256 over its length-prefixed URL and its
/// upper-cased method
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Computes the fingerprint of a URL and method
    pub fn of(url: &str, method: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((url.len() as u64).to_be_bytes());
        hasher.update(url.as_bytes());
        hasher.update(method.to_ascii_uppercase().as_bytes());
        Self(hasher.finalize().into())
    }

    /// Returns the raw digest
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &hex::encode(&self.0[..8]))
    }
}

/// Small bag of values a parser passes down to the parser of a child request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TmpData {
    values: BTreeMap<String, Value>,
}

impl TmpData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under `key`, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the value under `key` if it is a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A single unit of crawl work
#[derive(Debug, Clone)]
pub struct Request {
    /// The task this request belongs to
    pub task: Arc<Task>,

    /// Target URL
    pub url: String,

    /// HTTP method
    pub method: String,

    /// Distance from the task's root requests
    pub depth: u32,

    /// Values above zero are dispatched ahead of everything else
    pub priority: i32,

    /// Name of the rule that parses the response
    pub rule_name: String,

    /// Data threaded from the parent request's parser
    pub tmp_data: Option<TmpData>,
}

impl Request {
    /// Creates a depth-0 GET request for `task`
    pub fn new(task: &Arc<Task>, url: impl Into<String>, rule_name: impl Into<String>) -> Self {
        Self {
            task: Arc::clone(task),
            url: url.into(),
            method: DEFAULT_METHOD.to_string(),
            depth: 0,
            priority: 0,
            rule_name: rule_name.into(),
            tmp_data: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_tmp_data(mut self, tmp_data: TmpData) -> Self {
        self.tmp_data = Some(tmp_data);
        self
    }

    /// Creates a request discovered while parsing this one
    ///
    /// The child belongs to the same task and sits one level deeper.
    pub fn child(&self, url: impl Into<String>, rule_name: impl Into<String>) -> Self {
        Self::new(&self.task, url, rule_name).with_depth(self.depth + 1)
    }

    /// Returns true if this request belongs to the priority class
    pub fn is_priority(&self) -> bool {
        self.priority > 0
    }

    /// Checks the request against its task's depth limit
    ///
    /// A request at exactly `max_depth` passes; one level deeper fails.
    pub fn check(&self) -> Result<(), RequestError> {
        let max_depth = self.task.property.max_depth;
        if self.depth > max_depth {
            return Err(RequestError::DepthExceeded {
                depth: self.depth,
                max_depth,
            });
        }
        Ok(())
    }

    /// Returns the deduplication key of this request
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.url, &self.method)
    }

    /// Returns the name of the owning task
    pub fn task_name(&self) -> &str {
        self.task.name()
    }
}
