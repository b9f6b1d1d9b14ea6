use crate::crawler::{Fingerprint, Request};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A request whose fetch or parse failed once
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub task: String,
    pub url: String,
    pub rule_name: String,
    pub depth: u32,
}

impl From<&Request> for FailureRecord {
    fn from(request: &Request) -> Self {
        Self {
            task: request.task_name().to_string(),
            url: request.url.clone(),
            rule_name: request.rule_name.clone(),
            depth: request.depth,
        }
    }
}

/// Requests that have already used their single retry in this run
#[derive(Debug, Default)]
pub struct FailureSet {
    inner: Mutex<HashMap<Fingerprint, FailureRecord>>,
}

impl FailureSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, FailureRecord>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a failure of `request`
    ///
    /// Returns true on the first failure of this fingerprint, meaning the request
    /// earns one retry. Later failures return false and leave the record unchanged.
    pub fn record_first(&self, request: &Request) -> bool {
        let mut inner = self.lock();
        let fingerprint = request.fingerprint();
        if inner.contains_key(&fingerprint) {
            return false;
        }
        inner.insert(fingerprint, FailureRecord::from(request));
        true
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains_key(fingerprint)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<FailureRecord> {
        self.lock().get(fingerprint).cloned()
    }

    /// Returns the URLs recorded so far, sorted
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.lock().values().map(|r| r.url.clone()).collect();
        urls.sort();
        urls
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
