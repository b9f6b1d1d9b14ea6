use crate::crawler::Fingerprint;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Fingerprints of requests already claimed for processing in this run
///
/// `insert` is a single test-and-set, so when several workers race on the same
/// fingerprint exactly one of them wins.
#[derive(Debug, Default)]
pub struct VisitedSet {
    inner: Mutex<HashSet<Fingerprint>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Fingerprint>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains(fingerprint)
    }

    /// Marks a fingerprint as visited
    ///
    /// Returns true if the caller is the first to claim it.
    pub fn insert(&self, fingerprint: Fingerprint) -> bool {
        self.lock().insert(fingerprint)
    }

    /// Releases a fingerprint so the request can be claimed again
    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().remove(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
