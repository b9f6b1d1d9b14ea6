//! State module for tracking crawl progress
//!
//! This module provides the per-run bookkeeping shared by all workers.
//!
//! # Components
//!
//! - `VisitedSet`: Fingerprints already claimed for processing
//! - `FailureSet`: Requests that have used their single retry

mod failures;
mod visited;

// Re-export main types
pub use failures::{FailureRecord, FailureSet};
pub use visited::VisitedSet;
