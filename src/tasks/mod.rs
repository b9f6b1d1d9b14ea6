//! Built-in crawl tasks
//!
//! Each function returns an unbound [`Task`]; the binary registers them all through
//! [`registry`] and seeds bind fetchers, storage and limiters onto them at run time.

mod douban_book;
mod douban_group;

pub use douban_book::{douban_book, DOUBAN_BOOK};
pub use douban_group::{douban_group, DOUBAN_GROUP};

use crate::crawler::{Task, TaskRegistry};

/// Returns every built-in task
pub fn builtin() -> Vec<Task> {
    vec![douban_book(), douban_group()]
}

/// Builds a registry holding every built-in task
pub fn registry() -> TaskRegistry {
    builtin()
        .into_iter()
        .fold(TaskRegistry::new(), |registry, task| registry.with(task))
}
