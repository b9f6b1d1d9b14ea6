//! Storage module for persisting crawled items
//!
//! This module handles everything downstream of parsing:
//! - The `Item` record produced by parse rules
//! - The `Storage` trait the result sink writes through
//! - A batched SQLite backend with one table per task
//! - An in-memory backend for tests and dry runs

mod item;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use item::Item;
pub use memory::MemoryStorage;
pub use sqlite::{SqliteStorage, DEFAULT_BATCH_COUNT};
pub use traits::{Storage, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `batch_count` - Number of buffered items that triggers a write
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path, batch_count: usize) -> StorageResult<SqliteStorage> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteStorage::new(path, batch_count)
}
