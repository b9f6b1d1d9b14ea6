//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::Item;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The result sink calls `save` with items from many tasks interleaved, so
/// implementations must route each item by its own task and rule.
pub trait Storage: Send + Sync {
    /// Accepts a batch of items; backends may buffer them
    fn save(&self, items: &[Item]) -> StorageResult<()>;

    /// Writes out anything buffered
    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}
