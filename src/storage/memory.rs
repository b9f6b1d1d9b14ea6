use crate::storage::traits::{Storage, StorageResult};
use crate::storage::Item;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Keeps every saved item in memory
///
/// Used by tests and by dry runs that should not touch a database.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<Vec<Item>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Item>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of everything saved so far, in save order
    pub fn items(&self) -> Vec<Item> {
        self.lock().clone()
    }

    /// Returns the items produced by one task
    pub fn items_for(&self, task: &str) -> Vec<Item> {
        self.lock()
            .iter()
            .filter(|item| item.task == task)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn save(&self, items: &[Item]) -> StorageResult<()> {
        self.lock().extend_from_slice(items);
        Ok(())
    }
}
