//! Result sink
//!
//! The single consumer of the workers' output channel. Items go to the storage bound
//! on their task, else to the engine's default storage, else to the log. Storage
//! calls block, so they run on the blocking thread pool.

use crate::crawler::stats::EngineStats;
use crate::crawler::Harvest;
use crate::storage::{Storage, StorageResult};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct ResultSink {
    default_storage: Option<Arc<dyn Storage>>,
    stats: Arc<EngineStats>,
}

impl ResultSink {
    pub fn new(default_storage: Option<Arc<dyn Storage>>, stats: Arc<EngineStats>) -> Self {
        Self {
            default_storage,
            stats,
        }
    }

    /// Consumes harvests until every sender is gone, then flushes each storage used
    pub async fn run(self, mut harvests: mpsc::Receiver<Harvest>) {
        let mut used: Vec<Arc<dyn Storage>> = Vec::new();

        while let Some(harvest) = harvests.recv().await {
            self.stats.harvests.fetch_add(1, Ordering::Relaxed);
            self.stats
                .items
                .fetch_add(harvest.items.len() as u64, Ordering::Relaxed);

            if harvest.items.is_empty() {
                continue;
            }

            let storage = harvest
                .task
                .storage
                .as_ref()
                .or(self.default_storage.as_ref());

            match storage {
                Some(storage) => {
                    if !used.iter().any(|s| same_storage(s, storage)) {
                        used.push(Arc::clone(storage));
                    }
                    let count = harvest.items.len();
                    let items = harvest.items;
                    let saved = run_blocking(storage, move |storage| storage.save(&items)).await;
                    if let Err(e) = saved {
                        tracing::error!(
                            url = %harvest.url,
                            task = %harvest.task.name(),
                            "Failed to save {} items: {}",
                            count,
                            e
                        );
                    }
                }
                None => {
                    for item in &harvest.items {
                        let data = serde_json::to_string(&item.data).unwrap_or_default();
                        tracing::info!(task = %item.task, url = %item.url, "Item: {}", data);
                    }
                }
            }
        }

        for storage in &used {
            if let Err(e) = run_blocking(storage, |storage| storage.flush()).await {
                tracing::error!("Failed to flush storage: {}", e);
            }
        }
        tracing::debug!("Result sink stopped");
    }
}

/// Runs a storage call on the blocking pool
async fn run_blocking<F>(storage: &Arc<dyn Storage>, call: F) -> Result<(), String>
where
    F: FnOnce(&dyn Storage) -> StorageResult<()> + Send + 'static,
{
    let storage = Arc::clone(storage);
    match tokio::task::spawn_blocking(move || call(storage.as_ref())).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("storage call panicked: {}", e)),
    }
}

fn same_storage(a: &Arc<dyn Storage>, b: &Arc<dyn Storage>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const u8,
        Arc::as_ptr(b) as *const u8,
    )
}
