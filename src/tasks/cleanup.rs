//! Expiry Cleanup Task
//!
//! Background task that periodically removes entries past their max age.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheManager;

/// Spawns a background task that periodically calls [`CacheManager::cleanup`].
///
/// The task holds only a weak handle to the manager and exits on its own once
/// every clone of the manager has been dropped.
///
/// # Arguments
/// * `manager` - The cache to sweep
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let manager: CacheManager<serde_json::Value> = CacheManager::default();
/// let cleanup_handle = spawn_cleanup_task(&manager, Duration::from_secs(60));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<T>(manager: &CacheManager<T>, interval: Duration) -> JoinHandle<()>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    let weak = manager.downgrade();
    let interval = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        info!("Starting expiry cleanup task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let Some(manager) = weak.upgrade() else {
                debug!("Cache manager dropped, stopping cleanup task");
                break;
            };

            let removed = manager.cleanup();
            if removed > 0 {
                info!("Expiry cleanup: removed {} expired entries", removed);
            } else {
                debug!("Expiry cleanup: no expired entries found");
            }
        }
    })
}
