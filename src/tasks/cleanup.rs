//! GC Sweep Task
//!
//! Background task that periodically evicts idle cache entries past their
//! `gc_time`. Per-key timers normally handle eviction; the sweep catches
//! entries whose timer could not be armed.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::query::QueryClient;

/// Spawns a background task that periodically collects idle cache entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let sweep = spawn_gc_task(client.clone(), 30);
/// // Later, during shutdown:
/// sweep.abort();
/// ```
pub fn spawn_gc_task(client: QueryClient, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!("Starting GC sweep task with interval of {} seconds", interval.as_secs());

        loop {
            tokio::time::sleep(interval).await;

            let removed = client.collect_garbage();
            if removed > 0 {
                info!("GC sweep: evicted {} idle queries", removed);
            } else {
                debug!("GC sweep: no idle queries past gc time");
            }
        }
    })
}
