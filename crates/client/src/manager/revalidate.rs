//! Background refresh tasks of the stale-while-revalidate strategy.

use std::future::Future;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Set of in-flight background refreshes.
///
/// Tasks are fire-and-forget for the request that spawned them. Finished
/// tasks are reaped on every spawn; `settle` waits for the rest.
#[derive(Debug, Default)]
pub struct Revalidations {
    tasks: Mutex<JoinSet<()>>,
}

impl Revalidations {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background refresh task failed");
            }
        }
        tasks.spawn(task);
    }

    /// Wait for every pending refresh. Returns how many were awaited.
    pub async fn settle(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        let mut settled = 0;
        while let Some(result) = tasks.join_next().await {
            settled += 1;
            if let Err(e) = result {
                tracing::warn!(error = %e, "background refresh task failed");
            }
        }
        settled
    }
}
