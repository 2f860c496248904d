use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{ErrorKind, PublishResult};
use crate::publish_error;

/// Internal state for [`DispatchWorkerPool`].
#[derive(Debug)]
struct PoolInner {
    /// Owns all spawned worker tasks.
    join_set: JoinSet<(usize, PublishResult<()>)>,
}

/// Pool owning the dispatch worker tasks.
///
/// Workers are spawned once at service start and drain the shared
/// transport until shutdown. If any worker fails, the errors are
/// collected and returned together from [`DispatchWorkerPool::wait_all`].
#[derive(Debug, Clone)]
pub struct DispatchWorkerPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl DispatchWorkerPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                join_set: JoinSet::new(),
            })),
        }
    }

    /// Spawns a worker future into the pool.
    pub async fn spawn<F>(&self, worker_id: usize, future: F)
    where
        F: Future<Output = PublishResult<()>> + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        inner.join_set.spawn(async move {
            let result = future.await;
            (worker_id, result)
        });

        debug!(worker_id, "spawned dispatch worker in pool");
    }

    /// Waits for all dispatch workers to complete.
    ///
    /// Blocks until every worker has finished. Worker errors and panics
    /// are collected and returned aggregated.
    pub async fn wait_all(&self) -> PublishResult<()> {
        let mut errors = Vec::new();

        loop {
            let result = {
                let mut inner = self.inner.lock().await;
                inner.join_set.join_next().await
            };

            let Some(result) = result else {
                // JoinSet is empty, all workers have completed.
                break;
            };

            match result {
                Ok((worker_id, worker_result)) => {
                    if let Err(err) = worker_result {
                        error!(worker_id, error = %err, "dispatch worker completed with error");
                        errors.push(err);
                    }
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("dispatch worker task was cancelled");
                    } else {
                        errors.push(publish_error!(
                            ErrorKind::DispatchWorkerPanic,
                            "Dispatch worker panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

impl Default for DispatchWorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
