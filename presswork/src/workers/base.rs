use std::future::Future;

use crate::error::PublishResult;

/// Trait for background workers in the publishing engine.
///
/// Workers return handles that can be used to monitor their progress and
/// wait for completion.
pub trait Worker<H>
where
    H: WorkerHandle,
{
    /// Starts the worker and returns a handle for monitoring its
    /// execution.
    ///
    /// This method begins background processing and returns immediately
    /// with a handle that can be used to wait for completion.
    fn start(self) -> impl Future<Output = PublishResult<H>> + Send;
}

/// Handle for monitoring a running worker.
pub trait WorkerHandle {
    /// Waits for the worker to complete and returns the final result.
    ///
    /// The handle is consumed by this operation.
    fn wait(self) -> impl Future<Output = PublishResult<()>> + Send;
}
