//! Dispatch workers and their supporting machinery.

pub mod base;
pub mod cancel;
pub mod dispatch;
pub mod pagination;
pub mod pool;

pub use base::{Worker, WorkerHandle};
pub use cancel::CancellationList;
pub use dispatch::DispatchWorker;
pub use pool::DispatchWorkerPool;
