//! Edition task plugins and the pre/post task runner.
//!
//! Editions carry externally provided tasks that run before and after the
//! publishing pass. Tasks with a negative sequence are pre-tasks, tasks
//! with a non-negative sequence are post-tasks; both groups run in
//! ascending sequence order. Each task declares whether a failure is fatal
//! to the job or only logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bail;
use crate::catalog::{Edition, Site};
use crate::error::{ErrorKind, PublishResult};
use crate::store::StatusStore;
use crate::types::{ItemStatus, JobId};

/// Read access to per-item publish results, handed to post-tasks.
#[async_trait]
pub trait StatusCallback: Send + Sync {
    /// All item statuses recorded for the job so far.
    async fn item_statuses(&self) -> PublishResult<Vec<ItemStatus>>;
}

/// Status callback backed by the job's status store.
pub struct StoredStatusCallback<S> {
    store: S,
    job_id: JobId,
}

impl<S> StoredStatusCallback<S> {
    pub fn new(store: S, job_id: JobId) -> Self {
        Self { store, job_id }
    }
}

#[async_trait]
impl<S> StatusCallback for StoredStatusCallback<S>
where
    S: StatusStore + Send + Sync,
{
    async fn item_statuses(&self) -> PublishResult<Vec<ItemStatus>> {
        self.store.statuses_for_job(self.job_id).await
    }
}

/// Everything a task is given when it runs.
pub struct TaskContext<'a> {
    pub edition: &'a Edition,
    pub site: &'a Site,
    pub job_id: JobId,
    pub started_at: DateTime<Utc>,
    /// End time of the publishing pass; [`None`] for pre-tasks.
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    /// Whether the pass completed without job, task or item failures so
    /// far. Always `true` for pre-tasks.
    pub succeeded: bool,
    /// Task parameters from the edition configuration.
    pub parameters: &'a HashMap<String, String>,
    /// Per-item publish results; only available to post-tasks.
    pub status: Option<&'a dyn StatusCallback>,
}

/// An externally loaded edition task extension.
///
/// Object-safe because tasks are provided by embedders and stored as trait
/// objects on the edition configuration.
#[async_trait]
pub trait EditionTask: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Execution order. Negative runs before the publishing pass,
    /// non-negative after it.
    fn sequence(&self) -> i32;

    /// When `true`, a failure of this task is logged and the job
    /// proceeds; when `false`, the failure is fatal.
    fn continue_on_failure(&self) -> bool;

    async fn perform(&self, ctx: &TaskContext<'_>) -> PublishResult<()>;
}

/// Runs all pre-tasks (negative sequence) in ascending sequence order.
///
/// A failing task marked continue-on-failure is logged and counted;
/// any other failure aborts the job synchronously.
///
/// Returns `true` when at least one tolerated failure occurred.
pub async fn run_pre_tasks(
    tasks: &[Arc<dyn EditionTask>],
    ctx: &TaskContext<'_>,
) -> PublishResult<bool> {
    let mut failed = false;

    for task in in_sequence(tasks, |sequence| sequence < 0) {
        info!(task = task.name(), sequence = task.sequence(), "running pre task");

        if let Err(err) = task.perform(ctx).await {
            if !task.continue_on_failure() {
                bail!(
                    ErrorKind::TaskFailed,
                    "Pre task failed",
                    format!("task '{}' failed: {}", task.name(), err)
                );
            }

            warn!(
                task = task.name(),
                error = %err,
                "pre task failed, continuing"
            );
            failed = true;
        }
    }

    Ok(failed)
}

/// Runs all post-tasks (non-negative sequence) in ascending sequence
/// order.
///
/// A hard failure in a task not marked continue-on-failure stops the
/// remaining post-tasks but does not re-open the publishing pass.
///
/// Returns `true` when any task failed.
pub async fn run_post_tasks(tasks: &[Arc<dyn EditionTask>], ctx: &TaskContext<'_>) -> bool {
    let mut failed = false;

    for task in in_sequence(tasks, |sequence| sequence >= 0) {
        info!(task = task.name(), sequence = task.sequence(), "running post task");

        if let Err(err) = task.perform(ctx).await {
            failed = true;

            if !task.continue_on_failure() {
                warn!(
                    task = task.name(),
                    error = %err,
                    "post task failed, skipping remaining post tasks"
                );
                break;
            }

            warn!(
                task = task.name(),
                error = %err,
                "post task failed, continuing"
            );
        }
    }

    failed
}

/// Filters and sorts tasks by ascending sequence.
fn in_sequence(
    tasks: &[Arc<dyn EditionTask>],
    filter: impl Fn(i32) -> bool,
) -> Vec<&Arc<dyn EditionTask>> {
    let mut selected: Vec<_> = tasks
        .iter()
        .filter(|task| filter(task.sequence()))
        .collect();
    selected.sort_by_key(|task| task.sequence());
    selected
}
