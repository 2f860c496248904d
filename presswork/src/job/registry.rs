use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, PublishResult};
use crate::job::handle::JobHandle;
use crate::types::{EditionId, JobId};

/// The set of jobs the publisher service knows about.
///
/// An explicit object rather than a process-wide map; its lifecycle is
/// tied to the service that owns it. Shared with dispatch workers, which
/// resolve job ids to handles when reporting status.
///
/// The registry lock must never be held while acquiring the demand-queue
/// lock: the demand monitor reads both, in the opposite order, and the
/// queues are deliberately independent.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<JobId, JobHandle>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job, rejecting the registration when another job for
    /// the same edition is still live.
    ///
    /// The check and the insertion are one critical section so two
    /// concurrent starts for the same edition cannot both succeed.
    pub fn try_register(&self, handle: JobHandle) -> PublishResult<()> {
        let mut jobs = self.inner.write().unwrap();

        let conflict = jobs
            .values()
            .find(|job| job.edition_id() == handle.edition_id() && !job.state().is_terminal())
            .map(|running| {
                format!(
                    "edition {} already has job {} in state {}",
                    handle.edition_id(),
                    running.job_id(),
                    running.state()
                )
            });
        if let Some(detail) = conflict {
            drop(jobs);
            bail!(
                ErrorKind::EditionAlreadyRunning,
                "Edition already has a running job",
                detail
            );
        }

        jobs.insert(handle.job_id(), handle);

        Ok(())
    }

    pub fn get(&self, job_id: JobId) -> Option<JobHandle> {
        self.inner.read().unwrap().get(&job_id).cloned()
    }

    /// The live (non-terminal) job for an edition, if any.
    pub fn active_for_edition(&self, edition_id: EditionId) -> Option<JobHandle> {
        self.inner
            .read()
            .unwrap()
            .values()
            .find(|job| job.edition_id() == edition_id && !job.state().is_terminal())
            .cloned()
    }

    /// Snapshot of all registered job handles.
    pub fn all(&self) -> Vec<JobHandle> {
        self.inner.read().unwrap().values().cloned().collect()
    }

    /// Drops jobs whose end time is older than the retention window.
    /// Returns the number of jobs removed.
    pub fn reap(&self, retention: Duration) -> usize {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());

        let mut jobs = self.inner.write().unwrap();
        let before = jobs.len();
        jobs.retain(|job_id, job| {
            let keep = match job.ended_at() {
                Some(ended_at) => ended_at > cutoff,
                None => true,
            };
            if !keep {
                debug!(job_id, "reaping completed job from registry");
            }
            keep
        });

        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobState;

    #[test]
    fn rejects_second_job_for_same_edition() {
        let registry = JobRegistry::new();
        registry.try_register(JobHandle::new(1, 7, 1)).unwrap();

        let err = registry.try_register(JobHandle::new(2, 7, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EditionAlreadyRunning);
    }

    #[test]
    fn allows_new_job_once_previous_is_terminal() {
        let registry = JobRegistry::new();
        let first = JobHandle::new(1, 7, 1);
        registry.try_register(first.clone()).unwrap();

        first.set_state(JobState::Completed);
        registry.try_register(JobHandle::new(2, 7, 1)).unwrap();
    }

    #[test]
    fn reap_drops_only_old_completed_jobs() {
        let registry = JobRegistry::new();
        let done = JobHandle::new(1, 7, 1);
        done.set_state(JobState::Completed);
        done.finish();
        registry.try_register(done).unwrap();

        let live = JobHandle::new(2, 8, 1);
        registry.try_register(live).unwrap();

        // Zero retention: anything with an end time is reaped.
        let reaped = registry.reap(Duration::from_millis(0));
        assert_eq!(reaped, 1);
        assert!(registry.get(1).is_none());
        assert!(registry.get(2).is_some());
    }
}
