use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use crate::state::ItemStateTracker;
use crate::types::{CommitAck, EditionId, JobId, JobState, JobStatus, ReferenceId, SiteId};

/// Shared handle to a running publishing job.
///
/// The job's run loop owns the state machine, but dispatch workers and the
/// publisher service observe and poke the same job concurrently: status
/// updates land in the tracker, cancellation is requested from outside,
/// and the commit acknowledgment arrives from a dispatch worker. All of
/// that shared state lives behind this handle.
#[derive(Debug, Clone)]
pub struct JobHandle {
    inner: Arc<JobHandleInner>,
}

#[derive(Debug)]
struct JobHandleInner {
    job_id: JobId,
    edition_id: EditionId,
    site_id: SiteId,
    started_at: DateTime<Utc>,
    /// Monotonic reference point for the heartbeat clocks.
    epoch: Instant,
    state_tx: watch::Sender<JobState>,
    tracker: ItemStateTracker,
    next_reference_id: AtomicU64,
    canceled: AtomicBool,
    canceled_by_user: AtomicBool,
    datasource_blocked: AtomicBool,
    task_failed: AtomicBool,
    job_error: Mutex<Option<String>>,
    commit_tx: watch::Sender<Option<CommitAck>>,
    /// Milliseconds since `epoch` of the last inbound message observed for
    /// this job by any dispatch worker.
    last_heartbeat_ms: AtomicU64,
    /// Milliseconds since `epoch` of the last item status update.
    last_status_ms: AtomicU64,
    current_content_list: Mutex<Option<String>>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
}

impl JobHandle {
    pub fn new(job_id: JobId, edition_id: EditionId, site_id: SiteId) -> Self {
        let (state_tx, _) = watch::channel(JobState::Initial);
        let (commit_tx, _) = watch::channel(None);

        Self {
            inner: Arc::new(JobHandleInner {
                job_id,
                edition_id,
                site_id,
                started_at: Utc::now(),
                epoch: Instant::now(),
                state_tx,
                tracker: ItemStateTracker::new(),
                next_reference_id: AtomicU64::new(0),
                canceled: AtomicBool::new(false),
                canceled_by_user: AtomicBool::new(false),
                datasource_blocked: AtomicBool::new(false),
                task_failed: AtomicBool::new(false),
                job_error: Mutex::new(None),
                commit_tx,
                last_heartbeat_ms: AtomicU64::new(0),
                last_status_ms: AtomicU64::new(0),
                current_content_list: Mutex::new(None),
                ended_at: Mutex::new(None),
            }),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.inner.job_id
    }

    pub fn edition_id(&self) -> EditionId {
        self.inner.edition_id
    }

    pub fn site_id(&self) -> SiteId {
        self.inner.site_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.ended_at.lock().unwrap()
    }

    pub fn state(&self) -> JobState {
        *self.inner.state_tx.borrow()
    }

    pub(crate) fn set_state(&self, state: JobState) {
        debug!(job_id = self.inner.job_id, state = %state, "job state transition");
        self.inner.state_tx.send_replace(state);
    }

    /// A receiver observing every state transition, used by tests and
    /// monitoring.
    pub fn watch_state(&self) -> watch::Receiver<JobState> {
        self.inner.state_tx.subscribe()
    }

    pub fn tracker(&self) -> &ItemStateTracker {
        &self.inner.tracker
    }

    /// Mints the next reference id for this job.
    pub fn mint_reference_id(&self) -> ReferenceId {
        self.inner.next_reference_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Requests cancellation of the job.
    ///
    /// The first request wins: a job canceled by the system stays a system
    /// cancellation even if a user cancels afterwards, and a job is never
    /// un-canceled. Returns `true` when this call performed the
    /// transition.
    pub fn request_cancel(&self, by_user: bool) -> bool {
        let transitioned = self
            .inner
            .canceled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if transitioned && by_user {
            self.inner.canceled_by_user.store(true, Ordering::Release);
        }

        transitioned
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    pub fn canceled_by_user(&self) -> bool {
        self.inner.canceled_by_user.load(Ordering::Acquire)
    }

    pub(crate) fn mark_datasource_blocked(&self) {
        self.inner.datasource_blocked.store(true, Ordering::Release);
    }

    pub fn datasource_blocked(&self) -> bool {
        self.inner.datasource_blocked.load(Ordering::Acquire)
    }

    pub(crate) fn mark_task_failed(&self) {
        self.inner.task_failed.store(true, Ordering::Release);
    }

    pub fn task_failed(&self) -> bool {
        self.inner.task_failed.load(Ordering::Acquire)
    }

    /// Records a job-level error message. The first recorded message is
    /// kept; later ones are dropped so the root cause stays visible.
    pub(crate) fn record_job_error(&self, message: impl ToString) {
        let mut error = self.inner.job_error.lock().unwrap();
        if error.is_none() {
            *error = Some(message.to_string());
        }
    }

    pub fn job_error(&self) -> Option<String> {
        self.inner.job_error.lock().unwrap().clone()
    }

    /// Marks this job as alive: some message concerning it was observed by
    /// a dispatch worker.
    pub fn touch_heartbeat(&self) {
        let elapsed = self.inner.epoch.elapsed().as_millis() as u64;
        self.inner.last_heartbeat_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Marks an item status update. Also counts as a heartbeat.
    pub fn touch_status(&self) {
        let elapsed = self.inner.epoch.elapsed().as_millis() as u64;
        self.inner.last_status_ms.store(elapsed, Ordering::Relaxed);
        self.inner.last_heartbeat_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Resets both timeout clocks, called when the job enters its working
    /// state.
    pub(crate) fn reset_clocks(&self) {
        self.touch_status();
    }

    pub fn heartbeat_elapsed(&self) -> Duration {
        self.elapsed_since(self.inner.last_heartbeat_ms.load(Ordering::Relaxed))
    }

    pub fn status_elapsed(&self) -> Duration {
        self.elapsed_since(self.inner.last_status_ms.load(Ordering::Relaxed))
    }

    fn elapsed_since(&self, mark_ms: u64) -> Duration {
        let now_ms = self.inner.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now_ms.saturating_sub(mark_ms))
    }

    /// Delivers the commit acknowledgment to the waiting job.
    pub fn resolve_commit(&self, ack: CommitAck) {
        self.inner.commit_tx.send_replace(Some(ack));
    }

    /// Blocks until the commit acknowledgment arrives or the ceiling
    /// elapses. Returns [`None`] on timeout.
    pub(crate) async fn wait_for_commit(&self, ceiling: Duration) -> Option<CommitAck> {
        let mut rx = self.inner.commit_tx.subscribe();

        let result = tokio::time::timeout(ceiling, rx.wait_for(|ack| ack.is_some())).await;
        match result {
            Ok(Ok(ack)) => ack.clone(),
            // The sender can never be dropped while the handle is alive,
            // so a closed channel is equivalent to a timeout.
            Ok(Err(_)) | Err(_) => None,
        }
    }

    pub(crate) fn set_current_content_list(&self, name: Option<String>) {
        *self.inner.current_content_list.lock().unwrap() = name;
    }

    /// Stamps the job's end time, once.
    pub(crate) fn finish(&self) {
        let mut ended = self.inner.ended_at.lock().unwrap();
        if ended.is_none() {
            *ended = Some(Utc::now());
        }
    }

    /// Point-in-time snapshot for status queries.
    pub fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.inner.job_id,
            edition_id: self.inner.edition_id,
            state: self.state(),
            started_at: self.inner.started_at,
            ended_at: self.ended_at(),
            current_content_list: self.inner.current_content_list.lock().unwrap().clone(),
            items: self.inner.tracker.snapshot(),
            message: self.job_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent_and_never_unsets() {
        let handle = JobHandle::new(1, 1, 1);
        assert!(handle.request_cancel(true));
        assert!(!handle.request_cancel(true));
        assert!(!handle.request_cancel(false));
        assert!(handle.is_canceled());
        assert!(handle.canceled_by_user());
    }

    #[test]
    fn system_cancel_wins_over_later_user_cancel() {
        let handle = JobHandle::new(1, 1, 1);
        assert!(handle.request_cancel(false));
        assert!(!handle.request_cancel(true));
        assert!(!handle.canceled_by_user());
    }

    #[test]
    fn reference_ids_are_unique_and_sequential() {
        let handle = JobHandle::new(1, 1, 1);
        assert_eq!(handle.mint_reference_id(), 1);
        assert_eq!(handle.mint_reference_id(), 2);
        assert_eq!(handle.mint_reference_id(), 3);
    }

    #[tokio::test]
    async fn commit_ack_unblocks_waiter() {
        let handle = JobHandle::new(1, 1, 1);

        let waiter = handle.clone();
        let wait = tokio::spawn(async move {
            waiter.wait_for_commit(Duration::from_secs(5)).await
        });

        handle.resolve_commit(CommitAck { error: None });
        let ack = wait.await.unwrap();
        assert_eq!(ack, Some(CommitAck { error: None }));
    }

    #[tokio::test]
    async fn commit_wait_times_out() {
        let handle = JobHandle::new(1, 1, 1);
        let ack = handle.wait_for_commit(Duration::from_millis(20)).await;
        assert!(ack.is_none());
    }

    #[test]
    fn first_job_error_is_kept() {
        let handle = JobHandle::new(1, 1, 1);
        handle.record_job_error("first");
        handle.record_job_error("second");
        assert_eq!(handle.job_error().as_deref(), Some("first"));
    }
}
