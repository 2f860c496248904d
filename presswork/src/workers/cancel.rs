use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::types::JobId;

/// Shared, time-bounded list of canceled jobs.
///
/// Dispatch workers consult this before processing a work item so that
/// queued items of a canceled job are discarded instead of processed,
/// even while the queue is still draining. Entries expire after a
/// retention window; a completed job's id poses no risk of collision
/// because job ids are never reused.
#[derive(Debug, Clone)]
pub struct CancellationList {
    inner: Arc<Mutex<Vec<(JobId, Instant)>>>,
    ttl: Duration,
}

impl CancellationList {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
            ttl,
        }
    }

    /// Records a cancellation, purging expired entries.
    pub fn insert(&self, job_id: JobId) {
        let now = Instant::now();
        let mut entries = self.inner.lock().unwrap();
        entries.retain(|(entry_job, recorded)| {
            *entry_job != job_id && now.duration_since(*recorded) < self.ttl
        });
        entries.push((job_id, now));
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        let now = Instant::now();
        let entries = self.inner.lock().unwrap();
        entries
            .iter()
            .any(|(entry_job, recorded)| {
                *entry_job == job_id && now.duration_since(*recorded) < self.ttl
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_recent_cancellations() {
        let list = CancellationList::new(Duration::from_secs(60));
        list.insert(1);
        assert!(list.contains(1));
        assert!(!list.contains(2));
    }

    #[test]
    fn expired_entries_are_ignored_and_purged() {
        let list = CancellationList::new(Duration::from_millis(0));
        list.insert(1);
        assert!(!list.contains(1));

        // The next insert drops the expired entry.
        list.insert(2);
        assert_eq!(list.inner.lock().unwrap().len(), 1);
    }
}
