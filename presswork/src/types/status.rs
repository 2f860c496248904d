use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::TrackerSnapshot;
use crate::types::{ContentId, ItemState, JobId, JobState, Operation, ReferenceId};

/// One row of per-item status history, persisted in batches by the status
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStatus {
    pub job_id: JobId,
    pub reference_id: ReferenceId,
    pub content_id: ContentId,
    pub operation: Operation,
    pub state: ItemState,
    /// Delivered (or attempted) location, when known.
    pub location: Option<String>,
    /// Failure or diagnostic message.
    pub message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ItemStatus {
    /// Builds a status row for the current state of a work item.
    pub fn of_item(item: &crate::types::WorkItem, state: ItemState) -> Self {
        Self {
            job_id: item.job_id,
            reference_id: item.reference_id,
            content_id: item.content_id,
            operation: item.operation,
            state,
            location: (!item.delivery_path.is_empty()).then(|| item.delivery_path.clone()),
            message: None,
            recorded_at: Utc::now(),
        }
    }

    /// Attaches a diagnostic message.
    pub fn with_message(mut self, message: impl ToString) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

/// Acknowledgment of the job-end commit from the delivery side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitAck {
    /// Error text when the commit failed.
    pub error: Option<String>,
}

/// Point-in-time snapshot of a job, queryable at any time through the
/// publisher service.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub job_id: JobId,
    pub edition_id: crate::types::EditionId,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Content list currently being queued, when in the queueing state.
    pub current_content_list: Option<String>,
    /// Per-state item counts; best-effort consistent.
    pub items: TrackerSnapshot,
    /// Job-level error message, when one was recorded.
    pub message: Option<String>,
}
