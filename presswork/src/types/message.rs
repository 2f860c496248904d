use crate::catalog::Site;
use crate::types::{JobId, ServerId, WorkItem};

/// Send priority for transport messages.
///
/// Cancellations and operator alerts ride ahead of queued work so that a
/// long backlog of items never delays acting on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

/// Everything that travels over the publishing transport.
///
/// Dispatch workers match exhaustively over this enum; adding a variant is
/// a compile-time prompt to handle it everywhere.
#[derive(Debug, Clone)]
pub enum PublishMessage {
    /// Stop processing work for a job and roll back its pending deliveries.
    Cancel(CancelMessage),
    /// Job lifecycle control for the delivery layer.
    JobControl(JobControlMessage),
    /// One unit of publish/unpublish work.
    Work(Box<WorkItem>),
    /// Operator-facing notification; logged by whichever worker receives
    /// it.
    Alert(AlertMessage),
}

/// Broadcast when a job is canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelMessage {
    pub job_id: JobId,
    /// Whether a user requested the cancellation, as opposed to the system
    /// canceling on error or timeout.
    pub by_user: bool,
}

/// Job lifecycle control messages consumed by the delivery side.
#[derive(Debug, Clone)]
pub enum JobControlMessage {
    /// Initialize the delivery destination context for a job.
    ///
    /// Carries the site definition so the delivery side needs no catalog
    /// of its own.
    Start {
        job_id: JobId,
        site: Site,
        server_id: Option<ServerId>,
    },
    /// Commit all pending deliveries for a job and acknowledge back to it.
    End { job_id: JobId },
}

impl JobControlMessage {
    pub fn job_id(&self) -> JobId {
        match self {
            JobControlMessage::Start { job_id, .. } => *job_id,
            JobControlMessage::End { job_id } => *job_id,
        }
    }
}

/// High-priority notification for operators, e.g. when the datasource
/// configuration is found to be broken mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub job_id: JobId,
    pub message: String,
}

impl PublishMessage {
    /// The job this message concerns.
    pub fn job_id(&self) -> JobId {
        match self {
            PublishMessage::Cancel(cancel) => cancel.job_id,
            PublishMessage::JobControl(control) => control.job_id(),
            PublishMessage::Work(item) => item.job_id,
            PublishMessage::Alert(alert) => alert.job_id,
        }
    }
}
