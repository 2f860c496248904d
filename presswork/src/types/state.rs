use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one work item within a job.
///
/// [`ItemState::Delivered`], [`ItemState::Failed`] and
/// [`ItemState::Cancelled`] are terminal: once an item reaches one of them,
/// further updates for its reference id are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ItemState {
    /// Queued for dispatch, not yet picked up by a worker.
    Queued = 0,
    /// Assembly produced a result for the item.
    Assembled = 1,
    /// Template metadata attached, ready for the delivery handler.
    PreparedForDelivery = 2,
    /// Handed to the delivery layer, awaiting its outcome.
    DeliveryQueued = 3,
    Delivered = 4,
    Failed = 5,
    /// The item expanded into per-page work items; the original reference
    /// id continues its life as page 1.
    Paged = 6,
    Cancelled = 7,
}

impl ItemState {
    /// Number of distinct states, used to size per-state counter arrays.
    pub const COUNT: usize = 8;

    /// All states in discriminant order.
    pub const ALL: [ItemState; ItemState::COUNT] = [
        ItemState::Queued,
        ItemState::Assembled,
        ItemState::PreparedForDelivery,
        ItemState::DeliveryQueued,
        ItemState::Delivered,
        ItemState::Failed,
        ItemState::Paged,
        ItemState::Cancelled,
    ];

    /// Reconstructs a state from its discriminant.
    ///
    /// Values only ever come from [`ItemState`] stored in an atomic cell,
    /// so an out-of-range discriminant is unreachable.
    pub(crate) fn from_u8(value: u8) -> ItemState {
        ItemState::ALL[value as usize]
    }

    /// Returns `true` if no further updates are accepted for an item in
    /// this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemState::Delivered | ItemState::Failed | ItemState::Cancelled
        )
    }

    /// Returns `true` if an item in this state still requires forward
    /// processing and must keep its job in the working state.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            ItemState::Queued | ItemState::Assembled | ItemState::Paged
        )
    }

    pub fn as_static_str(&self) -> &'static str {
        match self {
            ItemState::Queued => "queued",
            ItemState::Assembled => "assembled",
            ItemState::PreparedForDelivery => "prepared_for_delivery",
            ItemState::DeliveryQueued => "delivery_queued",
            ItemState::Delivered => "delivered",
            ItemState::Failed => "failed",
            ItemState::Paged => "paged",
            ItemState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_static_str())
    }
}

/// State of a publishing job.
///
/// Normal progress is `Initial → PreTasks → Queueing → Working →
/// Committing → PostTasks` followed by one of the terminal states; early
/// exits to a terminal state happen on abort, cancellation or a datasource
/// misconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Initial,
    PreTasks,
    Queueing,
    Working,
    Committing,
    PostTasks,
    Completed,
    /// The job ran to the end but at least one item, task or job-level
    /// error was recorded.
    CompletedWithFailure,
    /// Canceled at a user's request.
    Cancelled,
    /// Canceled by the system (job-level error or timeout).
    Aborted,
    /// The configured datasource disappeared mid-run; the job cannot be
    /// restarted until an operator fixes the server configuration.
    DatasourceMisconfigured,
}

impl JobState {
    /// Returns `true` once the job can no longer make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed
                | JobState::CompletedWithFailure
                | JobState::Cancelled
                | JobState::Aborted
                | JobState::DatasourceMisconfigured
        )
    }

    pub fn as_static_str(&self) -> &'static str {
        match self {
            JobState::Initial => "initial",
            JobState::PreTasks => "pre_tasks",
            JobState::Queueing => "queueing",
            JobState::Working => "working",
            JobState::Committing => "committing",
            JobState::PostTasks => "post_tasks",
            JobState::Completed => "completed",
            JobState::CompletedWithFailure => "completed_with_failure",
            JobState::Cancelled => "cancelled",
            JobState::Aborted => "aborted",
            JobState::DatasourceMisconfigured => "datasource_misconfigured",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_static_str())
    }
}
