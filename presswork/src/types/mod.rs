//! Core data types flowing through the publishing pipeline.

mod item;
mod message;
mod state;
mod status;

pub use item::{ItemResult, Operation, SiteItemKey, SiteItemRecord, WorkItem};
pub use message::{AlertMessage, CancelMessage, JobControlMessage, Priority, PublishMessage};
pub use state::{ItemState, JobState};
pub use status::{CommitAck, ItemStatus, JobStatus};

/// Identifier of a publishing job, globally unique and sequentially
/// assigned by the publisher service.
pub type JobId = u64;

/// Identifier correlating one work-item instance to its status history
/// within a job.
pub type ReferenceId = u64;

/// Identifier of a content item in the repository.
pub type ContentId = u64;

/// Identifier of an assembly template.
pub type TemplateId = u64;

/// Identifier of a folder. Negative values in previously-published records
/// mean the folder was moved since the last publish.
pub type FolderId = i64;

/// Identifier of a site.
pub type SiteId = u64;

/// Identifier of a publishing server.
pub type ServerId = u64;

/// Identifier of an edition.
pub type EditionId = u64;

/// Identifier of a content list.
pub type ContentListId = u64;
