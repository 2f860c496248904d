use std::future::Future;

use crate::catalog::Site;
use crate::error::PublishResult;
use crate::types::{JobId, ReferenceId, ServerId, WorkItem};

/// Outcome of delivering one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        /// Location the artifact was written to or removed from.
        location: String,
    },
    Failed {
        message: String,
    },
}

/// Per-item delivery result, correlated back to the job by reference id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub reference_id: ReferenceId,
    pub outcome: DeliveryOutcome,
}

/// Per-delivery-type behavior flags.
///
/// Which delivery types need re-assembly during unpublish, tolerate an
/// empty location, or need a connectivity pre-flight is determined by an
/// external registry; the engine treats it as an injectable predicate.
pub trait DeliveryPolicy: Send + Sync {
    /// Whether unpublishing through this delivery type requires the item
    /// to be re-assembled first.
    fn unpublish_requires_assembly(&self, delivery_type: &str) -> bool;

    /// Whether an item with an empty delivery location is acceptable to
    /// this delivery type.
    fn allows_empty_location(&self, delivery_type: &str) -> bool;

    /// Whether destinations of this delivery type need a connectivity
    /// check before a job starts.
    fn requires_preflight(&self, delivery_type: &str) -> bool;
}

/// Conservative default policy: unpublish never re-assembles, empty
/// locations are never allowed, and push-style destinations are checked
/// before a job starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDeliveryPolicy;

impl DeliveryPolicy for DefaultDeliveryPolicy {
    fn unpublish_requires_assembly(&self, _delivery_type: &str) -> bool {
        false
    }

    fn allows_empty_location(&self, _delivery_type: &str) -> bool {
        false
    }

    fn requires_preflight(&self, delivery_type: &str) -> bool {
        matches!(delivery_type, "ftp" | "sftp")
    }
}

/// Trait for the delivery layer.
///
/// Deliveries accumulate per job and become final when the job commits;
/// a canceled job's pending deliveries are rolled back instead.
pub trait DeliveryManager {
    /// Initializes the delivery destination context for a job.
    fn init(
        &self,
        job_id: JobId,
        site: &Site,
        server_id: Option<ServerId>,
    ) -> impl Future<Output = PublishResult<()>> + Send;

    /// Delivers or removes one item. Both success and failure are
    /// reported through the returned result; an `Err` means the delivery
    /// layer itself is broken.
    fn process(&self, item: &WorkItem) -> impl Future<Output = PublishResult<DeliveryResult>> + Send;

    /// Commits all pending deliveries for a job, returning the results
    /// finalized at commit time.
    fn commit(&self, job_id: JobId)
    -> impl Future<Output = PublishResult<Vec<DeliveryResult>>> + Send;

    /// Discards pending, not-yet-committed work for a job.
    fn rollback(&self, job_id: JobId) -> impl Future<Output = PublishResult<()>> + Send;

    /// Connectivity check for push-style destinations, run before a job
    /// starts.
    fn preflight(
        &self,
        site: &Site,
        server_id: Option<ServerId>,
    ) -> impl Future<Output = PublishResult<()>> + Send;
}
