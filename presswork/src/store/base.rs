use std::future::Future;

use crate::error::PublishResult;
use crate::types::{ContentId, ItemStatus, JobId, ServerId, SiteId, SiteItemKey, SiteItemRecord};

/// Which destination scope previously-published records are looked up
/// under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishScope {
    Site(SiteId),
    Server(ServerId),
}

/// Trait for persisting per-item status history.
///
/// Statuses are written in bounded batches by the status batcher, not row
/// by row, to bound write amplification.
pub trait StatusStore {
    /// Persists a batch of status rows.
    fn persist(&self, statuses: Vec<ItemStatus>) -> impl Future<Output = PublishResult<()>> + Send;

    /// All status rows recorded for a job, for archival, reporting and
    /// post-task callbacks.
    fn statuses_for_job(
        &self,
        job_id: JobId,
    ) -> impl Future<Output = PublishResult<Vec<ItemStatus>>> + Send;
}

/// Trait for the durable record of previously published artifacts.
pub trait SiteItemStore {
    /// Records of a content item previously published under the given
    /// scope and delivery context.
    fn published_records(
        &self,
        content_id: ContentId,
        scope: PublishScope,
        delivery_context: i32,
    ) -> impl Future<Output = PublishResult<Vec<SiteItemRecord>>> + Send;

    /// Upserts the record of a delivered artifact, keyed by its site-item
    /// key.
    fn record_published(
        &self,
        record: SiteItemRecord,
    ) -> impl Future<Output = PublishResult<()>> + Send;

    /// Removes the record of an unpublished artifact.
    fn record_unpublished(
        &self,
        key: &SiteItemKey,
    ) -> impl Future<Output = PublishResult<()>> + Send;
}
