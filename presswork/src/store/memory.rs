use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::PublishResult;
use crate::store::base::{PublishScope, SiteItemStore, StatusStore};
use crate::types::{ContentId, ItemStatus, JobId, SiteItemKey, SiteItemRecord};

/// Inner state of [`MemoryStore`].
#[derive(Debug, Default)]
struct Inner {
    /// Status history per job, in persistence order.
    statuses: HashMap<JobId, Vec<ItemStatus>>,
    /// Site-item records keyed by their value-equality key.
    site_items: HashMap<SiteItemKey, SiteItemRecord>,
    /// Number of persist batches accepted, for write-amplification
    /// assertions.
    persist_batches: usize,
    /// When set, site-item lookups fail as if the datasource vanished
    /// after a server reconfiguration.
    site_item_failure: Option<String>,
}

/// In-memory storage for status history and site-item records.
///
/// Implements both [`StatusStore`] and [`SiteItemStore`], providing a
/// complete storage solution for tests and development. All data is lost
/// on process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a previously-published record, as if an earlier job had
    /// delivered it.
    pub async fn seed_site_item(&self, record: SiteItemRecord) {
        let mut inner = self.inner.lock().await;
        inner.site_items.insert(record.key.clone(), record);
    }

    /// Number of persist batches accepted so far.
    pub async fn persist_batches(&self) -> usize {
        self.inner.lock().await.persist_batches
    }

    /// All site-item records currently stored, for assertions.
    pub async fn site_items(&self) -> Vec<SiteItemRecord> {
        self.inner.lock().await.site_items.values().cloned().collect()
    }

    /// Makes site-item lookups fail as if the configured datasource
    /// disappeared after a server reconfiguration.
    pub async fn fail_site_item_lookups(&self, message: impl ToString) {
        self.inner.lock().await.site_item_failure = Some(message.to_string());
    }
}

impl StatusStore for MemoryStore {
    async fn persist(&self, statuses: Vec<ItemStatus>) -> PublishResult<()> {
        if statuses.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        inner.persist_batches += 1;
        for status in statuses {
            inner.statuses.entry(status.job_id).or_default().push(status);
        }

        Ok(())
    }

    async fn statuses_for_job(&self, job_id: JobId) -> PublishResult<Vec<ItemStatus>> {
        let inner = self.inner.lock().await;
        Ok(inner.statuses.get(&job_id).cloned().unwrap_or_default())
    }
}

impl SiteItemStore for MemoryStore {
    async fn published_records(
        &self,
        content_id: ContentId,
        scope: PublishScope,
        delivery_context: i32,
    ) -> PublishResult<Vec<SiteItemRecord>> {
        let inner = self.inner.lock().await;

        if let Some(message) = &inner.site_item_failure {
            return Err(crate::publish_error!(
                crate::error::ErrorKind::DatasourceMisconfigured,
                "Publishing datasource is not available",
                message.clone()
            ));
        }

        Ok(inner
            .site_items
            .values()
            .filter(|record| record.key.content_id == content_id)
            .filter(|record| record.key.delivery_context == delivery_context)
            .filter(|record| match scope {
                PublishScope::Site(site_id) => record.key.site_id == site_id,
                PublishScope::Server(server_id) => record.server_id == Some(server_id),
            })
            .cloned()
            .collect())
    }

    async fn record_published(&self, record: SiteItemRecord) -> PublishResult<()> {
        let mut inner = self.inner.lock().await;
        inner.site_items.insert(record.key.clone(), record);
        Ok(())
    }

    async fn record_unpublished(&self, key: &SiteItemKey) -> PublishResult<()> {
        let mut inner = self.inner.lock().await;
        inner.site_items.remove(key);
        Ok(())
    }
}
