use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::catalog::Site;
use crate::delivery::base::{DeliveryManager, DeliveryOutcome, DeliveryResult};
use crate::error::{ErrorKind, PublishResult};
use crate::publish_error;
use crate::types::{JobId, Operation, ServerId, SiteId, WorkItem};

/// One pending delivery operation, applied at commit time.
#[derive(Debug, Clone)]
struct PendingDelivery {
    result: DeliveryResult,
    operation: Operation,
    location: String,
    data: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    contexts: HashMap<JobId, (SiteId, Option<ServerId>)>,
    pending: HashMap<JobId, Vec<PendingDelivery>>,
    /// Committed artifacts by location; the in-memory stand-in for the
    /// destination filesystem.
    artifacts: HashMap<String, Vec<u8>>,
    rolled_back: HashSet<JobId>,
    fail_paths: HashMap<String, String>,
    preflight_failure: Option<String>,
}

/// In-memory delivery manager.
///
/// Accumulates deliveries per job and applies them to an in-memory
/// artifact map at commit. Tests can fail specific delivery paths and
/// simulate unreachable push destinations.
#[derive(Clone, Default)]
pub struct MemoryDeliveryManager {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDeliveryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes delivery to a specific path fail with the given message.
    pub async fn fail_path(&self, path: impl ToString, message: impl ToString) -> &Self {
        self.inner
            .lock()
            .await
            .fail_paths
            .insert(path.to_string(), message.to_string());
        self
    }

    /// Makes the pre-flight connectivity check fail.
    pub async fn fail_preflight(&self, message: impl ToString) -> &Self {
        self.inner.lock().await.preflight_failure = Some(message.to_string());
        self
    }

    /// Committed artifact locations, for assertions.
    pub async fn committed_locations(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut locations: Vec<_> = inner.artifacts.keys().cloned().collect();
        locations.sort();
        locations
    }

    /// Whether a rollback was requested for the job.
    pub async fn rolled_back(&self, job_id: JobId) -> bool {
        self.inner.lock().await.rolled_back.contains(&job_id)
    }

    /// Whether the destination context was initialized for the job.
    pub async fn initialized(&self, job_id: JobId) -> bool {
        self.inner.lock().await.contexts.contains_key(&job_id)
    }
}

impl DeliveryManager for MemoryDeliveryManager {
    async fn init(
        &self,
        job_id: JobId,
        site: &Site,
        server_id: Option<ServerId>,
    ) -> PublishResult<()> {
        self.inner
            .lock()
            .await
            .contexts
            .insert(job_id, (site.id, server_id));
        Ok(())
    }

    async fn process(&self, item: &WorkItem) -> PublishResult<DeliveryResult> {
        let mut inner = self.inner.lock().await;

        if let Some(message) = inner.fail_paths.get(&item.delivery_path).cloned() {
            return Ok(DeliveryResult {
                reference_id: item.reference_id,
                outcome: DeliveryOutcome::Failed { message },
            });
        }

        let result = DeliveryResult {
            reference_id: item.reference_id,
            outcome: DeliveryOutcome::Delivered {
                location: item.delivery_path.clone(),
            },
        };

        inner
            .pending
            .entry(item.job_id)
            .or_default()
            .push(PendingDelivery {
                result: result.clone(),
                operation: item.operation,
                location: item.delivery_path.clone(),
                data: item
                    .result
                    .as_ref()
                    .map(|result| result.data.clone())
                    .unwrap_or_default(),
            });

        Ok(result)
    }

    async fn commit(&self, job_id: JobId) -> PublishResult<Vec<DeliveryResult>> {
        let mut inner = self.inner.lock().await;

        let pending = inner.pending.remove(&job_id).unwrap_or_default();
        let mut results = Vec::with_capacity(pending.len());
        for delivery in pending {
            match delivery.operation {
                Operation::Publish => {
                    inner.artifacts.insert(delivery.location, delivery.data);
                }
                Operation::Unpublish => {
                    inner.artifacts.remove(&delivery.location);
                }
            }
            results.push(delivery.result);
        }

        Ok(results)
    }

    async fn rollback(&self, job_id: JobId) -> PublishResult<()> {
        let mut inner = self.inner.lock().await;
        inner.pending.remove(&job_id);
        inner.rolled_back.insert(job_id);
        Ok(())
    }

    async fn preflight(&self, site: &Site, _server_id: Option<ServerId>) -> PublishResult<()> {
        let inner = self.inner.lock().await;
        if let Some(message) = &inner.preflight_failure {
            return Err(publish_error!(
                ErrorKind::PreflightFailed,
                "Destination connectivity check failed",
                format!("site '{}': {message}", site.name)
            ));
        }
        Ok(())
    }
}
