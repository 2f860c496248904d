//! Demand publishing: the pending-work queues and the background monitor
//! that turns queued demand work into jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, warn};

use crate::assembly::Assembler;
use crate::catalog::{Catalog, ContentEntry};
use crate::concurrency::shutdown::ShutdownRx;
use crate::concurrency::signal::SignalRx;
use crate::delivery::DeliveryManager;
use crate::error::{ErrorKind, PublishResult};
use crate::publish_error;
use crate::service::ServiceInner;
use crate::store::{SiteItemStore, StatusStore};
use crate::transport::Transport;
use crate::types::EditionId;
use crate::workers::base::{Worker, WorkerHandle};

/// Pending demand work per edition.
///
/// Guarded independently of the job registry; the monitor takes the two
/// locks strictly one at a time, never nested, to keep the documented
/// lock-ordering hazard of a shared registry/queue monitor impossible.
#[derive(Debug, Clone, Default)]
pub struct DemandQueues {
    inner: Arc<Mutex<HashMap<EditionId, Vec<ContentEntry>>>>,
}

impl DemandQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends demand work for an edition.
    pub async fn enqueue(&self, edition_id: EditionId, entries: Vec<ContentEntry>) {
        if entries.is_empty() {
            return;
        }

        let mut queues = self.inner.lock().await;
        queues.entry(edition_id).or_default().extend(entries);
    }

    /// Takes all pending work for an edition.
    pub async fn take(&self, edition_id: EditionId) -> Vec<ContentEntry> {
        let mut queues = self.inner.lock().await;
        queues.remove(&edition_id).unwrap_or_default()
    }

    /// Editions that currently have pending work.
    pub async fn editions_with_work(&self) -> Vec<EditionId> {
        let queues = self.inner.lock().await;
        queues
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(edition_id, _)| *edition_id)
            .collect()
    }
}

/// Background monitor starting a job for any edition with pending demand
/// work whose prior job is inactive.
///
/// A supervised loop with a timeout-select over "new demand enqueued" and
/// "poll interval elapsed".
pub struct DemandMonitor<C, A, D, T, S> {
    service: Arc<ServiceInner<C, A, D, T, S>>,
    signal_rx: SignalRx,
    shutdown_rx: ShutdownRx,
}

impl<C, A, D, T, S> DemandMonitor<C, A, D, T, S>
where
    C: Catalog + Clone + Send + Sync + 'static,
    A: Assembler + Clone + Send + Sync + 'static,
    D: DeliveryManager + Clone + Send + Sync + 'static,
    T: Transport + Clone + Send + Sync + 'static,
    S: StatusStore + SiteItemStore + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        service: Arc<ServiceInner<C, A, D, T, S>>,
        signal_rx: SignalRx,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            service,
            signal_rx,
            shutdown_rx,
        }
    }

    async fn run(mut self) -> PublishResult<()> {
        let poll = Duration::from_millis(self.service.config.demand_poll_ms);
        info!("demand monitor started");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    info!("demand monitor shutting down");
                    break;
                }
                _ = self.signal_rx.changed() => {}
                _ = tokio::time::sleep(poll) => {}
            }

            self.start_pending_jobs().await;
        }

        Ok(())
    }

    async fn start_pending_jobs(&self) {
        // Demand-queue lock only.
        let editions = self.service.demand.editions_with_work().await;

        for edition_id in editions {
            // Registry lock only, released before the demand queue is
            // touched again.
            if self.service.registry.active_for_edition(edition_id).is_some() {
                continue;
            }

            let entries = self.service.demand.take(edition_id).await;
            if entries.is_empty() {
                continue;
            }

            match self.service.start_job_with(edition_id, entries.clone()).await {
                Ok(job_id) => {
                    info!(edition_id, job_id, entries = entries.len(), "demand job started");
                }
                Err(err) => {
                    warn!(edition_id, error = %err, "failed to start demand job, re-queueing work");
                    self.service.demand.enqueue(edition_id, entries).await;
                }
            }
        }
    }
}

impl<C, A, D, T, S> Worker<DemandMonitorHandle> for DemandMonitor<C, A, D, T, S>
where
    C: Catalog + Clone + Send + Sync + 'static,
    A: Assembler + Clone + Send + Sync + 'static,
    D: DeliveryManager + Clone + Send + Sync + 'static,
    T: Transport + Clone + Send + Sync + 'static,
    S: StatusStore + SiteItemStore + Clone + Send + Sync + 'static,
{
    async fn start(self) -> PublishResult<DemandMonitorHandle> {
        let span = tracing::info_span!("demand_monitor");
        let handle = tokio::spawn(self.run().instrument(span));

        Ok(DemandMonitorHandle {
            handle: Some(handle),
        })
    }
}

/// Handle for waiting on the demand monitor.
#[derive(Debug)]
pub struct DemandMonitorHandle {
    handle: Option<JoinHandle<PublishResult<()>>>,
}

impl WorkerHandle for DemandMonitorHandle {
    async fn wait(mut self) -> PublishResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            publish_error!(
                ErrorKind::DispatchWorkerPanic,
                "Demand monitor panicked",
                err
            )
        })??;

        Ok(())
    }
}
