//! The publisher service: job registry, lifecycle, demand scheduling and
//! status batching.

pub mod demand;
pub mod status;

pub use demand::{DemandMonitor, DemandMonitorHandle, DemandQueues};
pub use status::StatusBatcher;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use presswork_config::shared::ServiceConfig;
use tracing::{Instrument, error, info, warn};

use crate::assembly::Assembler;
use crate::bail;
use crate::catalog::{Catalog, ContentEntry};
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::concurrency::signal::{SignalTx, create_signal};
use crate::delivery::{DefaultDeliveryPolicy, DeliveryManager, DeliveryPolicy};
use crate::error::{ErrorKind, PublishResult};
use crate::job::{JobHandle, JobRegistry, PublishingJob};
use crate::publish_error;
use crate::store::{SiteItemStore, StatusStore};
use crate::transport::Transport;
use crate::types::{CancelMessage, EditionId, JobId, JobState, JobStatus, Priority, PublishMessage};
use crate::workers::{CancellationList, DispatchWorker, DispatchWorkerPool, Worker, WorkerHandle};

/// Everything the service shares with its background workers.
pub(crate) struct ServiceInner<C, A, D, T, S> {
    pub(crate) config: ServiceConfig,
    pub(crate) catalog: C,
    pub(crate) assembler: A,
    pub(crate) delivery: D,
    pub(crate) transport: T,
    pub(crate) store: S,
    pub(crate) policy: Arc<dyn DeliveryPolicy>,
    pub(crate) registry: JobRegistry,
    pub(crate) batcher: StatusBatcher<S>,
    pub(crate) cancellations: CancellationList,
    pub(crate) demand: DemandQueues,
    pub(crate) demand_signal: SignalTx,
    pub(crate) shutdown_tx: ShutdownTx,
    next_job_id: AtomicU64,
}

/// Lifecycle state of the service.
enum ServiceState {
    NotStarted,
    Started {
        pool: DispatchWorkerPool,
        demand_monitor: DemandMonitorHandle,
    },
}

/// The publishing service.
///
/// Owns the set of active jobs, starts and cancels them, runs the
/// dispatch worker pool and the demand-publish monitor, and answers
/// status queries. One instance per application; its lifecycle is tied to
/// application start and stop, not static initialization.
pub struct PublisherService<C, A, D, T, S> {
    inner: Arc<ServiceInner<C, A, D, T, S>>,
    state: ServiceState,
}

impl<C, A, D, T, S> std::fmt::Debug for PublisherService<C, A, D, T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherService").finish_non_exhaustive()
    }
}

impl<C, A, D, T, S> PublisherService<C, A, D, T, S>
where
    C: Catalog + Clone + Send + Sync + 'static,
    A: Assembler + Clone + Send + Sync + 'static,
    D: DeliveryManager + Clone + Send + Sync + 'static,
    T: Transport + Clone + Send + Sync + 'static,
    S: StatusStore + SiteItemStore + Clone + Send + Sync + 'static,
{
    /// Creates a new, not-yet-started service. Fails when the
    /// configuration does not validate.
    pub fn new(
        config: ServiceConfig,
        catalog: C,
        assembler: A,
        delivery: D,
        transport: T,
        store: S,
    ) -> PublishResult<Self> {
        config.validate().map_err(|err| {
            publish_error!(
                ErrorKind::ConfigError,
                "Invalid service configuration",
                err.to_string()
            )
        })?;

        let (shutdown_tx, _) = create_shutdown_channel();
        let (demand_signal, _) = create_signal();
        let batcher = StatusBatcher::new(store.clone(), config.job.batch.max_size);
        let cancellations =
            CancellationList::new(Duration::from_millis(config.cancellation_ttl_ms));

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                catalog,
                assembler,
                delivery,
                transport,
                store,
                policy: Arc::new(DefaultDeliveryPolicy),
                registry: JobRegistry::new(),
                batcher,
                cancellations,
                demand: DemandQueues::new(),
                demand_signal,
                shutdown_tx,
                next_job_id: AtomicU64::new(0),
            }),
            state: ServiceState::NotStarted,
        })
    }

    /// Replaces the delivery-type policy. Must be called before
    /// [`PublisherService::start`].
    pub fn with_policy(mut self, policy: Arc<dyn DeliveryPolicy>) -> PublishResult<Self> {
        let inner = Arc::get_mut(&mut self.inner).ok_or_else(|| {
            publish_error!(
                ErrorKind::InvalidState,
                "Policy can only be replaced before the service starts"
            )
        })?;
        inner.policy = policy;

        Ok(self)
    }

    /// Starts the dispatch worker pool and the demand monitor.
    pub async fn start(&mut self) -> PublishResult<()> {
        if matches!(self.state, ServiceState::Started { .. }) {
            bail!(ErrorKind::InvalidState, "Service is already started");
        }

        info!(
            workers = self.inner.config.dispatch_workers,
            "starting publisher service"
        );

        let pool = DispatchWorkerPool::new();
        for worker_id in 0..self.inner.config.dispatch_workers as usize {
            let worker = DispatchWorker::new(
                worker_id,
                self.inner.transport.clone(),
                self.inner.assembler.clone(),
                self.inner.delivery.clone(),
                self.inner.policy.clone(),
                self.inner.registry.clone(),
                self.inner.cancellations.clone(),
                self.inner.batcher.clone(),
                self.inner.store.clone(),
                self.inner.shutdown_tx.subscribe(),
            );

            let span = tracing::info_span!("dispatch_worker", worker_id);
            pool.spawn(worker_id, worker.run().instrument(span)).await;
        }

        let demand_monitor = DemandMonitor::new(
            self.inner.clone(),
            self.inner.demand_signal.subscribe(),
            self.inner.shutdown_tx.subscribe(),
        )
        .start()
        .await?;

        self.state = ServiceState::Started {
            pool,
            demand_monitor,
        };

        Ok(())
    }

    /// Starts a publishing job for an edition.
    ///
    /// Rejects the start when the edition already has a live job. The
    /// check and registration are one critical section, so concurrent
    /// callers cannot both start the same edition.
    pub async fn start_job(&self, edition_id: EditionId) -> PublishResult<JobId> {
        if !matches!(self.state, ServiceState::Started { .. }) {
            bail!(
                ErrorKind::ServiceNotStarted,
                "Service must be started before jobs can run"
            );
        }

        self.inner.start_job_with(edition_id, Vec::new()).await
    }

    /// Requests cancellation of a job and broadcasts it to the dispatch
    /// workers. Safe to call repeatedly; only the first call transitions.
    pub async fn cancel_job(&self, job_id: JobId) -> PublishResult<()> {
        let handle = self.job(job_id)?;

        if handle.request_cancel(true) {
            info!(job_id, "job canceled by user");
            self.inner
                .transport
                .send(
                    PublishMessage::Cancel(CancelMessage {
                        job_id,
                        by_user: true,
                    }),
                    Priority::High,
                )
                .await?;
        }

        Ok(())
    }

    /// Point-in-time status of a job.
    pub fn status(&self, job_id: JobId) -> PublishResult<JobStatus> {
        Ok(self.job(job_id)?.status())
    }

    /// The handle of a registered job.
    pub fn job(&self, job_id: JobId) -> PublishResult<JobHandle> {
        self.inner.registry.get(job_id).ok_or_else(|| {
            publish_error!(
                ErrorKind::UnknownJob,
                "Unknown job",
                format!("no job with id {job_id}")
            )
        })
    }

    /// Queues ad hoc demand work for an edition and wakes the demand
    /// monitor. The work starts as soon as the edition has no live job.
    pub async fn queue_demand_work(
        &self,
        edition_id: EditionId,
        entries: Vec<ContentEntry>,
    ) -> PublishResult<()> {
        self.inner.demand.enqueue(edition_id, entries).await;
        self.inner.demand_signal.send_replace(());

        Ok(())
    }

    /// Cancels live jobs, stops the workers and flushes buffered
    /// statuses.
    pub async fn shutdown_and_wait(self) -> PublishResult<()> {
        let ServiceState::Started {
            pool,
            demand_monitor,
        } = self.state
        else {
            return Ok(());
        };

        info!("shutting down publisher service");

        // Live jobs observe the cancel at their next loop boundary and
        // wind down through their normal finalization path.
        for handle in self.inner.registry.all() {
            if !handle.state().is_terminal() && handle.request_cancel(false) {
                let send = self
                    .inner
                    .transport
                    .send(
                        PublishMessage::Cancel(CancelMessage {
                            job_id: handle.job_id(),
                            by_user: false,
                        }),
                        Priority::High,
                    )
                    .await;
                if let Err(err) = send {
                    warn!(job_id = handle.job_id(), error = %err, "failed to broadcast shutdown cancel");
                }
            }
        }

        let mut errors = Vec::new();

        if self.inner.shutdown_tx.shutdown().is_err() {
            // No receiver alive means every worker already stopped.
            info!("no workers were listening for shutdown");
        }
        self.inner.transport.close();

        if let Err(err) = demand_monitor.wait().await {
            error!(error = %err, "demand monitor failed");
            errors.push(err);
        }

        if let Err(err) = pool.wait_all().await {
            error!(error = %err, "dispatch worker pool failed");
            errors.push(err);
        }

        if let Err(err) = self.inner.batcher.flush_all().await {
            errors.push(err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

impl<C, A, D, T, S> ServiceInner<C, A, D, T, S>
where
    C: Catalog + Clone + Send + Sync + 'static,
    A: Assembler + Clone + Send + Sync + 'static,
    D: DeliveryManager + Clone + Send + Sync + 'static,
    T: Transport + Clone + Send + Sync + 'static,
    S: StatusStore + SiteItemStore + Clone + Send + Sync + 'static,
{
    /// Registers and spawns a job for an edition, with optional demand
    /// entries.
    pub(crate) async fn start_job_with(
        &self,
        edition_id: EditionId,
        demand_entries: Vec<ContentEntry>,
    ) -> PublishResult<JobId> {
        // Completed jobs past their retention are dropped opportunistically
        // whenever a new job starts.
        let reaped = self
            .registry
            .reap(Duration::from_millis(self.config.reap_after_ms));
        if reaped > 0 {
            info!(reaped, "reaped completed jobs from registry");
        }

        let edition = self.catalog.edition(edition_id).await?;
        let site = self.catalog.site(edition.site_id).await?;

        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = JobHandle::new(job_id, edition_id, site.id);

        self.registry.try_register(handle.clone())?;

        // Push-style destinations get a connectivity check before the job
        // ever starts; an unreachable destination cancels the nascent job.
        if let Err(err) = self.preflight(&edition, &site).await {
            warn!(job_id, edition_id, error = %err, "pre-flight check failed, canceling job");
            handle.record_job_error(err.to_string());
            handle.request_cancel(false);
            handle.finish();
            handle.set_state(JobState::Aborted);
            return Err(err);
        }

        let job = PublishingJob::new(
            handle,
            self.config.job.clone(),
            self.catalog.clone(),
            self.transport.clone(),
            self.store.clone(),
            self.batcher.clone(),
            demand_entries,
        );

        let span = tracing::info_span!("publishing_job", job_id, edition = %edition.name);
        tokio::spawn(job.run().instrument(span));

        info!(job_id, edition_id, "publishing job registered and started");

        Ok(job_id)
    }

    /// Runs the delivery pre-flight when any of the edition's content
    /// lists routes to a delivery type that requires it.
    async fn preflight(
        &self,
        edition: &crate::catalog::Edition,
        site: &crate::catalog::Site,
    ) -> PublishResult<()> {
        let mut needs_check = false;
        for binding in &edition.content_lists {
            let list = self.catalog.content_list(binding.content_list_id).await?;
            if self.policy.requires_preflight(&list.delivery_type) {
                needs_check = true;
                break;
            }
        }

        if needs_check {
            self.delivery.preflight(site, edition.server_id).await?;
        }

        Ok(())
    }
}
