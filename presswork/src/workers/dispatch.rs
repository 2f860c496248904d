use std::sync::Arc;

use chrono::Utc;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::assembly::Assembler;
use crate::bail;
use crate::concurrency::shutdown::ShutdownRx;
use crate::delivery::{DeliveryManager, DeliveryOutcome, DeliveryPolicy, DeliveryResult};
use crate::error::{ErrorKind, PublishError, PublishResult};
use crate::job::{JobHandle, JobRegistry, location};
use crate::service::status::StatusBatcher;
use crate::store::{PublishScope, SiteItemStore, StatusStore};
use crate::transport::Transport;
use crate::types::{
    AlertMessage, CancelMessage, CommitAck, ItemState, ItemStatus, JobControlMessage, Operation,
    PublishMessage, SiteItemRecord, WorkItem,
};
use crate::workers::cancel::CancellationList;
use crate::workers::pagination;

/// The fields needed to force an item into a failure status after its
/// work item has been consumed by the processing pipeline.
struct ItemStub {
    job_id: crate::types::JobId,
    reference_id: crate::types::ReferenceId,
    content_id: crate::types::ContentId,
    operation: Operation,
    delivery_path: String,
}

impl ItemStub {
    fn of(item: &WorkItem) -> Self {
        Self {
            job_id: item.job_id,
            reference_id: item.reference_id,
            content_id: item.content_id,
            operation: item.operation,
            delivery_path: item.delivery_path.clone(),
        }
    }
}

/// Worker draining the publishing transport.
///
/// Consumes cancellation, job-control and work-item messages, invoking
/// assembly and delivery and reporting item status back to the owning
/// job. Any number of dispatch workers run concurrently against the same
/// transport; consumption order across workers is unspecified.
///
/// Messages are acknowledged regardless of outcome: every work item is
/// guaranteed to reach a terminal status even on an unexpected error, so
/// a job can never block forever on a silently dropped item.
pub struct DispatchWorker<A, D, T, S> {
    worker_id: usize,
    transport: T,
    assembler: A,
    delivery: D,
    policy: Arc<dyn DeliveryPolicy>,
    registry: JobRegistry,
    cancellations: CancellationList,
    batcher: StatusBatcher<S>,
    store: S,
    shutdown_rx: ShutdownRx,
}

impl<A, D, T, S> DispatchWorker<A, D, T, S>
where
    A: Assembler + Send + Sync,
    D: DeliveryManager + Send + Sync,
    T: Transport + Send + Sync,
    S: StatusStore + SiteItemStore + Clone + Send + Sync,
{
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        worker_id: usize,
        transport: T,
        assembler: A,
        delivery: D,
        policy: Arc<dyn DeliveryPolicy>,
        registry: JobRegistry,
        cancellations: CancellationList,
        batcher: StatusBatcher<S>,
        store: S,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            worker_id,
            transport,
            assembler,
            delivery,
            policy,
            registry,
            cancellations,
            batcher,
            store,
            shutdown_rx,
        }
    }

    /// Runs the message loop until shutdown or transport close.
    pub async fn run(mut self) -> PublishResult<()> {
        info!(worker_id = self.worker_id, "dispatch worker started");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    info!(worker_id = self.worker_id, "dispatch worker shutting down");
                    break;
                }
                message = self.transport.recv() => {
                    let Some(message) = message else {
                        info!(worker_id = self.worker_id, "transport closed, dispatch worker stopping");
                        break;
                    };
                    self.handle_message(message).await;
                }
            }
        }

        Ok(())
    }

    async fn handle_message(&self, message: PublishMessage) {
        match message {
            PublishMessage::Cancel(cancel) => self.handle_cancel(cancel).await,
            PublishMessage::JobControl(control) => self.handle_control(control).await,
            PublishMessage::Work(item) => self.handle_work(*item).await,
            PublishMessage::Alert(alert) => self.handle_alert(alert),
        }
    }

    async fn handle_cancel(&self, cancel: CancelMessage) {
        info!(job_id = cancel.job_id, by_user = cancel.by_user, "cancellation received");

        self.cancellations.insert(cancel.job_id);
        if let Some(handle) = self.registry.get(cancel.job_id) {
            handle.touch_heartbeat();
        }

        // Pending, not-yet-committed deliveries of the canceled job are
        // rolled back.
        if let Err(err) = self.delivery.rollback(cancel.job_id).await {
            error!(job_id = cancel.job_id, error = %err, "rollback of canceled job failed");
        }
    }

    async fn handle_control(&self, control: JobControlMessage) {
        match control {
            JobControlMessage::Start {
                job_id,
                site,
                server_id,
            } => {
                if let Some(handle) = self.registry.get(job_id) {
                    handle.touch_heartbeat();
                }

                if let Err(err) = self.delivery.init(job_id, &site, server_id).await {
                    error!(job_id, error = %err, "delivery context initialization failed");
                    if let Some(handle) = self.registry.get(job_id) {
                        handle.record_job_error(err.to_string());
                    }
                }
            }
            JobControlMessage::End { job_id } => {
                let handle = self.registry.get(job_id);
                if let Some(handle) = &handle {
                    handle.touch_heartbeat();
                }

                let ack = match self.delivery.commit(job_id).await {
                    Ok(results) => {
                        // Results finalized at commit time are reported
                        // here; anything already acknowledged is deduped by
                        // the monotonic tracker.
                        if let Some(handle) = &handle {
                            for result in results {
                                self.report_commit_result(handle, result).await;
                            }
                        }
                        CommitAck { error: None }
                    }
                    Err(err) => {
                        error!(job_id, error = %err, "delivery commit failed");
                        CommitAck {
                            error: Some(err.to_string()),
                        }
                    }
                };

                match handle {
                    Some(handle) => handle.resolve_commit(ack),
                    None => warn!(job_id, "commit acknowledgment for unknown job dropped"),
                }
            }
        }
    }

    fn handle_alert(&self, alert: AlertMessage) {
        // Operator-facing: keep it loud.
        error!(job_id = alert.job_id, "operator alert: {}", alert.message);
    }

    async fn handle_work(&self, item: WorkItem) {
        let Some(handle) = self.registry.get(item.job_id) else {
            debug!(
                job_id = item.job_id,
                reference_id = item.reference_id,
                "work item for unregistered job dropped"
            );
            return;
        };

        handle.touch_heartbeat();

        if handle.state().is_terminal() {
            debug!(
                job_id = item.job_id,
                reference_id = item.reference_id,
                "work item for finished job dropped"
            );
            return;
        }

        if self.cancellations.contains(item.job_id) || handle.is_canceled() {
            if let Err(err) = self
                .record_status(&handle, &item, ItemState::Cancelled, None)
                .await
            {
                error!(job_id = item.job_id, error = %err, "failed to record cancelled status");
            }
            return;
        }

        let stub = ItemStub::of(&item);
        if let Err(err) = self.process_item(&handle, item).await {
            self.force_failed(&handle, stub, err).await;
        }
    }

    async fn process_item(&self, handle: &JobHandle, item: WorkItem) -> PublishResult<()> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "dispatch",
            job_id = item.job_id,
            reference_id = item.reference_id,
            request_id = %request_id
        );

        self.process_item_inner(handle, item).instrument(span).await
    }

    async fn process_item_inner(
        &self,
        handle: &JobHandle,
        mut item: WorkItem,
    ) -> PublishResult<()> {
        if item.delivery_path.is_empty() && !self.policy.allows_empty_location(&item.delivery_type)
        {
            bail!(
                ErrorKind::EmptyLocation,
                "Empty delivery location",
                format!(
                    "content {} has no delivery location for type '{}'",
                    item.content_id, item.delivery_type
                )
            );
        }

        if !self.skip_assembly(&item) {
            let output = self.assembler.assemble(&mut item).await?;
            self.record_status(handle, &item, ItemState::Assembled, None)
                .await?;

            if output.paginated && item.page == 0 && !item.is_slot_clone() {
                return self.process_paginated(handle, item).await;
            }
        }

        self.deliver(handle, item).await
    }

    /// Expands a paginated result and runs every page (and any stale-page
    /// unpublish) through the normal assembly/delivery path.
    async fn process_paginated(&self, handle: &JobHandle, item: WorkItem) -> PublishResult<()> {
        self.record_status(handle, &item, ItemState::Paged, None)
            .await?;

        let pages = pagination::expand_pages(&self.assembler, handle, &item).await?;
        info!(
            content_id = item.content_id,
            pages = pages.len(),
            "expanded paginated item"
        );

        let scope = scope_of(&item);
        let stale =
            location::stale_pages(&self.store, scope, item.delivery_context, &pages).await?;

        let mut work = pages;
        for record in stale {
            let unpublish = item.to_unpublish_of(&record, handle.mint_reference_id());
            handle
                .tracker()
                .update_state(unpublish.reference_id, ItemState::Queued);
            work.push(unpublish);
        }

        for page in work {
            let stub = ItemStub::of(&page);
            if let Err(err) = self.assemble_and_deliver(handle, page).await {
                self.force_failed(handle, stub, err).await;
            }
        }

        Ok(())
    }

    /// The non-expanding path used for page items: a page is never
    /// paginated again.
    async fn assemble_and_deliver(&self, handle: &JobHandle, mut item: WorkItem) -> PublishResult<()> {
        if !self.skip_assembly(&item) {
            self.assembler.assemble(&mut item).await?;
            self.record_status(handle, &item, ItemState::Assembled, None)
                .await?;
        }

        self.deliver(handle, item).await
    }

    async fn deliver(&self, handle: &JobHandle, mut item: WorkItem) -> PublishResult<()> {
        // Re-checked after assembly: a cancellation may have arrived while
        // the item was being rendered.
        if self.cancellations.contains(item.job_id) || handle.is_canceled() {
            self.record_status(handle, &item, ItemState::Cancelled, None)
                .await?;
            return Ok(());
        }

        if !item.parameters.contains_key("template") {
            self.assembler.fill_template_metadata(&mut item).await?;
        }

        // The item must stay in a blocking state until the delivery layer
        // owns it; otherwise the job could enter its commit while the
        // hand-over is still in flight.
        let result = self.delivery.process(&item).await?;
        self.record_status(handle, &item, ItemState::PreparedForDelivery, None)
            .await?;
        self.record_status(handle, &item, ItemState::DeliveryQueued, None)
            .await?;

        match result.outcome {
            DeliveryOutcome::Delivered { location } => {
                self.record_status(handle, &item, ItemState::Delivered, None)
                    .await?;

                // Keep the durable site-item record in step so the next
                // run's location-change detection sees this delivery.
                match item.operation {
                    Operation::Publish => {
                        self.store
                            .record_published(SiteItemRecord {
                                key: item.site_item_key(),
                                folder_id: item.folder_id,
                                delivery_path: location,
                                unpublish_data: None,
                                server_id: item.server_id,
                            })
                            .await?;
                    }
                    Operation::Unpublish => {
                        self.store.record_unpublished(&item.site_item_key()).await?;
                    }
                }
            }
            DeliveryOutcome::Failed { message } => {
                warn!(
                    reference_id = item.reference_id,
                    content_id = item.content_id,
                    "delivery failed: {message}"
                );
                self.record_status(handle, &item, ItemState::Failed, Some(message))
                    .await?;
            }
        }

        Ok(())
    }

    fn skip_assembly(&self, item: &WorkItem) -> bool {
        !item.is_publish() && !self.policy.unpublish_requires_assembly(&item.delivery_type)
    }

    /// Updates the tracker and persists the status row for terminal
    /// states. Updates dropped by the monotonic tracker (duplicate
    /// deliveries of the same terminal status) are not persisted again.
    async fn record_status(
        &self,
        handle: &JobHandle,
        item: &WorkItem,
        state: ItemState,
        message: Option<String>,
    ) -> PublishResult<()> {
        let applied = handle.tracker().update_state(item.reference_id, state);
        handle.touch_status();

        if applied && state.is_terminal() {
            let mut status = ItemStatus::of_item(item, state);
            if let Some(message) = message {
                status = status.with_message(message);
            }
            self.batcher.push(status).await?;
        }

        Ok(())
    }

    /// Reports a delivery result that was finalized at commit time.
    async fn report_commit_result(&self, handle: &JobHandle, result: DeliveryResult) {
        let (state, message, location) = match result.outcome {
            DeliveryOutcome::Delivered { location } => {
                (ItemState::Delivered, None, Some(location))
            }
            DeliveryOutcome::Failed { message } => (ItemState::Failed, Some(message), None),
        };

        let applied = handle.tracker().update_state(result.reference_id, state);
        handle.touch_status();
        if !applied {
            return;
        }

        let status = ItemStatus {
            job_id: handle.job_id(),
            reference_id: result.reference_id,
            content_id: 0,
            operation: Operation::Publish,
            state,
            location,
            message,
            recorded_at: Utc::now(),
        };
        if let Err(err) = self.batcher.push(status).await {
            error!(error = %err, "failed to persist commit-time status");
        }
    }

    /// Last line of defense: any error escaping the item pipeline forces
    /// the item into a failure status carrying the error text, so the job
    /// never waits on an item that silently vanished.
    async fn force_failed(&self, handle: &JobHandle, stub: ItemStub, err: PublishError) {
        warn!(
            job_id = stub.job_id,
            reference_id = stub.reference_id,
            error = %err,
            "work item processing failed; forcing failure status"
        );

        let applied = handle
            .tracker()
            .update_state(stub.reference_id, ItemState::Failed);
        handle.touch_status();
        if !applied {
            return;
        }

        let status = ItemStatus {
            job_id: stub.job_id,
            reference_id: stub.reference_id,
            content_id: stub.content_id,
            operation: stub.operation,
            state: ItemState::Failed,
            location: (!stub.delivery_path.is_empty()).then(|| stub.delivery_path.clone()),
            message: Some(err.to_string()),
            recorded_at: Utc::now(),
        };
        if let Err(persist_err) = self.batcher.push(status).await {
            error!(error = %persist_err, "failed to persist forced failure status");
        }
    }
}

fn scope_of(item: &WorkItem) -> PublishScope {
    match item.server_id {
        Some(server_id) => PublishScope::Server(server_id),
        None => PublishScope::Site(item.site_id),
    }
}
