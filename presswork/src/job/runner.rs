use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use presswork_config::shared::JobConfig;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, ContentEntry, ContentList, ContentListBinding, Edition, EditionType, Site};
use crate::error::{ErrorKind, PublishResult};
use crate::job::handle::JobHandle;
use crate::job::location;
use crate::job::tasks::{self, EditionTask, StoredStatusCallback, TaskContext};
use crate::service::status::StatusBatcher;
use crate::store::{PublishScope, SiteItemStore, StatusStore};
use crate::transport::Transport;
use crate::types::{
    AlertMessage, CancelMessage, CommitAck, ItemState, JobControlMessage, JobState, Priority,
    PublishMessage, WorkItem,
};

/// One end-to-end publishing run.
///
/// Owns the job state machine: loads the edition, runs pre-tasks,
/// expands content lists into work items on the outbound queue, waits for
/// the dispatch side to drain them, drives the commit handshake, runs
/// post-tasks and derives the final state. The run loop has a single
/// outer catch; finalization executes on every exit path, so a job always
/// ends in a terminal state with its statuses flushed.
pub struct PublishingJob<C, T, S> {
    handle: JobHandle,
    config: Arc<JobConfig>,
    catalog: C,
    transport: T,
    store: S,
    batcher: StatusBatcher<S>,
    /// Entries to publish for demand editions, drained from the demand
    /// queue by the service at spawn time. Empty for normal editions.
    demand_entries: Vec<ContentEntry>,
}

impl<C, T, S> PublishingJob<C, T, S>
where
    C: Catalog + Send + Sync,
    T: Transport + Send + Sync,
    S: StatusStore + SiteItemStore + Clone + Send + Sync,
{
    pub fn new(
        handle: JobHandle,
        config: JobConfig,
        catalog: C,
        transport: T,
        store: S,
        batcher: StatusBatcher<S>,
        demand_entries: Vec<ContentEntry>,
    ) -> Self {
        Self {
            handle,
            config: Arc::new(config),
            catalog,
            transport,
            store,
            batcher,
            demand_entries,
        }
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// Runs the job to completion.
    pub async fn run(self) {
        let job_id = self.handle.job_id();
        info!(job_id, edition_id = self.handle.edition_id(), "publishing job starting");

        // Configuration load failures abort before any task runs.
        let (edition, site, edition_tasks) = match self.load_configuration().await {
            Ok(loaded) => loaded,
            Err(err) => {
                error!(job_id, error = %err, "failed to load edition configuration, aborting job");
                self.handle.record_job_error(err.to_string());
                self.handle.request_cancel(false);
                self.handle.finish();
                self.handle.set_state(JobState::Aborted);
                return;
            }
        };

        if let Err(err) = self.execute(&edition, &site, &edition_tasks).await {
            if err.kind() == ErrorKind::DatasourceMisconfigured {
                self.handle.mark_datasource_blocked();
                self.send_operator_alert(&err).await;
            }

            error!(job_id, error = %err, "publishing run failed");
            self.handle.record_job_error(err.to_string());
            self.cancel_with_broadcast("run failure").await;
        }

        self.finish_edition(&edition, &site, &edition_tasks).await;
    }

    async fn load_configuration(
        &self,
    ) -> PublishResult<(Edition, Site, Vec<Arc<dyn EditionTask>>)> {
        let edition = self.catalog.edition(self.handle.edition_id()).await?;
        let site = self.catalog.site(edition.site_id).await?;
        let edition_tasks = self.catalog.edition_tasks(edition.id).await?;

        Ok((edition, site, edition_tasks))
    }

    /// The forward half of the state machine: pre-tasks, queueing,
    /// working.
    async fn execute(
        &self,
        edition: &Edition,
        site: &Site,
        edition_tasks: &[Arc<dyn EditionTask>],
    ) -> PublishResult<()> {
        self.handle.set_state(JobState::PreTasks);
        let ctx = TaskContext {
            edition,
            site,
            job_id: self.handle.job_id(),
            started_at: self.handle.started_at(),
            ended_at: None,
            elapsed: Duration::ZERO,
            succeeded: true,
            parameters: &edition.task_parameters,
            status: None,
        };
        if tasks::run_pre_tasks(edition_tasks, &ctx).await? {
            self.handle.mark_task_failed();
        }

        self.handle.set_state(JobState::Queueing);
        self.transport
            .send(
                PublishMessage::JobControl(JobControlMessage::Start {
                    job_id: self.handle.job_id(),
                    site: site.clone(),
                    server_id: edition.server_id,
                }),
                Priority::Normal,
            )
            .await?;
        self.queue_content(edition, site).await?;

        self.handle.set_state(JobState::Working);
        self.wait_for_items().await;

        Ok(())
    }

    /// Iterates content lists in sequence order, turning their entries
    /// into queued work items.
    async fn queue_content(&self, edition: &Edition, site: &Site) -> PublishResult<()> {
        let site_folders = self.catalog.site_folders(site.id).await?;
        let scope = match edition.server_id {
            Some(server_id) => PublishScope::Server(server_id),
            None => PublishScope::Site(site.id),
        };

        let mut bindings = edition.content_lists.clone();
        bindings.sort_by_key(|binding| binding.sequence);

        if edition.edition_type == EditionType::Demand {
            self.queue_demand(edition, site, &bindings).await?;
            self.handle.set_current_content_list(None);
            return Ok(());
        }

        for binding in &bindings {
            // Checked before each content list so a cancel during a long
            // pass stops queueing promptly.
            if self.handle.is_canceled() {
                info!("job canceled, stopping content list processing");
                break;
            }

            let list = self.catalog.content_list(binding.content_list_id).await?;
            self.handle.set_current_content_list(Some(list.name.clone()));
            info!(content_list = %list.name, sequence = binding.sequence, "processing content list");

            let entries = self.catalog.content_entries(&list, binding.delivery_context).await?;
            let items: Vec<WorkItem> = entries
                .into_iter()
                .map(|entry| self.to_work_item(entry, &list, binding, edition, site))
                .collect();

            // Items to unpublish because their location moved are computed
            // before the publish work is queued, so the same pass does not
            // publish to the new location and leave the old one behind.
            let moved = location::detect_moves(
                &self.store,
                scope,
                binding.delivery_context,
                &site_folders,
                &items,
            )
            .await?;
            if !moved.is_empty() {
                info!(count = moved.len(), "queueing unpublish for moved items");
                let unpublish: Vec<WorkItem> = moved
                    .into_iter()
                    .map(|m| items[m.candidate_index].to_unpublish_of(&m.record, self.handle.mint_reference_id()))
                    .collect();
                self.queue_items(unpublish).await?;
            }

            self.queue_items(items).await?;
        }

        self.handle.set_current_content_list(None);

        Ok(())
    }

    /// Queues the demand entries through the edition's first content
    /// list binding. Demand passes skip unpublish-on-move detection.
    async fn queue_demand(
        &self,
        edition: &Edition,
        site: &Site,
        bindings: &[ContentListBinding],
    ) -> PublishResult<()> {
        let Some(binding) = bindings.first() else {
            crate::bail!(
                ErrorKind::ConfigError,
                "Demand edition has no content list",
                format!("edition {} cannot accept demand work", edition.id)
            );
        };

        let list = self.catalog.content_list(binding.content_list_id).await?;
        self.handle.set_current_content_list(Some(list.name.clone()));
        info!(entries = self.demand_entries.len(), "queueing demand work");

        let items: Vec<WorkItem> = self
            .demand_entries
            .iter()
            .cloned()
            .map(|entry| self.to_work_item(entry, &list, binding, edition, site))
            .collect();

        self.queue_items(items).await
    }

    fn to_work_item(
        &self,
        entry: ContentEntry,
        list: &ContentList,
        binding: &ContentListBinding,
        edition: &Edition,
        site: &Site,
    ) -> WorkItem {
        WorkItem {
            job_id: self.handle.job_id(),
            reference_id: self.handle.mint_reference_id(),
            content_id: entry.content_id,
            revision: entry.revision,
            template_id: entry.template_id,
            delivery_type: list.delivery_type.clone(),
            delivery_context: binding.delivery_context,
            folder_id: entry.folder_id,
            page: 0,
            operation: entry.operation,
            site_id: site.id,
            server_id: edition.server_id,
            assembly_url: entry.assembly_url,
            delivery_path: entry.delivery_path,
            parameters: entry.parameters,
            result: None,
        }
    }

    /// Registers items with the tracker and pushes them onto the outbound
    /// queue in bounded batches, re-checking cancellation between batches
    /// so a long list never starves a cancel.
    async fn queue_items(&self, items: Vec<WorkItem>) -> PublishResult<()> {
        for batch in items.chunks(self.config.batch.max_size) {
            if self.handle.is_canceled() {
                info!("job canceled, stopping work item queueing");
                return Ok(());
            }

            for item in batch {
                self.handle
                    .tracker()
                    .update_state(item.reference_id, ItemState::Queued);
                self.transport
                    .send(
                        PublishMessage::Work(Box::new(item.clone())),
                        Priority::Normal,
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// The working-state poll loop.
    ///
    /// Blocks until no item remains queued, assembled or paged, with
    /// three early exits: explicit cancellation, a queue-heartbeat
    /// timeout (stalled broker workaround), and an absolute job timeout.
    /// Timeouts cancel, they never fail the loop.
    async fn wait_for_items(&self) {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let queue_timeout = Duration::from_millis(self.config.queue_timeout_ms);
        let job_timeout = Duration::from_millis(self.config.job_timeout_ms);

        self.handle.reset_clocks();

        loop {
            if self.handle.is_canceled() {
                info!("job canceled, leaving working state");
                return;
            }

            let snapshot = self.handle.tracker().snapshot();
            if snapshot.blocking() == 0 {
                info!(items = %snapshot.describe(), "all work items resolved");
                return;
            }

            if self.handle.heartbeat_elapsed() > queue_timeout {
                warn!(
                    elapsed_ms = self.handle.heartbeat_elapsed().as_millis() as u64,
                    items = %snapshot.describe(),
                    "no queue activity within the timeout window, canceling job"
                );
                self.cancel_with_broadcast("queue heartbeat timeout").await;
                return;
            }

            if self.handle.status_elapsed() > job_timeout {
                warn!(
                    elapsed_ms = self.handle.status_elapsed().as_millis() as u64,
                    items = %snapshot.describe(),
                    "no status update within the job timeout, canceling job"
                );
                self.cancel_with_broadcast("job timeout").await;
                return;
            }

            tokio::time::sleep(poll).await;
        }
    }

    /// Finalization: commit handshake, post-tasks, status flush and final
    /// state. Runs on every exit path of the run loop.
    async fn finish_edition(
        &self,
        edition: &Edition,
        site: &Site,
        edition_tasks: &[Arc<dyn EditionTask>],
    ) {
        let job_id = self.handle.job_id();

        // Committing is skipped entirely for a canceled job; the cancel
        // broadcast already told the delivery side to roll back.
        if !self.handle.is_canceled() {
            self.handle.set_state(JobState::Committing);
            self.commit(job_id).await;
        }

        // Buffered statuses are flushed before the post-tasks run so the
        // status callback sees every per-item result.
        if let Err(err) = self.batcher.flush(job_id).await {
            error!(job_id, error = %err, "failed to flush job statuses");
            self.handle.record_job_error(err.to_string());
        }

        self.handle.set_state(JobState::PostTasks);
        let ended_at = Utc::now();
        let elapsed = (ended_at - self.handle.started_at())
            .to_std()
            .unwrap_or_default();
        let snapshot = self.handle.tracker().snapshot();
        let succeeded = !self.handle.is_canceled()
            && self.handle.job_error().is_none()
            && !self.handle.task_failed()
            && snapshot.failed() == 0;

        let callback = StoredStatusCallback::new(self.store.clone(), job_id);
        let ctx = TaskContext {
            edition,
            site,
            job_id,
            started_at: self.handle.started_at(),
            ended_at: Some(ended_at),
            elapsed,
            succeeded,
            parameters: &edition.task_parameters,
            status: Some(&callback),
        };
        if tasks::run_post_tasks(edition_tasks, &ctx).await {
            self.handle.mark_task_failed();
        }

        self.handle.finish();
        let final_state = self.final_state();
        self.handle.set_state(final_state);

        info!(
            job_id,
            state = %final_state,
            items = %self.handle.tracker().snapshot().describe(),
            "publishing job finished"
        );
    }

    /// Sends the job-end control message and waits for the delivery
    /// side's acknowledgment, with a bounded ceiling.
    async fn commit(&self, job_id: crate::types::JobId) {
        let commit_timeout = Duration::from_millis(self.config.commit_timeout_ms);

        let sent = self
            .transport
            .send(
                PublishMessage::JobControl(JobControlMessage::End { job_id }),
                Priority::Normal,
            )
            .await;

        if let Err(err) = sent {
            // The acknowledgment can never arrive; force the committed
            // flag so the job cannot deadlock waiting for it.
            warn!(job_id, error = %err, "failed to send job-end message, forcing commit");
            self.handle.record_job_error(err.to_string());
            self.handle.resolve_commit(CommitAck {
                error: Some(err.to_string()),
            });
            return;
        }

        match self.handle.wait_for_commit(commit_timeout).await {
            Some(CommitAck { error: Some(error) }) => {
                warn!(job_id, "commit completed with error: {error}");
                self.handle.record_job_error(error);
            }
            Some(CommitAck { error: None }) => {
                info!(job_id, "commit acknowledged");
            }
            None => {
                warn!(job_id, "commit acknowledgment not received within the ceiling");
                self.handle.record_job_error("commit acknowledgment timed out");
            }
        }
    }

    /// Derives the terminal state from what the run recorded.
    fn final_state(&self) -> JobState {
        if self.handle.datasource_blocked() {
            return JobState::DatasourceMisconfigured;
        }

        if self.handle.is_canceled() {
            return if self.handle.canceled_by_user() {
                JobState::Cancelled
            } else {
                JobState::Aborted
            };
        }

        let snapshot = self.handle.tracker().snapshot();
        if self.handle.job_error().is_some() || self.handle.task_failed() || snapshot.failed() > 0 {
            JobState::CompletedWithFailure
        } else {
            JobState::Completed
        }
    }

    /// System-initiated cancellation: flips the flag and broadcasts the
    /// cancel so dispatch workers discard queued items.
    async fn cancel_with_broadcast(&self, reason: &str) {
        if !self.handle.request_cancel(false) {
            return;
        }

        info!(job_id = self.handle.job_id(), reason, "canceling job");
        let send = self
            .transport
            .send(
                PublishMessage::Cancel(CancelMessage {
                    job_id: self.handle.job_id(),
                    by_user: false,
                }),
                Priority::High,
            )
            .await;
        if let Err(err) = send {
            warn!(job_id = self.handle.job_id(), error = %err, "failed to broadcast cancellation");
        }
    }

    async fn send_operator_alert(&self, err: &crate::error::PublishError) {
        let alert = PublishMessage::Alert(AlertMessage {
            job_id: self.handle.job_id(),
            message: format!(
                "Publishing datasource configuration is no longer valid; \
                 a restart is required after the configuration is fixed: {err}"
            ),
        });

        if let Err(send_err) = self.transport.send(alert, Priority::High).await {
            error!(error = %send_err, "failed to send operator alert");
        }
    }
}
