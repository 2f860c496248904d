mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::*;
use presswork::error::PublishResult;
use presswork::job::tasks::{EditionTask, TaskContext};
use presswork::types::JobState;
use presswork_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn tasks_run_in_ascending_sequence_order() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(&harness.catalog, vec![entry(301, 10, "/site/a.html")]);

    let log = Arc::new(Mutex::new(Vec::new()));
    // Registered out of order on purpose.
    harness
        .catalog
        .add_task(EDITION, RecordingTask::new("pre-late", -1, false, false, log.clone()))
        .add_task(EDITION, RecordingTask::new("post-late", 10, false, false, log.clone()))
        .add_task(EDITION, RecordingTask::new("pre-early", -5, false, false, log.clone()))
        .add_task(EDITION, RecordingTask::new("post-early", 0, false, false, log.clone()));

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();

    assert_eq!(wait_for_terminal(&handle).await, JobState::Completed);
    assert_eq!(
        log.lock().unwrap().clone(),
        vec![
            "pre-early:true".to_string(),
            "pre-late:true".to_string(),
            "post-early:true".to_string(),
            "post-late:true".to_string()
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_pre_task_aborts_the_job_before_queueing() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(&harness.catalog, vec![entry(301, 10, "/site/a.html")]);

    let log = Arc::new(Mutex::new(Vec::new()));
    harness
        .catalog
        .add_task(EDITION, RecordingTask::new("guard", -1, false, true, log.clone()))
        .add_task(EDITION, RecordingTask::new("report", 0, true, false, log.clone()));

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();

    assert_eq!(wait_for_terminal(&handle).await, JobState::Aborted);

    // Nothing was queued, but the post task still ran with success=false.
    let status = harness.service.status(job_id).unwrap();
    assert_eq!(status.items.total, 0);
    assert_eq!(
        log.lock().unwrap().clone(),
        vec!["guard:true".to_string(), "report:false".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn tolerated_pre_task_failure_lets_the_job_publish() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(&harness.catalog, vec![entry(301, 10, "/site/a.html")]);

    let log = Arc::new(Mutex::new(Vec::new()));
    harness
        .catalog
        .add_task(EDITION, RecordingTask::new("flaky", -1, true, true, log.clone()));

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();

    // The item publishes, but the task failure is reflected in the final
    // state.
    assert_eq!(
        wait_for_terminal(&handle).await,
        JobState::CompletedWithFailure
    );
    let status = harness.service.status(job_id).unwrap();
    assert_eq!(status.items.delivered(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_post_task_stops_the_remaining_post_tasks() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(&harness.catalog, vec![entry(301, 10, "/site/a.html")]);

    let log = Arc::new(Mutex::new(Vec::new()));
    harness
        .catalog
        .add_task(EDITION, RecordingTask::new("first", 0, false, true, log.clone()))
        .add_task(EDITION, RecordingTask::new("second", 1, true, false, log.clone()));

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();

    assert_eq!(
        wait_for_terminal(&handle).await,
        JobState::CompletedWithFailure
    );
    assert_eq!(log.lock().unwrap().clone(), vec!["first:true".to_string()]);
}

/// A post task that counts the item statuses visible through its
/// callback.
struct CountingTask {
    seen: Arc<Mutex<usize>>,
}

#[async_trait]
impl EditionTask for CountingTask {
    fn name(&self) -> &str {
        "counting"
    }

    fn sequence(&self) -> i32 {
        0
    }

    fn continue_on_failure(&self) -> bool {
        true
    }

    async fn perform(&self, ctx: &TaskContext<'_>) -> PublishResult<()> {
        let statuses = ctx
            .status
            .expect("post tasks receive a status callback")
            .item_statuses()
            .await?;
        *self.seen.lock().unwrap() = statuses.len();

        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn post_tasks_see_the_per_item_publish_results() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(
        &harness.catalog,
        vec![
            entry(301, 10, "/site/a.html"),
            entry(302, 10, "/site/b.html"),
        ],
    );

    let seen = Arc::new(Mutex::new(0));
    harness
        .catalog
        .add_task(EDITION, Arc::new(CountingTask { seen: seen.clone() }));

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();

    assert_eq!(wait_for_terminal(&handle).await, JobState::Completed);
    assert_eq!(*seen.lock().unwrap(), 2);
}
