mod common;

use common::*;
use presswork::error::ErrorKind;
use presswork::types::JobState;
use presswork_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn status_queries_track_the_job_lifecycle() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(&harness.catalog, vec![entry(301, 10, "/site/a.html")]);

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();

    assert_eq!(wait_for_terminal(&handle).await, JobState::Completed);

    let status = harness.service.status(job_id).unwrap();
    assert_eq!(status.job_id, job_id);
    assert_eq!(status.edition_id, EDITION);
    assert!(status.ended_at.is_some());
    assert!(status.message.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_job_is_an_error() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    let err = harness.service.status(12345).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownJob);

    let err = harness.service.cancel_job(12345).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownJob);
}

#[tokio::test(flavor = "multi_thread")]
async fn statuses_are_persisted_in_bounded_batches() {
    init_test_tracing();

    let mut config = fast_config();
    config.job.batch.max_size = 2;

    let harness = started_harness(config).await;
    seed_edition(
        &harness.catalog,
        vec![
            entry(301, 10, "/site/1.html"),
            entry(302, 10, "/site/2.html"),
            entry(303, 10, "/site/3.html"),
            entry(304, 10, "/site/4.html"),
            entry(305, 10, "/site/5.html"),
        ],
    );

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();
    assert_eq!(wait_for_terminal(&handle).await, JobState::Completed);

    // Five rows in two full batches plus the end-of-job flush.
    assert_eq!(harness.store.statuses_for_job(job_id).await.unwrap().len(), 5);
    assert_eq!(harness.store.persist_batches().await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_workers_and_flushes() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(&harness.catalog, vec![entry(301, 10, "/site/a.html")]);

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();
    assert_eq!(wait_for_terminal(&handle).await, JobState::Completed);

    harness.service.shutdown_and_wait().await.unwrap();

    // The transport rejects sends once the service is gone.
    assert!(harness.transport.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_configuration_is_rejected_up_front() {
    init_test_tracing();

    let mut config = fast_config();
    config.dispatch_workers = 0;

    let result = TestService::new(
        config,
        presswork::catalog::MemoryCatalog::new(),
        presswork::assembly::MemoryAssembler::new(),
        presswork::delivery::MemoryDeliveryManager::new(),
        presswork::transport::MemoryTransport::new(),
        presswork::store::MemoryStore::new(),
    );

    assert_eq!(result.unwrap_err().kind(), ErrorKind::ConfigError);
}
