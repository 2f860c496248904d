mod common;

use std::time::Duration;

use common::*;
use presswork::types::JobState;
use presswork_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn job_stays_working_while_any_item_is_outstanding() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(
        &harness.catalog,
        vec![
            entry(301, 10, "/site/a.html"),
            entry(302, 10, "/site/b.html"),
            entry(303, 10, "/site/c.html"),
        ],
    );
    // The third item never finishes assembly until released.
    harness.assembler.hold(303);

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();
    wait_for_job_state(&handle, JobState::Working).await;

    // Wait until the two unheld items are delivered.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = harness.service.status(job_id).unwrap();
        if status.items.delivered() == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "items never delivered"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // One item still blocks the job: it must not leave the working state.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = harness.service.status(job_id).unwrap();
    assert_eq!(status.state, JobState::Working);
    assert_eq!(status.items.delivered(), 2);

    harness.assembler.release(303);
    assert_eq!(wait_for_terminal(&handle).await, JobState::Completed);
    assert_eq!(harness.service.status(job_id).unwrap().items.delivered(), 3);
}
