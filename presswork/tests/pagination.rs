mod common;

use common::*;
use presswork::assembly::MemoryAssembler;
use presswork::job::JobHandle;
use presswork::types::{ItemState, JobState};
use presswork::workers::pagination::expand_pages;
use presswork_telemetry::tracing::init_test_tracing;

#[tokio::test]
async fn expansion_preserves_the_original_reference_id_on_page_one() {
    init_test_tracing();

    let assembler = MemoryAssembler::new();
    assembler.set_paginated(400, 3);

    let handle = JobHandle::new(1, 1, 1);
    let mut base = work_item(0, 400, 10, "/site/doc.html");
    base.reference_id = handle.mint_reference_id();
    handle
        .tracker()
        .update_state(base.reference_id, ItemState::Queued);

    let before = handle.tracker().snapshot().total;
    let pages = expand_pages(&assembler, &handle, &base).await.unwrap();

    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].reference_id, base.reference_id);
    assert_eq!(pages[0].page, 1);

    // Pages 2 and 3 carry fresh, distinct reference ids.
    assert_ne!(pages[1].reference_id, base.reference_id);
    assert_ne!(pages[2].reference_id, base.reference_id);
    assert_ne!(pages[1].reference_id, pages[2].reference_id);

    // Exactly two new tracked items, not three.
    assert_eq!(handle.tracker().snapshot().total, before + 2);
}

#[tokio::test]
async fn page_locations_are_regenerated_per_page() {
    init_test_tracing();

    let assembler = MemoryAssembler::new();
    assembler.set_paginated(400, 3);
    assembler.set_page_location(400, 3, "/site/doc-part-three.html");

    let handle = JobHandle::new(1, 1, 1);
    let base = work_item(1, 400, 10, "/site/doc.html");

    let pages = expand_pages(&assembler, &handle, &base).await.unwrap();
    assert_eq!(pages[0].delivery_path, "/site/doc.html");
    assert_eq!(pages[1].delivery_path, "/site/doc.html.p2");
    assert_eq!(pages[2].delivery_path, "/site/doc-part-three.html");
}

#[tokio::test(flavor = "multi_thread")]
async fn paginated_item_publishes_every_page() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(&harness.catalog, vec![entry(400, 10, "/site/doc.html")]);
    harness.assembler.set_paginated(400, 3);

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();

    assert_eq!(wait_for_terminal(&handle).await, JobState::Completed);

    let status = harness.service.status(job_id).unwrap();
    assert_eq!(status.items.total, 3);
    assert_eq!(status.items.delivered(), 3);
    assert_eq!(status.items.failed(), 0);

    let locations = harness.delivery.committed_locations().await;
    assert_eq!(
        locations,
        vec![
            "/site/doc.html".to_string(),
            "/site/doc.html.p2".to_string(),
            "/site/doc.html.p3".to_string()
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shrinking_page_count_unpublishes_the_extra_page() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_edition(&harness.catalog, vec![entry(400, 10, "/site/doc.html")]);
    harness.assembler.set_paginated(400, 2);

    // A previous run published three pages.
    for (page, path) in [
        (1, "/site/doc.html"),
        (2, "/site/doc.html.p2"),
        (3, "/site/doc.html.p3"),
    ] {
        harness
            .store
            .seed_site_item(site_record(400, 10, page, path))
            .await;
    }

    let job_id = harness.service.start_job(EDITION).await.unwrap();
    let handle = harness.service.job(job_id).unwrap();

    assert_eq!(wait_for_terminal(&handle).await, JobState::Completed);

    // Two pages published, one stale page unpublished.
    let status = harness.service.status(job_id).unwrap();
    assert_eq!(status.items.total, 3);
    assert_eq!(status.items.delivered(), 3);

    let records = harness.store.site_items().await;
    assert!(
        records
            .iter()
            .all(|record| record.delivery_path != "/site/doc.html.p3")
    );
}
