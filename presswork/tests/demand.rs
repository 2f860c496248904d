mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::*;
use presswork::catalog::{ContentList, ContentListBinding, Edition, EditionType, Site, Template};
use presswork_telemetry::tracing::init_test_tracing;

/// Seeds a demand-type edition whose content list carries no scheduled
/// entries; all of its work arrives through the demand queue.
fn seed_demand_edition(harness: &Harness) {
    harness
        .catalog
        .add_site(Site {
            id: SITE,
            name: "corporate".to_string(),
            base_url: "https://www.example.com".to_string(),
            root_folder: 1,
        })
        .add_template(Template {
            id: TEMPLATE,
            name: "page".to_string(),
            mime_type: "text/html".to_string(),
            paginated: false,
        })
        .add_content_list(
            ContentList {
                id: CONTENT_LIST,
                name: "demand".to_string(),
                delivery_type: "filesystem".to_string(),
            },
            Vec::new(),
        )
        .add_edition(Edition {
            id: EDITION,
            name: "on-demand".to_string(),
            site_id: SITE,
            server_id: None,
            edition_type: EditionType::Demand,
            content_lists: vec![ContentListBinding {
                content_list_id: CONTENT_LIST,
                sequence: 0,
                delivery_context: CONTEXT,
            }],
            task_parameters: HashMap::new(),
        });
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_demand_work_is_published_by_the_monitor() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_demand_edition(&harness);

    harness
        .service
        .queue_demand_work(EDITION, vec![entry(501, 10, "/site/on-demand.html")])
        .await
        .unwrap();

    // The monitor notices the queued work, starts a job for the edition
    // and the item flows through assembly, delivery and commit.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let locations = harness.delivery.committed_locations().await;
        if locations.contains(&"/site/on-demand.html".to_string()) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "demand work was never published"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn demand_work_for_two_editions_runs_independently() {
    init_test_tracing();

    let harness = started_harness(fast_config()).await;
    seed_demand_edition(&harness);

    // A second demand edition over its own content list.
    harness
        .catalog
        .add_content_list(
            ContentList {
                id: 2,
                name: "demand-two".to_string(),
                delivery_type: "filesystem".to_string(),
            },
            Vec::new(),
        )
        .add_edition(Edition {
            id: 2,
            name: "on-demand-two".to_string(),
            site_id: SITE,
            server_id: None,
            edition_type: EditionType::Demand,
            content_lists: vec![ContentListBinding {
                content_list_id: 2,
                sequence: 0,
                delivery_context: CONTEXT,
            }],
            task_parameters: HashMap::new(),
        });

    harness
        .service
        .queue_demand_work(EDITION, vec![entry(501, 10, "/site/one.html")])
        .await
        .unwrap();
    harness
        .service
        .queue_demand_work(2, vec![entry(502, 10, "/site/two.html")])
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let locations = harness.delivery.committed_locations().await;
        if locations.contains(&"/site/one.html".to_string())
            && locations.contains(&"/site/two.html".to_string())
        {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "demand work was never published"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
