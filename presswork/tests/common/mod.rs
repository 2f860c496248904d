#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use presswork::assembly::MemoryAssembler;
use presswork::catalog::{
    ContentEntry, ContentList, ContentListBinding, Edition, EditionType, MemoryCatalog, Site,
    Template,
};
use presswork::delivery::MemoryDeliveryManager;
use presswork::error::{ErrorKind, PublishResult};
use presswork::job::JobHandle;
use presswork::job::tasks::{EditionTask, TaskContext};
use presswork::publish_error;
use presswork::service::PublisherService;
use presswork::store::MemoryStore;
// Re-exported so test files get the store traits' methods with the glob
// import.
pub use presswork::store::{SiteItemStore, StatusStore};
use presswork::transport::MemoryTransport;
use presswork::types::{
    ContentId, FolderId, JobState, Operation, SiteItemKey, SiteItemRecord, WorkItem,
};
use presswork_config::shared::{JobConfig, ServiceConfig};

pub type TestService = PublisherService<
    MemoryCatalog,
    MemoryAssembler,
    MemoryDeliveryManager,
    MemoryTransport,
    MemoryStore,
>;

/// The full set of in-memory collaborators plus a started service.
pub struct Harness {
    pub service: TestService,
    pub catalog: MemoryCatalog,
    pub assembler: MemoryAssembler,
    pub delivery: MemoryDeliveryManager,
    pub transport: MemoryTransport,
    pub store: MemoryStore,
}

/// Service configuration with fast polling and generous timeouts.
pub fn fast_config() -> ServiceConfig {
    ServiceConfig {
        dispatch_workers: 2,
        reap_after_ms: 60_000,
        demand_poll_ms: 50,
        cancellation_ttl_ms: 60_000,
        job: JobConfig {
            poll_interval_ms: 20,
            queue_timeout_ms: 10_000,
            job_timeout_ms: 20_000,
            commit_timeout_ms: 5_000,
            ..JobConfig::default()
        },
    }
}

/// Configuration whose job timeout fires quickly, for timeout scenarios.
pub fn quick_timeout_config() -> ServiceConfig {
    let mut config = fast_config();
    config.job.queue_timeout_ms = 10_000;
    config.job.job_timeout_ms = 300;
    config
}

/// Builds and starts a service over fresh in-memory collaborators.
pub async fn started_harness(config: ServiceConfig) -> Harness {
    let catalog = MemoryCatalog::new();
    let assembler = MemoryAssembler::new();
    let delivery = MemoryDeliveryManager::new();
    let transport = MemoryTransport::new();
    let store = MemoryStore::new();

    let mut service = PublisherService::new(
        config,
        catalog.clone(),
        assembler.clone(),
        delivery.clone(),
        transport.clone(),
        store.clone(),
    )
    .unwrap();
    service.start().await.unwrap();

    Harness {
        service,
        catalog,
        assembler,
        delivery,
        transport,
        store,
    }
}

/// Well-known fixture ids.
pub const SITE: u64 = 1;
pub const EDITION: u64 = 1;
pub const CONTENT_LIST: u64 = 1;
pub const TEMPLATE: u64 = 5;
pub const CONTEXT: i32 = 301;

/// Seeds the catalog with one site, one template and one normal edition
/// bound to one filesystem content list holding `entries`.
pub fn seed_edition(catalog: &MemoryCatalog, entries: Vec<ContentEntry>) {
    seed_edition_with_type(catalog, entries, "filesystem");
}

pub fn seed_edition_with_type(
    catalog: &MemoryCatalog,
    entries: Vec<ContentEntry>,
    delivery_type: &str,
) {
    catalog
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
                name: "main".to_string(),
                delivery_type: delivery_type.to_string(),
            },
            entries,
        )
        .add_edition(Edition {
            id: EDITION,
            name: "nightly".to_string(),
            site_id: SITE,
            server_id: None,
            edition_type: EditionType::Normal,
            content_lists: vec![ContentListBinding {
                content_list_id: CONTENT_LIST,
                sequence: 0,
                delivery_context: CONTEXT,
            }],
            task_parameters: HashMap::new(),
        })
        .set_site_folders(SITE, HashSet::from([10, 20, 30, 40]));
}

/// A publish entry with the fixture template.
pub fn entry(content_id: ContentId, folder_id: FolderId, path: &str) -> ContentEntry {
    ContentEntry {
        content_id,
        revision: 1,
        template_id: TEMPLATE,
        folder_id,
        operation: Operation::Publish,
        assembly_url: format!("/assembler/render?sys_contentid={content_id}"),
        delivery_path: path.to_string(),
        parameters: HashMap::new(),
    }
}

/// A work item with fixture defaults, for exercising detectors directly.
pub fn work_item(reference_id: u64, content_id: ContentId, folder_id: FolderId, path: &str) -> WorkItem {
    WorkItem {
        job_id: 1,
        reference_id,
        content_id,
        revision: 1,
        template_id: TEMPLATE,
        delivery_type: "filesystem".to_string(),
        delivery_context: CONTEXT,
        folder_id,
        page: 0,
        operation: Operation::Publish,
        site_id: SITE,
        server_id: None,
        assembly_url: format!("/assembler/render?sys_contentid={content_id}"),
        delivery_path: path.to_string(),
        parameters: HashMap::new(),
        result: None,
    }
}

/// A previously-published record with fixture defaults.
pub fn site_record(content_id: ContentId, folder_id: FolderId, page: u32, path: &str) -> SiteItemRecord {
    SiteItemRecord {
        key: SiteItemKey {
            content_id,
            template_id: TEMPLATE,
            delivery_type: "filesystem".to_string(),
            delivery_context: CONTEXT,
            page,
            site_id: SITE,
        },
        folder_id,
        delivery_path: path.to_string(),
        unpublish_data: None,
        server_id: None,
    }
}

/// Blocks until the job reaches the target state, with a test-sized
/// timeout.
pub async fn wait_for_job_state(handle: &JobHandle, target: JobState) {
    let mut rx = handle.watch_state();
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|state| *state == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for job state {target}"))
        .expect("job state channel closed");
}

/// Blocks until the job reaches any terminal state and returns it.
pub async fn wait_for_terminal(handle: &JobHandle) -> JobState {
    let mut rx = handle.watch_state();
    let state = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|state| state.is_terminal()),
    )
    .await
    .expect("timed out waiting for a terminal job state")
    .expect("job state channel closed");

    *state
}

/// An edition task that records its invocations.
pub struct RecordingTask {
    pub name: String,
    pub sequence: i32,
    pub continue_on_failure: bool,
    pub fail: bool,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingTask {
    pub fn new(
        name: &str,
        sequence: i32,
        continue_on_failure: bool,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sequence,
            continue_on_failure,
            fail,
            log,
        })
    }
}

#[async_trait]
impl EditionTask for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn sequence(&self) -> i32 {
        self.sequence
    }

    fn continue_on_failure(&self) -> bool {
        self.continue_on_failure
    }

    async fn perform(&self, ctx: &TaskContext<'_>) -> PublishResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, ctx.succeeded));

        if self.fail {
            return Err(publish_error!(
                ErrorKind::TaskFailed,
                "Task failed",
                format!("task '{}' was configured to fail", self.name)
            ));
        }

        Ok(())
    }
}
