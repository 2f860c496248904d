use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use crate::error::PublishResult;
use crate::job::tasks::EditionTask;
use crate::types::{
    ContentId, ContentListId, EditionId, FolderId, Operation, ServerId, SiteId, TemplateId,
};

/// How an edition's content is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditionType {
    /// A scheduled full pass over the edition's content lists. Only normal
    /// editions run unpublish-on-move detection.
    Normal,
    /// An ad hoc publish of specific items queued on demand.
    Demand,
}

/// A configured publishing run definition.
///
/// Immutable input for the duration of a job run.
#[derive(Debug, Clone)]
pub struct Edition {
    pub id: EditionId,
    pub name: String,
    pub site_id: SiteId,
    pub server_id: Option<ServerId>,
    pub edition_type: EditionType,
    /// Content lists in execution order.
    pub content_lists: Vec<ContentListBinding>,
    /// Parameters handed to every task of this edition.
    pub task_parameters: HashMap<String, String>,
}

/// Association of a content list with an edition.
#[derive(Debug, Clone)]
pub struct ContentListBinding {
    pub content_list_id: ContentListId,
    /// Execution order within the edition.
    pub sequence: i32,
    /// Assembly/delivery context items from this list are rendered under.
    pub delivery_context: i32,
}

/// A named, ordered source of candidate items for one edition pass.
#[derive(Debug, Clone)]
pub struct ContentList {
    pub id: ContentListId,
    pub name: String,
    /// Delivery handler items from this list are routed to.
    pub delivery_type: String,
}

/// One candidate produced by evaluating a content list.
#[derive(Debug, Clone)]
pub struct ContentEntry {
    pub content_id: ContentId,
    pub revision: i32,
    pub template_id: TemplateId,
    pub folder_id: FolderId,
    pub operation: Operation,
    pub assembly_url: String,
    pub delivery_path: String,
    pub parameters: HashMap<String, String>,
}

/// A published site definition.
#[derive(Debug, Clone)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub base_url: String,
    pub root_folder: FolderId,
}

/// An assembly template.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub mime_type: String,
    /// Whether output of this template can span multiple pages.
    pub paginated: bool,
}

/// Read-only lookups against the configuration store.
///
/// Errors from the lookup methods signal "not found" and abort job
/// startup; content-list evaluation errors surface as job-level failures.
pub trait Catalog {
    fn edition(&self, id: EditionId) -> impl Future<Output = PublishResult<Edition>> + Send;

    fn site(&self, id: SiteId) -> impl Future<Output = PublishResult<Site>> + Send;

    fn content_list(
        &self,
        id: ContentListId,
    ) -> impl Future<Output = PublishResult<ContentList>> + Send;

    /// Evaluates a content list into its candidate entries for the given
    /// delivery context. Potentially expensive; the job batches the
    /// resulting items so this evaluation never starves cancellation.
    fn content_entries(
        &self,
        list: &ContentList,
        delivery_context: i32,
    ) -> impl Future<Output = PublishResult<Vec<ContentEntry>>> + Send;

    fn template(&self, id: TemplateId) -> impl Future<Output = PublishResult<Template>> + Send;

    /// All folder ids under a site's root, used to resolve moved-folder
    /// ambiguity during location-change detection.
    fn site_folders(
        &self,
        site_id: SiteId,
    ) -> impl Future<Output = PublishResult<HashSet<FolderId>>> + Send;

    /// Tasks configured for an edition, pre and post together.
    fn edition_tasks(
        &self,
        edition_id: EditionId,
    ) -> impl Future<Output = PublishResult<Vec<Arc<dyn EditionTask>>>> + Send;
}
