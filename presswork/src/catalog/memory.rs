use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::catalog::base::{Catalog, ContentEntry, ContentList, Edition, Site, Template};
use crate::error::{ErrorKind, PublishResult};
use crate::job::tasks::EditionTask;
use crate::publish_error;
use crate::types::{ContentListId, EditionId, FolderId, SiteId, TemplateId};

/// Inner state of [`MemoryCatalog`].
#[derive(Default)]
struct Inner {
    editions: HashMap<EditionId, Edition>,
    sites: HashMap<SiteId, Site>,
    content_lists: HashMap<ContentListId, ContentList>,
    entries: HashMap<ContentListId, Vec<ContentEntry>>,
    templates: HashMap<TemplateId, Template>,
    site_folders: HashMap<SiteId, HashSet<FolderId>>,
    tasks: HashMap<EditionId, Vec<Arc<dyn EditionTask>>>,
    /// Content lists whose evaluation fails, for exercising job-level
    /// error handling.
    failing_lists: HashMap<ContentListId, String>,
}

/// In-memory configuration store.
///
/// Holds editions, sites, content lists, templates and tasks entirely in
/// memory. Used by tests and by embedders that build their configuration
/// programmatically.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edition(&self, edition: Edition) -> &Self {
        self.inner
            .write()
            .unwrap()
            .editions
            .insert(edition.id, edition);
        self
    }

    pub fn add_site(&self, site: Site) -> &Self {
        self.inner.write().unwrap().sites.insert(site.id, site);
        self
    }

    pub fn add_content_list(&self, list: ContentList, entries: Vec<ContentEntry>) -> &Self {
        let mut inner = self.inner.write().unwrap();
        inner.entries.insert(list.id, entries);
        inner.content_lists.insert(list.id, list);
        self
    }

    pub fn add_template(&self, template: Template) -> &Self {
        self.inner
            .write()
            .unwrap()
            .templates
            .insert(template.id, template);
        self
    }

    pub fn set_site_folders(&self, site_id: SiteId, folders: HashSet<FolderId>) -> &Self {
        self.inner
            .write()
            .unwrap()
            .site_folders
            .insert(site_id, folders);
        self
    }

    pub fn add_task(&self, edition_id: EditionId, task: Arc<dyn EditionTask>) -> &Self {
        self.inner
            .write()
            .unwrap()
            .tasks
            .entry(edition_id)
            .or_default()
            .push(task);
        self
    }

    /// Makes evaluation of a content list fail with the given message.
    pub fn fail_content_list(&self, list_id: ContentListId, message: impl ToString) -> &Self {
        self.inner
            .write()
            .unwrap()
            .failing_lists
            .insert(list_id, message.to_string());
        self
    }
}

impl Catalog for MemoryCatalog {
    async fn edition(&self, id: EditionId) -> PublishResult<Edition> {
        self.inner
            .read()
            .unwrap()
            .editions
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                publish_error!(
                    ErrorKind::EditionNotFound,
                    "Edition not found",
                    format!("no edition with id {id}")
                )
            })
    }

    async fn site(&self, id: SiteId) -> PublishResult<Site> {
        self.inner
            .read()
            .unwrap()
            .sites
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                publish_error!(
                    ErrorKind::SiteNotFound,
                    "Site not found",
                    format!("no site with id {id}")
                )
            })
    }

    async fn content_list(&self, id: ContentListId) -> PublishResult<ContentList> {
        self.inner
            .read()
            .unwrap()
            .content_lists
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                publish_error!(
                    ErrorKind::ContentListNotFound,
                    "Content list not found",
                    format!("no content list with id {id}")
                )
            })
    }

    async fn content_entries(
        &self,
        list: &ContentList,
        _delivery_context: i32,
    ) -> PublishResult<Vec<ContentEntry>> {
        let inner = self.inner.read().unwrap();

        if let Some(message) = inner.failing_lists.get(&list.id) {
            return Err(publish_error!(
                ErrorKind::ContentListEvaluationFailed,
                "Content list evaluation failed",
                message.clone()
            ));
        }

        Ok(inner.entries.get(&list.id).cloned().unwrap_or_default())
    }

    async fn template(&self, id: TemplateId) -> PublishResult<Template> {
        self.inner
            .read()
            .unwrap()
            .templates
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                publish_error!(
                    ErrorKind::TemplateNotFound,
                    "Template not found",
                    format!("no template with id {id}")
                )
            })
    }

    async fn site_folders(&self, site_id: SiteId) -> PublishResult<HashSet<FolderId>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .site_folders
            .get(&site_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn edition_tasks(&self, edition_id: EditionId) -> PublishResult<Vec<Arc<dyn EditionTask>>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .tasks
            .get(&edition_id)
            .cloned()
            .unwrap_or_default())
    }
}
