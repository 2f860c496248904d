use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::assembly::base::{Assembler, AssemblyOutput};
use crate::error::{ErrorKind, PublishResult};
use crate::publish_error;
use crate::types::{ContentId, ItemResult, WorkItem};

/// Pagination behavior configured for one content id.
#[derive(Debug, Clone)]
struct Pagination {
    page_count: u32,
    /// Explicit per-page locations; pages without an entry fall back to a
    /// derived location.
    locations: HashMap<u32, String>,
}

#[derive(Default)]
struct Inner {
    payloads: HashMap<ContentId, Vec<u8>>,
    paginated: HashMap<ContentId, Pagination>,
    failures: HashMap<ContentId, String>,
    /// Items held mid-assembly until released, keyed by content id.
    gates: HashMap<ContentId, watch::Sender<bool>>,
}

/// In-memory assembler for tests and embedders without a rendering
/// engine.
///
/// Produces configurable payloads, can flag content as paginated with a
/// fixed page count, can fail assembly of specific content ids, and can
/// hold items mid-assembly until released, which lets tests pin a job in
/// its working state.
#[derive(Clone, Default)]
pub struct MemoryAssembler {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload returned for a content id. Content without a
    /// configured payload assembles to a placeholder rendering.
    pub fn set_payload(&self, content_id: ContentId, payload: impl Into<Vec<u8>>) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .payloads
            .insert(content_id, payload.into());
        self
    }

    /// Flags a content id as paginated with the given page count.
    pub fn set_paginated(&self, content_id: ContentId, page_count: u32) -> &Self {
        self.inner.lock().unwrap().paginated.insert(
            content_id,
            Pagination {
                page_count,
                locations: HashMap::new(),
            },
        );
        self
    }

    /// Sets an explicit delivery location for one page of a paginated
    /// content id.
    pub fn set_page_location(
        &self,
        content_id: ContentId,
        page: u32,
        location: impl ToString,
    ) -> &Self {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pagination) = inner.paginated.get_mut(&content_id) {
            pagination.locations.insert(page, location.to_string());
        }
        self
    }

    /// Makes assembly of a content id fail with the given message.
    pub fn fail_content(&self, content_id: ContentId, message: impl ToString) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(content_id, message.to_string());
        self
    }

    /// Holds assembly of a content id until [`MemoryAssembler::release`]
    /// is called for it.
    pub fn hold(&self, content_id: ContentId) -> &Self {
        let (tx, _rx) = watch::channel(false);
        self.inner.lock().unwrap().gates.insert(content_id, tx);
        self
    }

    /// Releases a previously held content id.
    pub fn release(&self, content_id: ContentId) -> &Self {
        if let Some(gate) = self.inner.lock().unwrap().gates.get(&content_id) {
            let _ = gate.send(true);
        }
        self
    }

    async fn wait_for_gate(&self, content_id: ContentId) {
        let gate = {
            let inner = self.inner.lock().unwrap();
            inner.gates.get(&content_id).map(|tx| tx.subscribe())
        };

        if let Some(mut gate) = gate {
            // A release sent before we subscribed is still observed: the
            // watch channel keeps the latest value.
            let _ = gate.wait_for(|released| *released).await;
        }
    }
}

impl Assembler for MemoryAssembler {
    async fn assemble(&self, item: &mut WorkItem) -> PublishResult<AssemblyOutput> {
        self.wait_for_gate(item.content_id).await;

        let (payload, paginated, failure) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.payloads.get(&item.content_id).cloned(),
                inner.paginated.contains_key(&item.content_id),
                inner.failures.get(&item.content_id).cloned(),
            )
        };

        if let Some(message) = failure {
            return Err(publish_error!(
                ErrorKind::AssemblyFailed,
                "Assembly failed",
                message
            ));
        }

        let data = payload.unwrap_or_else(|| {
            format!(
                "<html>content {} revision {} template {}</html>",
                item.content_id, item.revision, item.template_id
            )
            .into_bytes()
        });

        item.result = Some(ItemResult {
            data,
            mime_type: "text/html".to_string(),
        });

        Ok(AssemblyOutput { paginated })
    }

    async fn fill_template_metadata(&self, item: &mut WorkItem) -> PublishResult<()> {
        let template = item.template_id.to_string();
        item.parameters.entry("template".to_string()).or_insert(template);
        Ok(())
    }

    async fn page_count(&self, item: &WorkItem) -> PublishResult<u32> {
        let inner = self.inner.lock().unwrap();
        inner
            .paginated
            .get(&item.content_id)
            .map(|pagination| pagination.page_count)
            .ok_or_else(|| {
                publish_error!(
                    ErrorKind::PaginationFailed,
                    "Page count unavailable",
                    format!("content {} is not configured as paginated", item.content_id)
                )
            })
    }

    async fn page_location(&self, item: &WorkItem, page: u32) -> PublishResult<String> {
        let inner = self.inner.lock().unwrap();
        if let Some(pagination) = inner.paginated.get(&item.content_id)
            && let Some(location) = pagination.locations.get(&page)
        {
            return Ok(location.clone());
        }

        // Derived default: page 1 keeps the original location, later pages
        // get a numbered suffix.
        if page <= 1 {
            Ok(item.delivery_path.clone())
        } else {
            Ok(format!("{}.p{page}", item.delivery_path))
        }
    }
}
