use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ContentId, FolderId, JobId, ReferenceId, ServerId, SiteId, TemplateId};

/// Whether a work item publishes content to a destination or removes a
/// previously published artifact from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Publish,
    Unpublish,
}

/// Assembled output attached to a work item after assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// The unit of work flowing through the pipeline.
///
/// A [`WorkItem`] is owned exclusively by whichever stage currently holds
/// it: the job mints it during queueing, the transport carries it, and a
/// dispatch worker consumes it. Ownership transfers, the item is never
/// shared concurrently.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Job this item belongs to.
    pub job_id: JobId,
    /// Unique per-item-instance identifier within the job, used to
    /// correlate status updates.
    pub reference_id: ReferenceId,
    pub content_id: ContentId,
    pub revision: i32,
    pub template_id: TemplateId,
    /// Registered delivery handler name, e.g. `filesystem` or `ftp`.
    pub delivery_type: String,
    /// Assembly context the item is rendered under.
    pub delivery_context: i32,
    pub folder_id: FolderId,
    /// Page number for paginated output. 0 means the item is not paginated.
    pub page: u32,
    pub operation: Operation,
    /// Site the item is being published for.
    pub site_id: SiteId,
    /// Publishing server, when the edition targets a specific one.
    pub server_id: Option<ServerId>,
    /// URL used to invoke assembly for this item.
    pub assembly_url: String,
    /// Destination location the delivery handler writes to (or removes,
    /// for unpublish items).
    pub delivery_path: String,
    /// Pass-through string parameters for assembly and delivery.
    pub parameters: HashMap<String, String>,
    /// Assembled output, present after assembly has run.
    pub result: Option<ItemResult>,
}

impl WorkItem {
    /// Returns `true` when this item publishes content.
    pub fn is_publish(&self) -> bool {
        self.operation == Operation::Publish
    }

    /// Returns `true` when this item was produced by slot cloning and must
    /// not be paginated.
    pub fn is_slot_clone(&self) -> bool {
        self.parameters.contains_key("clone_origin")
    }

    /// The value-equality key identifying the published artifact this item
    /// produces.
    pub fn site_item_key(&self) -> SiteItemKey {
        SiteItemKey {
            content_id: self.content_id,
            template_id: self.template_id,
            delivery_type: self.delivery_type.clone(),
            delivery_context: self.delivery_context,
            page: self.page,
            site_id: self.site_id,
        }
    }

    /// Derives the unpublish work item for a previously published record of
    /// the same content, carrying the old location, page and folder.
    ///
    /// The caller is responsible for minting a fresh reference id for the
    /// derived item.
    pub fn to_unpublish_of(&self, record: &SiteItemRecord, reference_id: ReferenceId) -> WorkItem {
        let mut item = self.clone();
        item.reference_id = reference_id;
        item.operation = Operation::Unpublish;
        item.template_id = record.key.template_id;
        item.page = record.key.page;
        item.folder_id = record.folder_id.abs();
        item.delivery_path = record.delivery_path.clone();
        item.result = None;
        item
    }
}

/// Value-equality key identifying "the same published artifact" across
/// runs, used for location-change detection and duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteItemKey {
    pub content_id: ContentId,
    pub template_id: TemplateId,
    pub delivery_type: String,
    pub delivery_context: i32,
    pub page: u32,
    pub site_id: SiteId,
}

/// Durable record of a previously published artifact.
///
/// `folder_id` follows the moved-folder convention: a negative value means
/// the folder the item was published under has been moved since the last
/// publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteItemRecord {
    pub key: SiteItemKey,
    pub folder_id: FolderId,
    pub delivery_path: String,
    /// Opaque payload the delivery handler needs to remove the artifact.
    pub unpublish_data: Option<Vec<u8>>,
    pub server_id: Option<ServerId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem {
            job_id: 1,
            reference_id: 10,
            content_id: 301,
            revision: 2,
            template_id: 5,
            delivery_type: "filesystem".to_string(),
            delivery_context: 301,
            folder_id: 10,
            page: 0,
            operation: Operation::Publish,
            site_id: 1,
            server_id: None,
            assembly_url: "/assembler/render?sys_contentid=301".to_string(),
            delivery_path: "/site/a/index.html".to_string(),
            parameters: HashMap::new(),
            result: None,
        }
    }

    #[test]
    fn site_item_keys_compare_by_value() {
        let a = item().site_item_key();
        let b = item().site_item_key();
        assert_eq!(a, b);
    }

    #[test]
    fn derived_unpublish_carries_the_old_location() {
        let publish = item();
        let record = SiteItemRecord {
            key: SiteItemKey {
                page: 0,
                ..publish.site_item_key()
            },
            folder_id: -30,
            delivery_path: "/site/old/index.html".to_string(),
            unpublish_data: None,
            server_id: None,
        };

        let unpublish = publish.to_unpublish_of(&record, 99);
        assert_eq!(unpublish.operation, Operation::Unpublish);
        assert_eq!(unpublish.reference_id, 99);
        assert_eq!(unpublish.delivery_path, "/site/old/index.html");
        assert_eq!(unpublish.folder_id, 30);
        assert!(unpublish.result.is_none());
    }
}
