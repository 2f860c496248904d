//! Read-only configuration collaborator: editions, sites, content lists
//! and templates.

pub mod base;
pub mod memory;

pub use base::{
    Catalog, ContentEntry, ContentList, ContentListBinding, Edition, EditionType, Site, Template,
};
pub use memory::MemoryCatalog;
