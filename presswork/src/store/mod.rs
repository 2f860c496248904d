//! Persistent stores: batched item status history and the site-item
//! records used for location-change detection.

pub mod base;
pub mod memory;

pub use base::{PublishScope, SiteItemStore, StatusStore};
pub use memory::MemoryStore;
