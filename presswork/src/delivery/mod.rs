//! Delivery collaborator: persists assembled output to its destination
//! and removes unpublished artifacts.

pub mod base;
pub mod memory;

pub use base::{
    DefaultDeliveryPolicy, DeliveryManager, DeliveryOutcome, DeliveryPolicy, DeliveryResult,
};
pub use memory::MemoryDeliveryManager;
