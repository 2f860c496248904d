use std::future::Future;

use crate::error::PublishResult;
use crate::types::WorkItem;

/// Outcome of assembling one work item.
///
/// The rendered payload is written into the item's `result`; this type
/// carries only the flags the dispatcher needs to route the item onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyOutput {
    /// The result logically spans multiple pages and must be expanded
    /// into per-page work items before delivery.
    pub paginated: bool,
}

/// Trait for systems that render content items into deliverable output.
///
/// Implementations may be retried: the engine tolerates at-least-once
/// message delivery, so assembling the same item twice must be safe.
pub trait Assembler {
    /// Renders the item and attaches the result payload to it.
    fn assemble(
        &self,
        item: &mut WorkItem,
    ) -> impl Future<Output = PublishResult<AssemblyOutput>> + Send;

    /// Backfills template metadata on items that are missing it, e.g.
    /// unpublish items that skipped assembly.
    fn fill_template_metadata(
        &self,
        item: &mut WorkItem,
    ) -> impl Future<Output = PublishResult<()>> + Send;

    /// Evaluates the page-count expression of the item's template against
    /// its binding context.
    fn page_count(&self, item: &WorkItem) -> impl Future<Output = PublishResult<u32>> + Send;

    /// Regenerates the delivery location of one page of a paginated item,
    /// honoring the delivery-context substitution used during location
    /// generation.
    fn page_location(
        &self,
        item: &WorkItem,
        page: u32,
    ) -> impl Future<Output = PublishResult<String>> + Send;
}
