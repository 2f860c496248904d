//! Pagination expansion.
//!
//! An assembly result flagged as logically paginated is split into one
//! work item per page before delivery. The original item's reference id
//! is preserved on page 1 so existing status correlation continues to
//! work; pages 2..N get freshly minted reference ids and are registered
//! as new tracked work so the job does not prematurely consider itself
//! complete.

use crate::assembly::Assembler;
use crate::error::PublishResult;
use crate::job::JobHandle;
use crate::types::{ItemState, WorkItem};

/// Expands a paginated assembly result into per-page work items.
///
/// Evaluates the page count through the assembler, then clones the base
/// item once per page with a regenerated delivery location. The
/// additional pages are registered with the job's tracker before this
/// function returns, so the tracked item count grows by `page_count - 1`.
pub async fn expand_pages<A>(
    assembler: &A,
    handle: &JobHandle,
    base: &WorkItem,
) -> PublishResult<Vec<WorkItem>>
where
    A: Assembler,
{
    let page_count = assembler.page_count(base).await?;

    let mut pages = Vec::with_capacity(page_count as usize);
    for page in 1..=page_count {
        let mut item = base.clone();
        item.page = page;
        item.delivery_path = assembler.page_location(base, page).await?;
        item.result = None;

        if page > 1 {
            item.reference_id = handle.mint_reference_id();
            handle
                .tracker()
                .update_state(item.reference_id, ItemState::Queued);
        }

        pages.push(item);
    }

    Ok(pages)
}
