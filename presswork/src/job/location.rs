//! Location-change detection.
//!
//! Before a normal edition publishes its items, previously published
//! locations are compared against the locations about to be written. An
//! item whose location changed gets a derived unpublish work item for the
//! old location, queued alongside the pass's ordinary unpublish items, so
//! stale artifacts disappear in the same run that writes the new ones.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::PublishResult;
use crate::store::{PublishScope, SiteItemStore};
use crate::types::{ContentId, FolderId, SiteItemRecord, WorkItem};

/// One detected move: the candidate about to publish and the
/// previously-published record whose location it supersedes.
#[derive(Debug, Clone)]
pub struct MoveMatch {
    /// Index of the candidate in the slice handed to [`detect_moves`].
    pub candidate_index: usize,
    pub record: SiteItemRecord,
}

/// Scans a batch of about-to-publish work items for location changes.
///
/// Candidates that are not publishing, or have an empty delivery path,
/// are skipped: there is nothing to compare against. For the rest, the
/// previously published records of the same content under the given scope
/// and delivery context are matched folder by folder; when folders do not
/// line up, the moved-folder heuristic below reconciles the folder sets.
pub async fn detect_moves<S>(
    store: &S,
    scope: PublishScope,
    delivery_context: i32,
    site_folders: &HashSet<FolderId>,
    candidates: &[WorkItem],
) -> PublishResult<Vec<MoveMatch>>
where
    S: SiteItemStore,
{
    let mut by_content: HashMap<ContentId, Vec<usize>> = HashMap::new();
    for (index, candidate) in candidates.iter().enumerate() {
        if !candidate.is_publish() || candidate.delivery_path.is_empty() {
            continue;
        }
        by_content.entry(candidate.content_id).or_default().push(index);
    }

    let mut matches = Vec::new();
    for (content_id, indexes) in by_content {
        let records = store
            .published_records(content_id, scope, delivery_context)
            .await?;
        if records.is_empty() {
            continue;
        }

        match_content(candidates, &indexes, records, site_folders, &mut matches);
    }

    Ok(matches)
}

/// Matches one content item's candidates against its published records.
fn match_content(
    candidates: &[WorkItem],
    indexes: &[usize],
    records: Vec<SiteItemRecord>,
    site_folders: &HashSet<FolderId>,
    matches: &mut Vec<MoveMatch>,
) {
    // Exact pass: each candidate consumes the records published under its
    // own folder (possibly flagged moved via the negative-folder
    // convention). A consumed record with a differing path is a location
    // change; one with the same path needs nothing.
    let mut remaining = records;
    let mut unmatched_candidates = Vec::new();

    for &index in indexes {
        let candidate = &candidates[index];
        let mut found_folder = false;

        remaining.retain(|record| {
            if !artifact_matches(record, candidate) || !folder_matches(record, candidate) {
                return true;
            }

            found_folder = true;
            if record.delivery_path != candidate.delivery_path {
                matches.push(MoveMatch {
                    candidate_index: index,
                    record: record.clone(),
                });
            }
            false
        });

        if !found_folder {
            unmatched_candidates.push(index);
        }
    }

    if unmatched_candidates.is_empty() || remaining.is_empty() {
        return;
    }

    // Moved-folder heuristic: compare the set of current parent folders
    // against the set of previously published folders. Exactly one folder
    // differing on each side identifies the move source; anything else is
    // ambiguous and intentionally produces no unpublish.
    let current: BTreeSet<FolderId> = indexes
        .iter()
        .map(|&index| candidates[index].folder_id)
        .collect();
    let previous: BTreeSet<FolderId> = remaining
        .iter()
        .map(|record| record.folder_id.abs())
        .chain(
            // Folders already consumed by the exact pass count as matched
            // on both sides.
            current
                .iter()
                .copied()
                .filter(|folder| !unmatched_folder(&unmatched_candidates, candidates, *folder)),
        )
        .collect();

    let reconciled = reconcile(&current, &previous)
        .or_else(|| {
            // Retry with current parents restricted to folders actually
            // under the job's site.
            let restricted: BTreeSet<FolderId> = current
                .iter()
                .copied()
                .filter(|folder| site_folders.contains(folder))
                .collect();
            reconcile(&restricted, &previous)
        });

    let Some((moved_to, moved_from)) = reconciled else {
        debug!(
            current = ?current,
            previous = ?previous,
            "folder sets do not reconcile; skipping unpublish for moved item"
        );
        return;
    };

    for &index in &unmatched_candidates {
        let candidate = &candidates[index];
        if candidate.folder_id != moved_to {
            continue;
        }

        for record in &remaining {
            if record.folder_id.abs() == moved_from
                && artifact_matches(record, candidate)
                && record.delivery_path != candidate.delivery_path
            {
                matches.push(MoveMatch {
                    candidate_index: index,
                    record: record.clone(),
                });
            }
        }
    }
}

/// Whether a folder is one of the unmatched candidates' folders.
fn unmatched_folder(unmatched: &[usize], candidates: &[WorkItem], folder: FolderId) -> bool {
    unmatched
        .iter()
        .any(|&index| candidates[index].folder_id == folder)
}

/// Reconciles the folder sets to exactly one differing folder on each
/// side. Returns `(current-only folder, previous-only folder)`.
fn reconcile(current: &BTreeSet<FolderId>, previous: &BTreeSet<FolderId>) -> Option<(FolderId, FolderId)> {
    let current_only: Vec<FolderId> = current.difference(previous).copied().collect();
    let previous_only: Vec<FolderId> = previous.difference(current).copied().collect();

    match (current_only.as_slice(), previous_only.as_slice()) {
        ([moved_to], [moved_from]) => Some((*moved_to, *moved_from)),
        _ => None,
    }
}

/// Whether a record describes the same artifact shape as a candidate:
/// delivery type, template and page all match.
fn artifact_matches(record: &SiteItemRecord, candidate: &WorkItem) -> bool {
    record.key.delivery_type == candidate.delivery_type
        && record.key.template_id == candidate.template_id
        && record.key.page == candidate.page
}

/// Whether a record was published under the candidate's folder, including
/// the negative-folder convention for folders moved since the last
/// publish.
fn folder_matches(record: &SiteItemRecord, candidate: &WorkItem) -> bool {
    record.folder_id == candidate.folder_id || record.folder_id == -candidate.folder_id
}

/// Paginated variant: previously published pages of the same content,
/// folder and template whose paths are absent from the current page set.
///
/// Handles an item that now has fewer pages than before: the extra-page
/// records are returned so the pass unpublishes them.
pub async fn stale_pages<S>(
    store: &S,
    scope: PublishScope,
    delivery_context: i32,
    pages: &[WorkItem],
) -> PublishResult<Vec<SiteItemRecord>>
where
    S: SiteItemStore,
{
    let Some(first) = pages.first() else {
        return Ok(Vec::new());
    };

    let current_paths: HashSet<&str> = pages
        .iter()
        .map(|page| page.delivery_path.as_str())
        .collect();

    let records = store
        .published_records(first.content_id, scope, delivery_context)
        .await?;

    Ok(records
        .into_iter()
        .filter(|record| {
            record.key.delivery_type == first.delivery_type
                && record.key.template_id == first.template_id
                && record.folder_id.abs() == first.folder_id
                && record.key.page > 0
                && !current_paths.contains(record.delivery_path.as_str())
        })
        .collect())
}
