//! Live-mutation reconciliation for the section index.
//!
//! # Responsibility
//! - Ask the source how each installed section changed for one notification.
//! - Mutate the index in place and describe each change as one event.
//!
//! # Invariants
//! - Sections are examined from the highest index to the lowest, so removing
//!   one never shifts a section that is still to be examined.
//! - Events come out in that same order.
//! - Moves or missing item-level diffs always produce `FullReload`.
//! - The source cache is invalidated once per pass that touched any section.

use crate::index::sections::YearSectionIndex;
use crate::model::change::SectionChangeEvent;
use crate::model::section::Snapshot;
use crate::source::{AssetSource, ChangeDetails};
use log::{debug, info};

/// Source-reported change for one section, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionUpdate {
    pub section: usize,
    /// Snapshot the source diffed against.
    pub examined: Snapshot,
    pub details: ChangeDetails,
}

/// Asks `source` whether `snapshot` (installed at `section`) changed.
///
/// Calls into the source only; never touches index state.
pub fn plan_section<S>(
    source: &S,
    section: usize,
    snapshot: &Snapshot,
    change: &S::Change,
) -> Option<SectionUpdate>
where
    S: AssetSource + ?Sized,
{
    source
        .change_details(snapshot, change)
        .map(|details| SectionUpdate {
            section,
            examined: snapshot.clone(),
            details,
        })
}

/// Applies one planned update and returns the event to emit.
///
/// Returns `None` when the section is gone or no longer holds the snapshot the
/// update was planned against.
pub fn apply_update(
    index: &mut YearSectionIndex,
    update: SectionUpdate,
) -> Option<SectionChangeEvent> {
    let SectionUpdate {
        section,
        examined,
        details,
    } = update;

    let sections = index.sections_mut();
    match sections.get(section) {
        Some(current) if *current.snapshot() == examined => {}
        _ => {
            debug!("event=reconcile_section module=index status=skip section={section}");
            return None;
        }
    }

    if details.snapshot_after.is_empty() {
        sections.remove(section);
        return Some(SectionChangeEvent::removal(section));
    }

    let new_item_count = details.snapshot_after.len();
    let event = classify(section, &details, new_item_count);
    sections[section].replace_snapshot(details.snapshot_after);
    Some(event)
}

/// Chooses between an itemized and a full-reload event for one section.
pub fn classify(
    section: usize,
    details: &ChangeDetails,
    new_item_count: usize,
) -> SectionChangeEvent {
    if !details.has_incremental_changes || details.has_moves {
        return SectionChangeEvent::full_reload(section, new_item_count);
    }
    if details.removed.is_empty() && details.inserted.is_empty() && details.changed.is_empty() {
        // A change with no itemized indices counts as non-incremental, the
        // same as a source that cannot itemize at all. Keep it FullReload.
        return SectionChangeEvent::full_reload(section, new_item_count);
    }
    SectionChangeEvent::incremental(
        section,
        details.removed.clone(),
        details.inserted.clone(),
        details.changed.clone(),
        new_item_count,
    )
}

/// Runs one reconciliation pass for a notification batch.
///
/// Use when the caller owns the index exclusively for the whole pass.
pub fn reconcile<S>(
    index: &mut YearSectionIndex,
    source: &S,
    change: &S::Change,
) -> Vec<SectionChangeEvent>
where
    S: AssetSource + ?Sized,
{
    let mut events = Vec::new();
    for section in (0..index.section_count()).rev() {
        let Some(snapshot) = index.section(section).map(|s| s.snapshot().clone()) else {
            continue;
        };
        let Some(update) = plan_section(source, section, &snapshot, change) else {
            continue;
        };
        if let Some(event) = apply_update(index, update) {
            events.push(event);
        }
    }

    finish_pass(source, &events);
    events
}

/// Invalidates the source cache when a pass produced any event.
pub fn finish_pass<S>(source: &S, events: &[SectionChangeEvent])
where
    S: AssetSource + ?Sized,
{
    if events.is_empty() {
        return;
    }
    source.invalidate_cache();
    info!(
        "event=reconcile_pass module=index status=ok affected_sections={} removed_sections={}",
        events.len(),
        events.iter().filter(|e| e.is_section_removal()).count()
    );
}
