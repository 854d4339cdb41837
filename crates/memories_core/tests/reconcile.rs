mod common;

use common::{at, day, snapshot, ScriptedSource};
use memories_core::{
    rebuild_sections, reconcile, AssetHandle, ChangeBatch, ChangeDetails, InMemoryLibrary,
    SectionChangeEvent, SectionChangeKind, Snapshot, YearSectionIndex,
};

fn install(source: &ScriptedSource) -> YearSectionIndex {
    let mut index = YearSectionIndex::new();
    let ticket = index.begin_rebuild(at(2025, 6, 1, 8));
    index.apply_rebuild(ticket, rebuild_sections(source, ticket.date.date()));
    index
}

fn itemized(
    after: Snapshot,
    removed: Vec<usize>,
    inserted: Vec<usize>,
    changed: Vec<usize>,
) -> ChangeDetails {
    ChangeDetails {
        snapshot_after: after,
        has_incremental_changes: true,
        has_moves: false,
        removed,
        inserted,
        changed,
    }
}

#[test]
fn deleting_last_item_of_a_year_removes_its_section() {
    let source = ScriptedSource::new(vec![snapshot(2024, 6, 1, 3), snapshot(2023, 6, 1, 1)]);
    let mut index = install(&source);
    source.script_change(2023, itemized(snapshot(2023, 6, 1, 0), vec![0], vec![], vec![]));

    let events = reconcile(&mut index, &source, &());

    assert_eq!(events, vec![SectionChangeEvent::removal(1)]);
    assert_eq!(index.section_count(), 1);
    assert_eq!(index.year(0), Some(2024));
    assert_eq!(index.item_count(0), 3);
    assert_eq!(source.invalidations(), 1);
}

#[test]
fn change_without_item_level_info_is_a_full_reload() {
    let source = ScriptedSource::new(vec![snapshot(2024, 6, 1, 2)]);
    let mut index = install(&source);
    source.script_change(
        2024,
        ChangeDetails {
            snapshot_after: snapshot(2024, 6, 1, 5),
            has_incremental_changes: false,
            has_moves: false,
            removed: vec![],
            inserted: vec![],
            changed: vec![],
        },
    );

    let events = reconcile(&mut index, &source, &());

    assert_eq!(events, vec![SectionChangeEvent::full_reload(0, 5)]);
    assert_eq!(events[0].kind, SectionChangeKind::FullReload);
    assert_eq!(index.item_count(0), 5);
}

#[test]
fn moves_always_force_full_reload() {
    for has_incremental_changes in [true, false] {
        let source = ScriptedSource::new(vec![snapshot(2024, 6, 1, 3)]);
        let mut index = install(&source);
        source.script_change(
            2024,
            ChangeDetails {
                snapshot_after: snapshot(2024, 6, 1, 3),
                has_incremental_changes,
                has_moves: true,
                removed: vec![0],
                inserted: vec![2],
                changed: vec![1],
            },
        );

        let events = reconcile(&mut index, &source, &());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, SectionChangeKind::FullReload);
        assert_eq!(events[0].new_item_count, 3);
    }
}

#[test]
fn events_are_emitted_from_highest_section_down() {
    let source = ScriptedSource::new(vec![
        snapshot(2024, 6, 1, 2),
        snapshot(2022, 6, 1, 1),
        snapshot(2020, 6, 1, 1),
        snapshot(2018, 6, 1, 2),
    ]);
    let mut index = install(&source);
    source.script_change(2024, itemized(snapshot(2024, 6, 1, 3), vec![], vec![2], vec![]));
    source.script_change(2022, itemized(snapshot(2022, 6, 1, 0), vec![0], vec![], vec![]));
    source.script_change(2018, itemized(snapshot(2018, 6, 1, 2), vec![], vec![], vec![0]));

    let events = reconcile(&mut index, &source, &());

    assert_eq!(
        events,
        vec![
            SectionChangeEvent::incremental(3, vec![], vec![], vec![0], 2),
            SectionChangeEvent::removal(1),
            SectionChangeEvent::incremental(0, vec![], vec![2], vec![], 3),
        ]
    );
    let years = (0..index.section_count())
        .map(|section| index.year(section))
        .collect::<Vec<_>>();
    assert_eq!(years, vec![Some(2024), Some(2020), Some(2018)]);
    assert_eq!(source.invalidations(), 1);
}

#[test]
fn unchanged_sections_emit_nothing_and_keep_cache() {
    let source = ScriptedSource::new(vec![snapshot(2024, 6, 1, 2)]);
    let mut index = install(&source);

    assert!(reconcile(&mut index, &source, &()).is_empty());
    assert_eq!(source.invalidations(), 0);
}

#[test]
fn library_insertion_is_reported_incrementally() {
    let library = InMemoryLibrary::with_assets([
        AssetHandle::new(at(2020, 7, 16, 8)),
        AssetHandle::new(at(2020, 7, 16, 9)),
    ]);
    let mut index = YearSectionIndex::new();
    let ticket = index.begin_rebuild(at(2025, 7, 16, 8));
    index.apply_rebuild(ticket, rebuild_sections(&library, day(2025, 7, 16)));

    let mut batch = ChangeBatch::new();
    batch.add(at(2020, 7, 16, 22));
    let change = library.commit(batch);

    let events = reconcile(&mut index, &library, &change);
    assert_eq!(
        events,
        vec![SectionChangeEvent::incremental(0, vec![], vec![2], vec![], 3)]
    );
    assert_eq!(index.item_count(0), 3);
}

#[test]
fn library_reorder_is_reported_as_full_reload() {
    let early = AssetHandle::new(at(2020, 7, 16, 8));
    let library =
        InMemoryLibrary::with_assets([early.clone(), AssetHandle::new(at(2020, 7, 16, 9))]);
    let mut index = YearSectionIndex::new();
    let ticket = index.begin_rebuild(at(2025, 7, 16, 8));
    index.apply_rebuild(ticket, rebuild_sections(&library, day(2025, 7, 16)));

    let mut batch = ChangeBatch::new();
    batch.set_created_at(early.id, at(2020, 7, 16, 23));
    let change = library.commit(batch);

    let events = reconcile(&mut index, &library, &change);
    assert_eq!(events, vec![SectionChangeEvent::full_reload(0, 2)]);
    assert_eq!(index.handle(0, 1).map(|h| h.id), Some(early.id));
}
