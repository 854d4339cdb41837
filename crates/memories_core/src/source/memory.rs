//! In-process asset library implementing `AssetSource`.
//!
//! # Responsibility
//! - Hold asset handles indexed by capture day for fast day queries.
//! - Apply batched mutations and notify observers once per batch.
//! - Diff previously returned snapshots into itemized change details.
//!
//! # Invariants
//! - Year sections are returned newest year first.
//! - Only years before the reference year are returned; a reference date
//!   after "today" (per the library clock) yields no sections.
//! - Items inside a year are ordered by capture time, then by id.
//! - The month/day -> years cache is only rebuilt after `invalidate_cache`.

use crate::model::asset::{AssetHandle, AssetId};
use crate::model::section::{FetchKey, Snapshot};
use crate::source::{
    AssetSource, ChangeDetails, ChangeObserver, ObserverToken, SourceError, SourceResult,
};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

type DayKey = (u32, u32);
type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Notification describing one committed mutation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryChange {
    /// Library revision after the batch.
    pub revision: u64,
    /// Assets whose metadata was edited in place.
    pub updated: HashSet<AssetId>,
    /// `false` for wholesale replacements that cannot be itemized.
    pub incremental: bool,
}

#[derive(Debug, Clone)]
enum BatchOp {
    Insert(AssetHandle),
    Remove(AssetId),
    Retime(AssetId, NaiveDateTime),
    Touch(AssetId),
}

/// Ordered list of mutations committed atomically by `InMemoryLibrary::commit`.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    ops: Vec<BatchOp>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new asset captured at `created_at` and returns its id.
    pub fn add(&mut self, created_at: NaiveDateTime) -> AssetId {
        let handle = AssetHandle::new(created_at);
        let id = handle.id;
        self.ops.push(BatchOp::Insert(handle));
        id
    }

    pub fn insert(&mut self, handle: AssetHandle) -> &mut Self {
        self.ops.push(BatchOp::Insert(handle));
        self
    }

    pub fn remove(&mut self, id: AssetId) -> &mut Self {
        self.ops.push(BatchOp::Remove(id));
        self
    }

    /// Changes the capture time of an existing asset.
    pub fn set_created_at(&mut self, id: AssetId, created_at: NaiveDateTime) -> &mut Self {
        self.ops.push(BatchOp::Retime(id, created_at));
        self
    }

    /// Records an in-place edit that keeps the asset where it is.
    pub fn mark_edited(&mut self, id: AssetId) -> &mut Self {
        self.ops.push(BatchOp::Touch(id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[derive(Debug, Default)]
struct LibraryState {
    assets: HashMap<AssetId, NaiveDateTime>,
    by_day: BTreeMap<NaiveDate, BTreeSet<(NaiveDateTime, AssetId)>>,
    revision: u64,
}

impl LibraryState {
    fn insert(&mut self, handle: AssetHandle) {
        self.remove(handle.id);
        self.by_day
            .entry(handle.created_at.date())
            .or_default()
            .insert((handle.created_at, handle.id));
        self.assets.insert(handle.id, handle.created_at);
    }

    fn remove(&mut self, id: AssetId) -> bool {
        let Some(created_at) = self.assets.remove(&id) else {
            return false;
        };
        let day = created_at.date();
        if let Some(entries) = self.by_day.get_mut(&day) {
            entries.remove(&(created_at, id));
            if entries.is_empty() {
                self.by_day.remove(&day);
            }
        }
        true
    }

    fn query(&self, key: FetchKey) -> Vec<AssetHandle> {
        let Some(day) = NaiveDate::from_ymd_opt(key.year, key.month, key.day) else {
            return Vec::new();
        };
        self.by_day
            .get(&day)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(created_at, id)| AssetHandle::with_id(*id, *created_at))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn years_by_day(&self) -> HashMap<DayKey, BTreeSet<i32>> {
        let mut map: HashMap<DayKey, BTreeSet<i32>> = HashMap::new();
        for day in self.by_day.keys() {
            map.entry((day.month(), day.day()))
                .or_default()
                .insert(day.year());
        }
        map
    }
}

/// Thread-safe in-memory asset library.
pub struct InMemoryLibrary {
    state: RwLock<LibraryState>,
    dates_cache: Mutex<Option<HashMap<DayKey, BTreeSet<i32>>>>,
    observers: Mutex<Vec<(ObserverToken, Arc<dyn ChangeObserver<LibraryChange>>)>>,
    next_observer: AtomicU64,
    access_granted: AtomicBool,
    today: Clock,
}

impl Default for InMemoryLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LibraryState::default()),
            dates_cache: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
            access_granted: AtomicBool::new(true),
            today: Arc::new(|| Local::now().date_naive()),
        }
    }

    /// Replaces the local-time clock used to reject future reference dates.
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    /// Creates a library pre-populated with `handles`, without notifying anyone.
    pub fn with_assets(handles: impl IntoIterator<Item = AssetHandle>) -> Self {
        let library = Self::new();
        {
            let mut state = library.write_state();
            for handle in handles {
                state.insert(handle);
            }
        }
        library
    }

    pub fn len(&self) -> usize {
        self.read_state().assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().assets.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.read_state().revision
    }

    pub fn observer_count(&self) -> usize {
        self.lock_observers().len()
    }

    /// Grants or revokes query access; revoked access fails every fetch.
    pub fn set_access_granted(&self, granted: bool) {
        self.access_granted.store(granted, Ordering::SeqCst);
    }

    /// Applies `batch` atomically and notifies observers once.
    ///
    /// Operations naming unknown ids are skipped.
    pub fn commit(&self, batch: ChangeBatch) -> LibraryChange {
        let mut updated = HashSet::new();
        let revision = {
            let mut state = self.write_state();
            for op in batch.ops {
                match op {
                    BatchOp::Insert(handle) => state.insert(handle),
                    BatchOp::Remove(id) => {
                        if !state.remove(id) {
                            debug!(
                                "event=library_commit module=source status=skip op=remove id={id}"
                            );
                        }
                    }
                    BatchOp::Retime(id, created_at) => {
                        if state.remove(id) {
                            state.insert(AssetHandle::with_id(id, created_at));
                            updated.insert(id);
                        } else {
                            debug!(
                                "event=library_commit module=source status=skip op=retime id={id}"
                            );
                        }
                    }
                    BatchOp::Touch(id) => {
                        if state.assets.contains_key(&id) {
                            updated.insert(id);
                        }
                    }
                }
            }
            state.revision += 1;
            state.revision
        };

        let change = LibraryChange {
            revision,
            updated,
            incremental: true,
        };
        self.notify(&change);
        change
    }

    /// Replaces the whole library; observers receive a non-itemized change.
    pub fn reset(&self, handles: impl IntoIterator<Item = AssetHandle>) -> LibraryChange {
        let revision = {
            let mut state = self.write_state();
            let revision = state.revision + 1;
            *state = LibraryState {
                revision,
                ..LibraryState::default()
            };
            for handle in handles {
                state.insert(handle);
            }
            revision
        };

        let change = LibraryChange {
            revision,
            updated: HashSet::new(),
            incremental: false,
        };
        self.notify(&change);
        change
    }

    fn notify(&self, change: &LibraryChange) {
        let observers = self
            .lock_observers()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect::<Vec<_>>();
        info!(
            "event=library_change module=source status=ok revision={} observers={} incremental={}",
            change.revision,
            observers.len(),
            change.incremental
        );
        for observer in observers {
            observer.library_did_change(change);
        }
    }

    fn years_for(&self, month: u32, day: u32) -> Vec<i32> {
        let mut cache = self
            .dates_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let map = cache.get_or_insert_with(|| {
            debug!("event=dates_cache_build module=source status=start");
            self.read_state().years_by_day()
        });
        map.get(&(month, day))
            .map(|years| years.iter().rev().copied().collect())
            .unwrap_or_default()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, LibraryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, LibraryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_observers(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<(ObserverToken, Arc<dyn ChangeObserver<LibraryChange>>)>>
    {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AssetSource for InMemoryLibrary {
    type Change = LibraryChange;

    fn fetch_sections(&self, date: NaiveDate) -> SourceResult<Vec<Snapshot>> {
        if !self.access_granted.load(Ordering::SeqCst) {
            return Err(SourceError::AccessDenied);
        }

        let today = (self.today)();
        if date > today {
            debug!(
                "event=fetch_sections module=source status=skip reason=future_date date={date}"
            );
            return Ok(Vec::new());
        }

        let (month, day) = (date.month(), date.day());
        let years = self
            .years_for(month, day)
            .into_iter()
            .filter(|year| *year < date.year());
        let state = self.read_state();
        let snapshots = years
            .into_iter()
            .map(|year| FetchKey { year, month, day })
            .map(|key| Snapshot::new(key, state.query(key)))
            .filter(|snapshot| !snapshot.is_empty())
            .collect();
        Ok(snapshots)
    }

    fn change_details(&self, snapshot: &Snapshot, change: &LibraryChange) -> Option<ChangeDetails> {
        let after = self.read_state().query(snapshot.key());
        let touched = after.iter().any(|handle| change.updated.contains(&handle.id));
        if after.as_slice() == snapshot.handles() && !touched {
            return None;
        }

        let snapshot_after = Snapshot::new(snapshot.key(), after);
        if !change.incremental {
            return Some(ChangeDetails {
                snapshot_after,
                has_incremental_changes: false,
                has_moves: false,
                removed: Vec::new(),
                inserted: Vec::new(),
                changed: Vec::new(),
            });
        }
        Some(diff_snapshots(snapshot, snapshot_after, &change.updated))
    }

    fn invalidate_cache(&self) {
        *self
            .dates_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        debug!("event=dates_cache_invalidate module=source status=ok");
    }

    fn register_observer(
        &self,
        observer: Arc<dyn ChangeObserver<LibraryChange>>,
    ) -> ObserverToken {
        let token = ObserverToken(self.next_observer.fetch_add(1, Ordering::SeqCst));
        self.lock_observers().push((token, observer));
        token
    }

    fn unregister_observer(&self, token: ObserverToken) {
        self.lock_observers().retain(|(existing, _)| *existing != token);
    }
}

fn diff_snapshots(
    before: &Snapshot,
    after: Snapshot,
    updated: &HashSet<AssetId>,
) -> ChangeDetails {
    let before_ids = before.iter().map(|handle| handle.id).collect::<HashSet<_>>();
    let after_ids = after.iter().map(|handle| handle.id).collect::<HashSet<_>>();

    let removed = before
        .iter()
        .enumerate()
        .filter(|(_, handle)| !after_ids.contains(&handle.id))
        .map(|(index, _)| index)
        .collect();
    let inserted = after
        .iter()
        .enumerate()
        .filter(|(_, handle)| !before_ids.contains(&handle.id))
        .map(|(index, _)| index)
        .collect();
    let changed = after
        .iter()
        .enumerate()
        .filter(|(_, handle)| before_ids.contains(&handle.id) && updated.contains(&handle.id))
        .map(|(index, _)| index)
        .collect();

    let surviving_before = before
        .iter()
        .map(|handle| handle.id)
        .filter(|id| after_ids.contains(id));
    let surviving_after = after
        .iter()
        .map(|handle| handle.id)
        .filter(|id| before_ids.contains(id));
    let has_moves = !surviving_before.eq(surviving_after);

    ChangeDetails {
        snapshot_after: after,
        has_incremental_changes: true,
        has_moves,
        removed,
        inserted,
        changed,
    }
}
