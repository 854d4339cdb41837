#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use memories_core::{
    AssetHandle, AssetSource, ChangeDetails, ChangeObserver, FetchKey, InMemoryLibrary,
    LibraryChange, ObserverToken, Snapshot, SourceResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, 0, 0))
        .expect("valid timestamp")
}

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Snapshot of `count` fresh handles captured on `year`-`month`-`day`.
pub fn snapshot(year: i32, month: u32, day: u32, count: usize) -> Snapshot {
    let handles = (0..count)
        .map(|hour| AssetHandle::new(at(year, month, day, hour as u32 % 24)))
        .collect();
    Snapshot::new(FetchKey { year, month, day }, handles)
}

/// Source whose answers are set directly by the test.
///
/// Change details are keyed by the snapshot's fetch year.
#[derive(Default)]
pub struct ScriptedSource {
    sections: Mutex<Vec<Snapshot>>,
    details: Mutex<HashMap<i32, ChangeDetails>>,
    invalidations: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(sections: Vec<Snapshot>) -> Self {
        Self {
            sections: Mutex::new(sections),
            ..Self::default()
        }
    }

    pub fn script_change(&self, year: i32, details: ChangeDetails) {
        self.details.lock().unwrap().insert(year, details);
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl AssetSource for ScriptedSource {
    type Change = ();

    fn fetch_sections(&self, _date: NaiveDate) -> SourceResult<Vec<Snapshot>> {
        Ok(self.sections.lock().unwrap().clone())
    }

    fn change_details(&self, snapshot: &Snapshot, _change: &()) -> Option<ChangeDetails> {
        self.details
            .lock()
            .unwrap()
            .get(&snapshot.key().year)
            .cloned()
    }

    fn invalidate_cache(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    fn register_observer(&self, _observer: Arc<dyn ChangeObserver<()>>) -> ObserverToken {
        ObserverToken(1)
    }

    fn unregister_observer(&self, _token: ObserverToken) {}
}

/// In-memory library whose fetches for chosen days block until released.
#[derive(Default)]
pub struct GatedLibrary {
    pub library: InMemoryLibrary,
    gates: Mutex<HashMap<NaiveDate, Receiver<()>>>,
}

impl GatedLibrary {
    pub fn new(library: InMemoryLibrary) -> Self {
        Self {
            library,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Holds the next fetch of `date` until `release` receives a value.
    pub fn gate(&self, date: NaiveDate, release: Receiver<()>) {
        self.gates.lock().unwrap().insert(date, release);
    }
}

impl AssetSource for GatedLibrary {
    type Change = LibraryChange;

    fn fetch_sections(&self, date: NaiveDate) -> SourceResult<Vec<Snapshot>> {
        let gate = self.gates.lock().unwrap().remove(&date);
        if let Some(release) = gate {
            let _ = release.recv();
        }
        self.library.fetch_sections(date)
    }

    fn change_details(&self, snapshot: &Snapshot, change: &LibraryChange) -> Option<ChangeDetails> {
        self.library.change_details(snapshot, change)
    }

    fn invalidate_cache(&self) {
        self.library.invalidate_cache();
    }

    fn register_observer(&self, observer: Arc<dyn ChangeObserver<LibraryChange>>) -> ObserverToken {
        self.library.register_observer(observer)
    }

    fn unregister_observer(&self, token: ObserverToken) {
        self.library.unregister_observer(token);
    }
}
