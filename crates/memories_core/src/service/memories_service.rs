//! Memories use-case service.
//!
//! # Responsibility
//! - Own the reference date, display title and section index as one state.
//! - Run each date change as an ordered list of reactions:
//!   cursor update, title update, rebuild request.
//! - Compute rebuilds on worker threads and apply them on the caller's
//!   serialized context, discarding superseded results.
//! - Reconcile source notifications and broadcast section change events.
//!
//! # Invariants
//! - Rebuild application and reconciliation passes never interleave.
//! - The state lock is never held across a call into the asset source.
//! - The source observer is registered only while library access is granted
//!   and is always released when the service is dropped.

use crate::config::MemoriesConfig;
use crate::index::cursor::{CursorError, DateCursor};
use crate::index::reconcile::{apply_update, finish_pass, plan_section};
use crate::index::sections::{
    rebuild_sections, IndexStatus, RebuildApplied, RebuildTicket, RebuildToken, YearSectionIndex,
};
use crate::index::selection::{flatten, flatten_all, unflatten, FlattenedSelection, ItemCoordinate};
use crate::model::asset::AssetHandle;
use crate::model::change::SectionChangeEvent;
use crate::model::section::Section;
use crate::source::{AssetSource, ChangeObserver, ObserverToken, SourceError, SourceResult};
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Errors from service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Day navigation left the calendar range.
    Cursor(CursorError),
    /// The current rebuild did not arrive before the configured deadline.
    RebuildTimedOut {
        token: RebuildToken,
        deadline: Duration,
    },
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cursor(err) => write!(f, "{err}"),
            Self::RebuildTimedOut { token, deadline } => write!(
                f,
                "rebuild {} timed out after {} ms",
                token.0,
                deadline.as_millis()
            ),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Cursor(err) => Some(err),
            Self::RebuildTimedOut { .. } => None,
        }
    }
}

impl From<CursorError> for ServiceError {
    fn from(value: CursorError) -> Self {
        Self::Cursor(value)
    }
}

struct RebuildResult {
    ticket: RebuildTicket,
    outcome: SourceResult<Vec<Section>>,
}

struct ServiceState {
    cursor: DateCursor,
    title: String,
    index: YearSectionIndex,
    outstanding: Option<RebuildToken>,
    observer: Option<ObserverToken>,
}

struct ServiceInner<S: AssetSource> {
    source: Arc<S>,
    config: MemoriesConfig,
    serial: Mutex<()>,
    state: Mutex<ServiceState>,
    results_tx: Sender<RebuildResult>,
    results_rx: Mutex<Receiver<RebuildResult>>,
    subscribers: Mutex<Vec<Sender<SectionChangeEvent>>>,
}

struct ServiceObserver<S: AssetSource> {
    inner: Weak<ServiceInner<S>>,
}

impl<S: AssetSource + 'static> ChangeObserver<S::Change> for ServiceObserver<S> {
    fn library_did_change(&self, change: &S::Change) {
        if let Some(inner) = self.inner.upgrade() {
            inner.reconcile(change);
        }
    }
}

/// Multi-year "on this day" service over one asset source.
pub struct MemoriesService<S: AssetSource + 'static> {
    inner: Arc<ServiceInner<S>>,
}

impl<S: AssetSource + 'static> MemoriesService<S> {
    /// Creates the service and requests the first rebuild for `date`.
    pub fn new(source: Arc<S>, config: MemoriesConfig, date: NaiveDateTime) -> Self {
        let (results_tx, results_rx) = mpsc::channel();
        let title = config.format_title(date);
        let inner = Arc::new(ServiceInner {
            source,
            config,
            serial: Mutex::new(()),
            state: Mutex::new(ServiceState {
                cursor: DateCursor::new(date),
                title,
                index: YearSectionIndex::new(),
                outstanding: None,
                observer: None,
            }),
            results_tx,
            results_rx: Mutex::new(results_rx),
            subscribers: Mutex::new(Vec::new()),
        });
        {
            let mut state = inner.lock_state();
            inner.request_rebuild(&mut state);
        }
        Self { inner }
    }

    /// Sets the reference date directly (for example from a launch notification).
    pub fn set_date(&self, date: NaiveDateTime) -> RebuildTicket {
        let mut state = self.inner.lock_state();
        state.cursor.set(date);
        self.inner.date_changed(&mut state)
    }

    pub fn advance_day(&self) -> Result<RebuildTicket, ServiceError> {
        let mut state = self.inner.lock_state();
        state.cursor.advance_day()?;
        Ok(self.inner.date_changed(&mut state))
    }

    pub fn retreat_day(&self) -> Result<RebuildTicket, ServiceError> {
        let mut state = self.inner.lock_state();
        state.cursor.retreat_day()?;
        Ok(self.inner.date_changed(&mut state))
    }

    /// Re-requests sections for the current date, e.g. after the enabled
    /// source types changed.
    pub fn refresh(&self) -> RebuildTicket {
        let mut state = self.inner.lock_state();
        self.inner.request_rebuild(&mut state)
    }

    /// Applies every rebuild result that has already arrived.
    pub fn pump_rebuilds(&self) -> Vec<RebuildApplied> {
        let rx = self.inner.lock_results();
        let mut applied = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(result) => applied.push(self.inner.apply_result(result)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        applied
    }

    /// Blocks until the newest rebuild is applied.
    ///
    /// Stale results arriving meanwhile are discarded. Returns `Ok(None)` when
    /// no rebuild is outstanding. On deadline expiry the index keeps its
    /// sections, records the timeout, and a later result is still installed
    /// by `pump_rebuilds` if no newer request was made.
    pub fn wait_for_rebuild(&self) -> Result<Option<RebuildApplied>, ServiceError> {
        let rx = self.inner.lock_results();
        let deadline = self.inner.config.rebuild_deadline();
        let started = Instant::now();

        loop {
            let Some(outstanding) = self.inner.lock_state().outstanding else {
                return Ok(None);
            };

            let received = match deadline {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    rx.recv_timeout(remaining)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(result) => {
                    let token = result.ticket.token;
                    let applied = self.inner.apply_result(result);
                    if token == outstanding {
                        return Ok(Some(applied));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let limit = deadline.unwrap_or_default();
                    let reason = format!("rebuild timed out after {} ms", limit.as_millis());
                    self.inner.lock_state().index.record_failure(outstanding, reason);
                    warn!(
                        "event=rebuild_wait module=service status=error token={} reason=timeout",
                        outstanding.0
                    );
                    return Err(ServiceError::RebuildTimedOut {
                        token: outstanding,
                        deadline: limit,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }

    /// Grants or revokes library access.
    ///
    /// Granting registers the change observer and requests a fresh rebuild;
    /// revoking deregisters it.
    pub fn set_library_access(&self, granted: bool) -> Option<RebuildTicket> {
        let _serial = self.inner.lock_serial();
        let registered = self.inner.lock_state().observer;
        match (granted, registered) {
            (true, None) => {
                let observer: Arc<dyn ChangeObserver<S::Change>> = Arc::new(ServiceObserver {
                    inner: Arc::downgrade(&self.inner),
                });
                let token = self.inner.source.register_observer(observer);
                info!("event=library_access module=service status=ok granted=true");
                let mut state = self.inner.lock_state();
                state.observer = Some(token);
                Some(self.inner.request_rebuild(&mut state))
            }
            (false, Some(token)) => {
                self.inner.source.unregister_observer(token);
                self.inner.lock_state().observer = None;
                info!("event=library_access module=service status=ok granted=false");
                None
            }
            _ => None,
        }
    }

    pub fn has_library_access(&self) -> bool {
        self.inner.lock_state().observer.is_some()
    }

    /// Runs one reconciliation pass for `change` and returns its events.
    ///
    /// The registered observer calls this automatically.
    pub fn apply_library_change(&self, change: &S::Change) -> Vec<SectionChangeEvent> {
        self.inner.reconcile(change)
    }

    /// Opens a new stream of section change events.
    pub fn subscribe(&self) -> Receiver<SectionChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn date(&self) -> NaiveDateTime {
        self.inner.lock_state().cursor.date()
    }

    pub fn title(&self) -> String {
        self.inner.lock_state().title.clone()
    }

    pub fn results_date(&self) -> Option<NaiveDateTime> {
        self.inner.lock_state().index.results_date()
    }

    pub fn status(&self) -> IndexStatus {
        self.inner.lock_state().index.status()
    }

    pub fn section_count(&self) -> usize {
        self.inner.lock_state().index.section_count()
    }

    pub fn item_count(&self, section: usize) -> usize {
        self.inner.lock_state().index.item_count(section)
    }

    pub fn year(&self, section: usize) -> Option<i32> {
        self.inner.lock_state().index.year(section)
    }

    pub fn handle(&self, section: usize, item: usize) -> Option<AssetHandle> {
        self.inner.lock_state().index.handle(section, item).cloned()
    }

    pub fn flatten(&self, coordinate: ItemCoordinate) -> Option<usize> {
        flatten(self.inner.lock_state().index.sections(), coordinate)
    }

    pub fn unflatten(&self, position: usize) -> Option<ItemCoordinate> {
        unflatten(self.inner.lock_state().index.sections(), position)
    }

    /// Builds the single-item viewer model selected at `target`.
    pub fn flatten_all(&self, target: ItemCoordinate) -> Option<FlattenedSelection> {
        flatten_all(self.inner.lock_state().index.sections(), target)
    }

    /// Runs `read` against a consistent view of the index.
    pub fn with_index<R>(&self, read: impl FnOnce(&YearSectionIndex) -> R) -> R {
        read(&self.inner.lock_state().index)
    }
}

impl<S: AssetSource + 'static> Drop for MemoriesService<S> {
    fn drop(&mut self) {
        let registered = self.inner.lock_state().observer.take();
        if let Some(token) = registered {
            self.inner.source.unregister_observer(token);
        }
        debug!("event=service_teardown module=service status=ok");
    }
}

impl<S: AssetSource + 'static> ServiceInner<S> {
    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_serial(&self) -> MutexGuard<'_, ()> {
        self.serial.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_results(&self) -> MutexGuard<'_, Receiver<RebuildResult>> {
        self.results_rx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reactions to a cursor move, in order: title, then rebuild request.
    fn date_changed(&self, state: &mut ServiceState) -> RebuildTicket {
        state.title = self.config.format_title(state.cursor.date());
        self.request_rebuild(state)
    }

    /// Stamps a new token and computes the rebuild on a worker thread.
    fn request_rebuild(&self, state: &mut ServiceState) -> RebuildTicket {
        let ticket = state.index.begin_rebuild(state.cursor.date());
        state.outstanding = Some(ticket.token);
        info!(
            "event=rebuild_request module=service status=start token={} date={}",
            ticket.token.0,
            ticket.date.date()
        );

        let source = Arc::clone(&self.source);
        let tx = self.results_tx.clone();
        let spawned = thread::Builder::new()
            .name("memories-rebuild".to_string())
            .spawn(move || {
                let outcome = rebuild_sections(source.as_ref(), ticket.date.date());
                // Receiver is gone once the service is dropped.
                let _ = tx.send(RebuildResult { ticket, outcome });
            });

        if let Err(err) = spawned {
            let _ = self.results_tx.send(RebuildResult {
                ticket,
                outcome: Err(SourceError::Unavailable(format!(
                    "rebuild worker failed to start: {err}"
                ))),
            });
        }
        ticket
    }

    fn apply_result(&self, result: RebuildResult) -> RebuildApplied {
        let _serial = self.lock_serial();
        let mut state = self.lock_state();
        let applied = state.index.apply_rebuild(result.ticket, result.outcome);
        if !matches!(applied, RebuildApplied::Stale { .. })
            && state.outstanding == Some(result.ticket.token)
        {
            state.outstanding = None;
        }
        applied
    }

    fn reconcile(&self, change: &S::Change) -> Vec<SectionChangeEvent> {
        let _serial = self.lock_serial();
        let section_count = self.lock_state().index.section_count();

        let mut events = Vec::new();
        for section in (0..section_count).rev() {
            let snapshot = self
                .lock_state()
                .index
                .section(section)
                .map(|s| s.snapshot().clone());
            let Some(snapshot) = snapshot else {
                continue;
            };
            let Some(update) = plan_section(self.source.as_ref(), section, &snapshot, change)
            else {
                continue;
            };
            if let Some(event) = apply_update(&mut self.lock_state().index, update) {
                events.push(event);
            }
        }

        finish_pass(self.source.as_ref(), &events);
        self.broadcast(&events);
        events
    }

    fn broadcast(&self, events: &[SectionChangeEvent]) {
        if events.is_empty() {
            return;
        }
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| events.iter().all(|event| tx.send(event.clone()).is_ok()));
    }
}
