//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the "on this day" screen flow to Dart via FRB.
//! - Own one process-wide session: in-memory library plus memories service.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Section/item indices cross the boundary as `u32`; out-of-range input
//!   yields `None` or an empty value, never an error.
//! - Timestamps are epoch milliseconds interpreted as naive UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use log::info;
use memories_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AssetHandle, AssetSource, ChangeBatch, InMemoryLibrary, ItemCoordinate, MemoriesConfig,
    MemoriesService, SectionChangeEvent, SectionChangeKind,
};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use uuid::Uuid;

static SESSION: OnceLock<Mutex<Option<Session>>> = OnceLock::new();

struct Session {
    library: Arc<InMemoryLibrary>,
    service: MemoriesService<InMemoryLibrary>,
    events: Receiver<SectionChangeEvent>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// One year section as shown by the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoriesSection {
    pub year: i32,
    pub item_count: u32,
}

/// Screen state envelope returned by every date-changing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoriesStateResponse {
    pub ok: bool,
    /// Display title, e.g. `JULY 16 ▾`.
    pub title: String,
    pub sections: Vec<MemoriesSection>,
    pub total_items: u32,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl MemoriesStateResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            title: String::new(),
            sections: Vec::new(),
            total_items: 0,
            message: message.into(),
        }
    }
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoriesActionResponse {
    pub ok: bool,
    /// IDs of assets created by the call, in input order.
    pub asset_ids: Vec<String>,
    pub message: String,
}

impl MemoriesActionResponse {
    fn success(message: impl Into<String>, asset_ids: Vec<String>) -> Self {
        Self {
            ok: true,
            asset_ids,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            asset_ids: Vec::new(),
            message: message.into(),
        }
    }
}

/// (section, item) position in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoriesCoordinate {
    pub section: u32,
    pub item: u32,
}

/// One section change for the list view to animate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoriesSectionChange {
    pub section: u32,
    /// `true` when the section must be reloaded as a whole.
    pub full_reload: bool,
    pub removed: Vec<u32>,
    pub inserted: Vec<u32>,
    pub changed: Vec<u32>,
    /// `0` means the section is gone.
    pub new_item_count: u32,
}

/// Opens a fresh session at `date_epoch_ms`, replacing any previous one.
///
/// `config_json` uses the core config document; `None` keeps defaults.
///
/// # FFI contract
/// - Sync call; blocks until the first rebuild lands or the deadline passes.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_open(date_epoch_ms: i64, config_json: Option<String>) -> MemoriesStateResponse {
    let Some(date) = date_from_epoch_ms(date_epoch_ms) else {
        return MemoriesStateResponse::failure(format!(
            "memories_open failed: invalid timestamp {date_epoch_ms}"
        ));
    };
    let config = match config_json.as_deref().map(MemoriesConfig::from_json_str) {
        Some(Ok(config)) => config,
        Some(Err(err)) => {
            return MemoriesStateResponse::failure(format!("memories_open failed: {err}"))
        }
        None => MemoriesConfig::default(),
    };

    let library = Arc::new(InMemoryLibrary::new());
    let service = MemoriesService::new(Arc::clone(&library), config, date);
    let events = service.subscribe();
    service.set_library_access(true);

    let mut slot = lock_session();
    // Drop the old session first so its observer is released.
    *slot = None;
    let session = slot.insert(Session {
        library,
        service,
        events,
    });
    info!("event=ffi_session module=ffi status=open date={}", date.date());
    settle(session, "memories_open")
}

/// Closes the session. Returns `false` when none was open.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_close() -> bool {
    let closed = lock_session().take().is_some();
    if closed {
        info!("event=ffi_session module=ffi status=closed");
    }
    closed
}

/// Adds assets captured at the given timestamps to the session library.
///
/// # FFI contract
/// - One library change per call; open sections update through
///   `memories_poll_changes`, new years through the refresh this requests.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_import_assets(created_at_epoch_ms: Vec<i64>) -> MemoriesActionResponse {
    let mut created_at = Vec::with_capacity(created_at_epoch_ms.len());
    for raw in &created_at_epoch_ms {
        match date_from_epoch_ms(*raw) {
            Some(value) => created_at.push(value),
            None => {
                return MemoriesActionResponse::failure(format!(
                    "memories_import_assets failed: invalid timestamp {raw}"
                ))
            }
        }
    }

    with_session(|session| {
        let mut batch = ChangeBatch::new();
        let ids = created_at
            .into_iter()
            .map(|value| batch.add(value).to_string())
            .collect::<Vec<_>>();
        session.library.commit(batch);
        // Imports can open years the current date has never shown.
        session.library.invalidate_cache();
        session.service.refresh();
        MemoriesActionResponse::success(format!("Imported {} asset(s).", ids.len()), ids)
    })
    .unwrap_or_else(|message| {
        MemoriesActionResponse::failure(format!("memories_import_assets failed: {message}"))
    })
}

/// Removes one asset by ID.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_remove_asset(asset_id: String) -> MemoriesActionResponse {
    let id = match Uuid::parse_str(asset_id.trim()) {
        Ok(id) => id,
        Err(err) => {
            return MemoriesActionResponse::failure(format!(
                "memories_remove_asset failed: invalid asset id: {err}"
            ))
        }
    };
    with_session(|session| {
        let mut batch = ChangeBatch::new();
        batch.remove(id);
        session.library.commit(batch);
        MemoriesActionResponse::success("Asset removed.", Vec::new())
    })
    .unwrap_or_else(|message| {
        MemoriesActionResponse::failure(format!("memories_remove_asset failed: {message}"))
    })
}

/// Replaces the whole library; open sections receive full reloads.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_reset_library(created_at_epoch_ms: Vec<i64>) -> MemoriesActionResponse {
    let handles = match created_at_epoch_ms
        .iter()
        .map(|raw| date_from_epoch_ms(*raw).map(AssetHandle::new).ok_or(*raw))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(handles) => handles,
        Err(raw) => {
            return MemoriesActionResponse::failure(format!(
                "memories_reset_library failed: invalid timestamp {raw}"
            ))
        }
    };
    let ids = handles.iter().map(|handle| handle.id.to_string()).collect();
    with_session(|session| {
        session.library.reset(handles);
        MemoriesActionResponse::success("Library replaced.", ids)
    })
    .unwrap_or_else(|message| {
        MemoriesActionResponse::failure(format!("memories_reset_library failed: {message}"))
    })
}

/// Jumps to `date_epoch_ms` and rebuilds.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_set_date(date_epoch_ms: i64) -> MemoriesStateResponse {
    let Some(date) = date_from_epoch_ms(date_epoch_ms) else {
        return MemoriesStateResponse::failure(format!(
            "memories_set_date failed: invalid timestamp {date_epoch_ms}"
        ));
    };
    with_session(|session| {
        session.service.set_date(date);
        settle(session, "memories_set_date")
    })
    .unwrap_or_else(|message| {
        MemoriesStateResponse::failure(format!("memories_set_date failed: {message}"))
    })
}

/// Moves one day forward and rebuilds.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_next_day() -> MemoriesStateResponse {
    with_session(|session| match session.service.advance_day() {
        Ok(_) => settle(session, "memories_next_day"),
        Err(err) => MemoriesStateResponse::failure(format!("memories_next_day failed: {err}")),
    })
    .unwrap_or_else(|message| {
        MemoriesStateResponse::failure(format!("memories_next_day failed: {message}"))
    })
}

/// Moves one day back and rebuilds.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_previous_day() -> MemoriesStateResponse {
    with_session(|session| match session.service.retreat_day() {
        Ok(_) => settle(session, "memories_previous_day"),
        Err(err) => {
            MemoriesStateResponse::failure(format!("memories_previous_day failed: {err}"))
        }
    })
    .unwrap_or_else(|message| {
        MemoriesStateResponse::failure(format!("memories_previous_day failed: {message}"))
    })
}

/// Current screen state without waiting for outstanding rebuilds.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_state() -> MemoriesStateResponse {
    with_session(|session| {
        session.service.pump_rebuilds();
        snapshot_state(session, "OK")
    })
    .unwrap_or_else(|message| {
        MemoriesStateResponse::failure(format!("memories_state failed: {message}"))
    })
}

/// Asset ID at (`section`, `item`), or `None` when out of range.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_asset_id(section: u32, item: u32) -> Option<String> {
    with_session(|session| {
        session
            .service
            .handle(section as usize, item as usize)
            .map(|handle| handle.id.to_string())
    })
    .ok()
    .flatten()
}

/// Flattened position of (`section`, `item`) across all sections.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_flatten(section: u32, item: u32) -> Option<u32> {
    with_session(|session| {
        session
            .service
            .flatten(ItemCoordinate::new(section as usize, item as usize))
            .and_then(to_u32)
    })
    .ok()
    .flatten()
}

/// Inverse of `memories_flatten`.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_unflatten(position: u32) -> Option<MemoriesCoordinate> {
    with_session(|session| {
        let coordinate = session.service.unflatten(position as usize)?;
        Some(MemoriesCoordinate {
            section: to_u32(coordinate.section)?,
            item: to_u32(coordinate.item)?,
        })
    })
    .ok()
    .flatten()
}

/// Drains section change events queued since the last poll.
///
/// Events keep reconciliation order: highest section first.
#[flutter_rust_bridge::frb(sync)]
pub fn memories_poll_changes() -> Vec<MemoriesSectionChange> {
    with_session(|session| {
        session
            .events
            .try_iter()
            .map(to_section_change)
            .collect::<Vec<_>>()
    })
    .unwrap_or_default()
}

fn lock_session() -> MutexGuard<'static, Option<Session>> {
    SESSION
        .get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn with_session<T>(f: impl FnOnce(&Session) -> T) -> Result<T, String> {
    let slot = lock_session();
    match slot.as_ref() {
        Some(session) => Ok(f(session)),
        None => Err("no open session; call memories_open first".to_string()),
    }
}

fn settle(session: &Session, operation: &str) -> MemoriesStateResponse {
    match session.service.wait_for_rebuild() {
        Ok(_) => {
            let status = session.service.status();
            match status.error {
                Some(error) => {
                    let mut state = snapshot_state(session, "");
                    state.ok = false;
                    state.message = format!("{operation} failed: {error}");
                    state
                }
                None => snapshot_state(session, "OK"),
            }
        }
        Err(err) => {
            let mut state = snapshot_state(session, "");
            state.ok = false;
            state.message = format!("{operation} failed: {err}");
            state
        }
    }
}

fn snapshot_state(session: &Session, message: &str) -> MemoriesStateResponse {
    let (sections, total_items) = session.service.with_index(|index| {
        let sections = index
            .sections()
            .iter()
            .map(|section| MemoriesSection {
                year: section.year().unwrap_or_default(),
                item_count: to_u32(section.item_count()).unwrap_or(u32::MAX),
            })
            .collect::<Vec<_>>();
        (sections, index.total_item_count())
    });
    MemoriesStateResponse {
        ok: true,
        title: session.service.title(),
        sections,
        total_items: to_u32(total_items).unwrap_or(u32::MAX),
        message: message.to_string(),
    }
}

fn to_section_change(event: SectionChangeEvent) -> MemoriesSectionChange {
    let full_reload = event.is_full_reload();
    let (removed, inserted, changed) = match event.kind {
        SectionChangeKind::FullReload => (Vec::new(), Vec::new(), Vec::new()),
        SectionChangeKind::Incremental {
            removed,
            inserted,
            changed,
        } => (to_u32_list(removed), to_u32_list(inserted), to_u32_list(changed)),
    };
    MemoriesSectionChange {
        section: to_u32(event.section).unwrap_or(u32::MAX),
        full_reload,
        removed,
        inserted,
        changed,
        new_item_count: to_u32(event.new_item_count).unwrap_or(u32::MAX),
    }
}

fn to_u32(value: usize) -> Option<u32> {
    u32::try_from(value).ok()
}

fn to_u32_list(values: Vec<usize>) -> Vec<u32> {
    values.into_iter().filter_map(to_u32).collect()
}

fn date_from_epoch_ms(epoch_ms: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms).map(|value| value.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, init_logging, memories_asset_id, memories_close, memories_flatten,
        memories_import_assets, memories_next_day, memories_open, memories_poll_changes,
        memories_previous_day, memories_remove_asset, memories_reset_library, memories_state,
        memories_unflatten, ping, MemoriesCoordinate,
    };
    use chrono::NaiveDate;
    use std::sync::Mutex;

    // Tests share the process-wide session.
    static SESSION_GUARD: Mutex<()> = Mutex::new(());

    fn epoch_ms(year: i32, month: u32, day: u32, hour: u32) -> i64 {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
            .and_utc()
            .timestamp_millis()
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "/tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn calls_without_session_fail_softly() {
        let _guard = SESSION_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        memories_close();

        assert!(!memories_state().ok);
        assert!(!memories_next_day().ok);
        assert_eq!(memories_flatten(0, 0), None);
        assert!(memories_poll_changes().is_empty());
        assert!(!memories_import_assets(vec![0]).ok);
    }

    #[test]
    fn open_rejects_bad_config() {
        let _guard = SESSION_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let response = memories_open(0, Some(r#"{"title_format": "%Q"}"#.to_string()));
        assert!(!response.ok);
        assert!(response.message.contains("title format"));
    }

    #[test]
    fn screen_flow_tracks_sections_and_changes() {
        let _guard = SESSION_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let opened = memories_open(epoch_ms(2025, 7, 16, 9), None);
        assert!(opened.ok, "{}", opened.message);
        assert_eq!(opened.title, "JULY 16 ▾");
        assert!(opened.sections.is_empty());

        let imported = memories_import_assets(vec![
            epoch_ms(2021, 7, 16, 8),
            epoch_ms(2021, 7, 16, 12),
            epoch_ms(2019, 7, 16, 10),
            epoch_ms(2020, 7, 17, 9),
        ]);
        assert!(imported.ok, "{}", imported.message);
        assert_eq!(imported.asset_ids.len(), 4);
        // Nothing was installed yet, so the import has nothing to reconcile.
        assert!(memories_poll_changes().is_empty());

        let next = memories_next_day();
        assert!(next.ok, "{}", next.message);
        assert_eq!(next.title, "JULY 17 ▾");
        assert_eq!(next.sections.len(), 1);

        let back = memories_previous_day();
        assert_eq!(back.total_items, 3);
        assert_eq!(back.sections[0].year, 2021);
        assert_eq!(back.sections[1].year, 2019);
        assert_eq!(memories_flatten(1, 0), Some(2));
        assert_eq!(
            memories_unflatten(2),
            Some(MemoriesCoordinate { section: 1, item: 0 })
        );

        let lone = memories_asset_id(1, 0).expect("2019 asset");
        assert!(memories_remove_asset(lone).ok);
        let changes = memories_poll_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].section, 1);
        assert!(changes[0].full_reload);
        assert_eq!(changes[0].new_item_count, 0);
        assert_eq!(memories_state().sections.len(), 1);

        assert!(memories_reset_library(vec![epoch_ms(2021, 7, 16, 8)]).ok);
        let changes = memories_poll_changes();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].full_reload);
        assert_eq!(changes[0].new_item_count, 1);

        assert!(memories_close());
        assert!(!memories_close());
    }

    #[test]
    fn remove_rejects_malformed_id() {
        let response = memories_remove_asset("not-a-uuid".to_string());
        assert!(!response.ok);
        assert!(response.message.contains("invalid asset id"));
    }
}
