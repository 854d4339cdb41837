//! Core logging bootstrap.
//!
//! # Responsibility
//! - Start one rolling file logger per process.
//! - Keep diagnostic lines metadata-only (`event=... module=... status=...`).
//!
//! # Invariants
//! - Initialization is idempotent for identical level and directory.
//! - Conflicting re-initialization is rejected, never applied.
//! - Initialization never panics.

use crate::config::MemoriesConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "memories";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Normalized logger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: &'static str,
    pub log_dir: PathBuf,
}

impl LogSettings {
    pub fn new(level: &str, log_dir: &str) -> Result<Self, LoggingError> {
        Ok(Self {
            level: normalize_level(level).map_err(LoggingError::InvalidSettings)?,
            log_dir: normalize_log_dir(log_dir).map_err(LoggingError::InvalidSettings)?,
        })
    }
}

/// Logger bootstrap failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    InvalidSettings(String),
    /// Logger already running with different settings.
    Conflict {
        active: LogSettings,
        requested: LogSettings,
    },
    Backend(String),
    /// Config carries no `log_dir`.
    Disabled,
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSettings(message) => write!(f, "{message}"),
            Self::Conflict { active, requested } => write!(
                f,
                "logging already initialized with level `{}` at `{}`; refusing to switch to level `{}` at `{}`",
                active.level,
                active.log_dir.display(),
                requested.level,
                requested.log_dir.display()
            ),
            Self::Backend(message) => write!(f, "failed to start logger: {message}"),
            Self::Disabled => write!(f, "logging disabled: no log_dir configured"),
        }
    }
}

impl Error for LoggingError {}

/// Initializes logging with `level` into the absolute directory `log_dir`.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), LoggingError> {
    let requested = LogSettings::new(level, log_dir)?;

    let active = ACTIVE_LOGGER.get_or_try_init(|| start_logger(requested.clone()))?;
    if active.settings != requested {
        return Err(LoggingError::Conflict {
            active: active.settings.clone(),
            requested,
        });
    }
    Ok(())
}

/// Initializes logging from a validated config.
pub fn init_logging_from_config(config: &MemoriesConfig) -> Result<(), LoggingError> {
    match config.log_dir.as_deref() {
        Some(dir) => init_logging(&config.log_level, dir),
        None => Err(LoggingError::Disabled),
    }
}

/// Returns the active settings, or `None` before initialization.
pub fn logging_status() -> Option<LogSettings> {
    ACTIVE_LOGGER.get().map(|active| active.settings.clone())
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(settings: LogSettings) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.log_dir).map_err(|err| {
        LoggingError::Backend(format!(
            "cannot create log directory `{}`: {err}",
            settings.log_dir.display()
        ))
    })?;

    let handle = Logger::try_with_str(settings.level)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook_once();
    info!(
        "event=core_init module=core status=ok platform={} version={} level={} log_dir={}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION"),
        settings.level,
        settings.log_dir.display()
    );

    Ok(ActiveLogger {
        settings,
        _handle: handle,
    })
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook_once() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
