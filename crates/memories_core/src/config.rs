//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe tunables for rebuild deadlines, title rendering and logging.
//! - Load them from JSON with every field optional.
//!
//! # Invariants
//! - A config returned by `from_json_str`/`load` has already passed `validate`.
//! - `rebuild_deadline_ms == 0` disables the rebuild deadline.

use crate::logging::{default_log_level, normalize_level};
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REBUILD_DEADLINE_MS: u64 = 10_000;
pub const DEFAULT_TITLE_FORMAT: &str = "%B %d";
pub const DEFAULT_TITLE_SUFFIX: &str = " ▾";

/// Configuration loading/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    InvalidTitleFormat(String),
    InvalidLogLevel(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::InvalidTitleFormat(value) => write!(f, "invalid title format `{value}`"),
            Self::InvalidLogLevel(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidTitleFormat(_) | Self::InvalidLogLevel(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Tunables for one memories service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoriesConfig {
    /// Longest wait for a rebuild result, in milliseconds.
    pub rebuild_deadline_ms: u64,
    /// chrono strftime pattern for the display title.
    pub title_format: String,
    /// Appended after the upper-cased title.
    pub title_suffix: String,
    pub log_level: String,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub log_dir: Option<String>,
}

impl Default for MemoriesConfig {
    fn default() -> Self {
        Self {
            rebuild_deadline_ms: DEFAULT_REBUILD_DEADLINE_MS,
            title_format: DEFAULT_TITLE_FORMAT.to_string(),
            title_suffix: DEFAULT_TITLE_SUFFIX.to_string(),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl MemoriesConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_strftime(&self.title_format) {
            return Err(ConfigError::InvalidTitleFormat(self.title_format.clone()));
        }
        normalize_level(&self.log_level).map_err(ConfigError::InvalidLogLevel)?;
        Ok(())
    }

    pub fn rebuild_deadline(&self) -> Option<Duration> {
        match self.rebuild_deadline_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Renders the display title for `date`, e.g. `JULY 16 ▾`.
    ///
    /// Falls back to the default pattern if `title_format` is invalid.
    pub fn format_title(&self, date: NaiveDateTime) -> String {
        let pattern = if is_valid_strftime(&self.title_format) {
            self.title_format.as_str()
        } else {
            DEFAULT_TITLE_FORMAT
        };
        format!(
            "{}{}",
            date.format(pattern).to_string().to_uppercase(),
            self.title_suffix
        )
    }
}

fn is_valid_strftime(pattern: &str) -> bool {
    !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, MemoriesConfig, DEFAULT_REBUILD_DEADLINE_MS};
    use chrono::NaiveDate;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn empty_document_uses_defaults() {
        let config = MemoriesConfig::from_json_str("{}").expect("defaults");
        assert_eq!(config, MemoriesConfig::default());
        assert_eq!(
            config.rebuild_deadline(),
            Some(Duration::from_millis(DEFAULT_REBUILD_DEADLINE_MS))
        );
    }

    #[test]
    fn zero_deadline_disables_it() {
        let config = MemoriesConfig::from_json_str(r#"{"rebuild_deadline_ms": 0}"#).unwrap();
        assert_eq!(config.rebuild_deadline(), None);
    }

    #[test]
    fn title_is_upper_cased_with_suffix() {
        let date = NaiveDate::from_ymd_opt(2015, 7, 16)
            .and_then(|day| day.and_hms_opt(9, 0, 0))
            .unwrap();
        assert_eq!(MemoriesConfig::default().format_title(date), "JULY 16 ▾");
    }

    #[test]
    fn rejects_bad_title_format_and_level() {
        let err = MemoriesConfig::from_json_str(r#"{"title_format": "%Q"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTitleFormat(_)));

        let err = MemoriesConfig::from_json_str(r#"{"log_level": "loud"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel(_)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = MemoriesConfig::from_json_str(r#"{"deadline": 5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"title_suffix": ""}}"#).unwrap();
        let config = MemoriesConfig::load(file.path()).unwrap();
        assert_eq!(config.title_suffix, "");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = MemoriesConfig::load("/nonexistent/memories.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
