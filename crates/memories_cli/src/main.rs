//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `memories_core` linkage.
//! - Print the year sections for one date over a sample library built
//!   around that date.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use clap::Parser;
use memories_core::{
    init_logging_from_config, AssetHandle, InMemoryLibrary, MemoriesConfig, MemoriesService,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "memories-cli")]
#[command(about = "Print the on-this-day year sections for a date")]
#[command(version)]
struct Cli {
    /// Reference date (YYYY-MM-DD); defaults to today.
    #[arg(value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// JSON config file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    println!("memories_core ping={}", memories_core::ping());
    println!("memories_core version={}", memories_core::core_version());

    let day = cli.date.unwrap_or_else(|| Local::now().date_naive());
    let Some(date) = day.and_hms_opt(12, 0, 0) else {
        eprintln!("invalid date `{day}`");
        return ExitCode::FAILURE;
    };
    let config = match cli.config {
        Some(path) => match MemoriesConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => MemoriesConfig::default(),
    };
    if config.log_dir.is_some() {
        if let Err(err) = init_logging_from_config(&config) {
            eprintln!("logging disabled: {err}");
        }
    }

    let service = MemoriesService::new(Arc::new(sample_library(date)), config, date);
    if let Err(err) = service.wait_for_rebuild() {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    println!("{}", service.title());
    service.with_index(|index| {
        for section in index.sections() {
            let year = section.year().map_or_else(|| "?".to_string(), |y| y.to_string());
            println!("  {year}: {} item(s)", section.item_count());
        }
        if let Some(error) = index.status().error {
            println!("  error: {error}");
        }
    });
    ExitCode::SUCCESS
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

/// A few captures on the same month/day in earlier years, plus one the day after.
fn sample_library(date: NaiveDateTime) -> InMemoryLibrary {
    let mut handles = Vec::new();
    for (back, count) in [(1, 2), (3, 1), (6, 3)] {
        let Some(day) = years_back(date.date(), back) else {
            continue;
        };
        for hour in 0..count {
            if let Some(created_at) = day.and_hms_opt(9 + hour, 0, 0) {
                handles.push(AssetHandle::new(created_at));
            }
        }
    }
    let next = date.date().succ_opt().and_then(|day| years_back(day, 2));
    if let Some(created_at) = next.and_then(|day| day.and_hms_opt(18, 0, 0)) {
        handles.push(AssetHandle::new(created_at));
    }
    InMemoryLibrary::with_assets(handles)
}

// None for Feb 29 landing on a non-leap year.
fn years_back(date: NaiveDate, years: i32) -> Option<NaiveDate> {
    date.with_year(date.year() - years)
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use chrono::NaiveDate;
    use clap::{CommandFactory, Parser};
    use std::path::PathBuf;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_date_and_config() {
        let cli = Cli::try_parse_from(["memories-cli", "2024-02-29", "-c", "/etc/memories.json"])
            .expect("valid arguments");
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/memories.json")));
    }

    #[test]
    fn date_and_config_are_optional() {
        let cli = Cli::try_parse_from(["memories-cli"]).expect("no arguments");
        assert!(cli.date.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(Cli::try_parse_from(["memories-cli", "2023-02-29"]).is_err());
        assert!(Cli::try_parse_from(["memories-cli", "07/16/2025"]).is_err());
    }
}
