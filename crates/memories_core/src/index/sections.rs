//! Year section index.
//!
//! # Responsibility
//! - Hold the ordered sections for the most recently installed rebuild.
//! - Stamp rebuild requests with tokens and reject stale results on arrival.
//! - Answer bounds-checked read queries for presentation callers.
//!
//! # Invariants
//! - Sections keep the order the source returned them in.
//! - No installed section is empty.
//! - A failed rebuild keeps the previous sections and records the error.

use crate::model::asset::AssetHandle;
use crate::model::section::Section;
use crate::source::{AssetSource, SourceError, SourceResult};
use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use serde::Serialize;

/// Identifies one rebuild request; larger tokens supersede smaller ones.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RebuildToken(pub u64);

/// Rebuild request issued by `YearSectionIndex::begin_rebuild`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildTicket {
    pub token: RebuildToken,
    pub date: NaiveDateTime,
}

/// What happened when a rebuild result reached the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildApplied {
    /// Result replaced the section list.
    Installed {
        token: RebuildToken,
        section_count: usize,
    },
    /// A newer request was issued; result discarded.
    Stale {
        token: RebuildToken,
        current: RebuildToken,
    },
    /// Source failed; previous sections kept.
    Failed {
        token: RebuildToken,
        error: SourceError,
    },
}

/// Index state summary for UI empty/error rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    /// `true` once any rebuild has been installed.
    pub ready: bool,
    pub section_count: usize,
    pub total_items: usize,
    /// Latest rebuild failure, cleared by the next successful install.
    pub error: Option<String>,
}

/// Queries `source` for `date` and wraps every non-empty year result.
pub fn rebuild_sections<S>(source: &S, date: NaiveDate) -> SourceResult<Vec<Section>>
where
    S: AssetSource + ?Sized,
{
    let snapshots = source.fetch_sections(date)?;
    Ok(snapshots
        .into_iter()
        .filter_map(Section::from_snapshot)
        .collect())
}

/// Ordered list of year sections for the current reference date.
#[derive(Debug, Default)]
pub struct YearSectionIndex {
    sections: Vec<Section>,
    latest_token: RebuildToken,
    installed: bool,
    results_date: Option<NaiveDateTime>,
    last_error: Option<String>,
}

impl YearSectionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh token for a rebuild of `date`.
    ///
    /// Every previously issued ticket becomes stale.
    pub fn begin_rebuild(&mut self, date: NaiveDateTime) -> RebuildTicket {
        self.latest_token = RebuildToken(self.latest_token.0 + 1);
        RebuildTicket {
            token: self.latest_token,
            date,
        }
    }

    pub fn latest_token(&self) -> RebuildToken {
        self.latest_token
    }

    pub fn is_current(&self, token: RebuildToken) -> bool {
        token == self.latest_token
    }

    /// Installs a rebuild outcome if `ticket` is still the newest request.
    pub fn apply_rebuild(
        &mut self,
        ticket: RebuildTicket,
        outcome: SourceResult<Vec<Section>>,
    ) -> RebuildApplied {
        if !self.is_current(ticket.token) {
            info!(
                "event=rebuild_apply module=index status=stale token={} current={}",
                ticket.token.0, self.latest_token.0
            );
            return RebuildApplied::Stale {
                token: ticket.token,
                current: self.latest_token,
            };
        }

        match outcome {
            Ok(sections) => {
                let section_count = sections.len();
                self.sections = sections;
                self.installed = true;
                self.results_date = Some(ticket.date);
                self.last_error = None;
                info!(
                    "event=rebuild_apply module=index status=ok token={} sections={} items={}",
                    ticket.token.0,
                    section_count,
                    self.total_item_count()
                );
                RebuildApplied::Installed {
                    token: ticket.token,
                    section_count,
                }
            }
            Err(error) => {
                warn!(
                    "event=rebuild_apply module=index status=error token={} error={}",
                    ticket.token.0, error
                );
                self.last_error = Some(error.to_string());
                RebuildApplied::Failed {
                    token: ticket.token,
                    error,
                }
            }
        }
    }

    /// Records a failure for the current request without touching sections.
    ///
    /// Returns `false` when `token` is stale.
    pub fn record_failure(&mut self, token: RebuildToken, reason: impl Into<String>) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.last_error = Some(reason.into());
        true
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Item count of `section`, or 0 when out of bounds.
    pub fn item_count(&self, section: usize) -> usize {
        self.sections.get(section).map_or(0, Section::item_count)
    }

    pub fn total_item_count(&self) -> usize {
        self.sections.iter().map(Section::item_count).sum()
    }

    pub fn year(&self, section: usize) -> Option<i32> {
        self.sections.get(section).and_then(Section::year)
    }

    pub fn handle(&self, section: usize, item: usize) -> Option<&AssetHandle> {
        self.sections.get(section).and_then(|s| s.handle(item))
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Reference date of the rebuild that produced the installed sections.
    pub fn results_date(&self) -> Option<NaiveDateTime> {
        self.results_date
    }

    pub fn status(&self) -> IndexStatus {
        IndexStatus {
            ready: self.installed,
            section_count: self.section_count(),
            total_items: self.total_item_count(),
            error: self.last_error.clone(),
        }
    }

    pub(crate) fn sections_mut(&mut self) -> &mut Vec<Section> {
        &mut self.sections
    }
}
