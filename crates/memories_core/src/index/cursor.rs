//! Reference date cursor.

use chrono::{Days, NaiveDate, NaiveDateTime};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Day navigation ran past the representable calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorError {
    pub date: NaiveDateTime,
}

impl Display for CursorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot step one day from {}: out of calendar range", self.date)
    }
}

impl Error for CursorError {}

/// Mutable reference date that selects which day is queried.
///
/// Any date is accepted, including future ones. Stepping keeps the time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCursor {
    date: NaiveDateTime,
}

impl DateCursor {
    pub fn new(date: NaiveDateTime) -> Self {
        Self { date }
    }

    pub fn date(&self) -> NaiveDateTime {
        self.date
    }

    /// Calendar day used for source queries.
    pub fn day(&self) -> NaiveDate {
        self.date.date()
    }

    pub fn set(&mut self, date: NaiveDateTime) {
        self.date = date;
    }

    /// Moves forward exactly one calendar day.
    pub fn advance_day(&mut self) -> Result<NaiveDateTime, CursorError> {
        let next = self
            .date
            .checked_add_days(Days::new(1))
            .ok_or(CursorError { date: self.date })?;
        self.date = next;
        Ok(next)
    }

    /// Moves back exactly one calendar day.
    pub fn retreat_day(&mut self) -> Result<NaiveDateTime, CursorError> {
        let previous = self
            .date
            .checked_sub_days(Days::new(1))
            .ok_or(CursorError { date: self.date })?;
        self.date = previous;
        Ok(previous)
    }
}
