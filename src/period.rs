use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("--from-date {from} is after --to-date {to}")]
    Inverted { from: NaiveDate, to: NaiveDate },
}

/// Inclusive calendar window `[from, to]` an analysis run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Period {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, PeriodError> {
        if from > to {
            return Err(PeriodError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    /// Whether a timestamp falls on a day inside the window (UTC days).
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.from <= day && day <= self.to
    }

    /// `from..to` as the search API expects it in date qualifiers.
    pub fn as_range_qualifier(&self) -> String {
        format!("{}..{}", self.from.format("%Y-%m-%d"), self.to.format("%Y-%m-%d"))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.from, self.to)
    }
}

/// clap value parser for `YYYY-MM-DD` arguments.
pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid date: {}. Use the YYYY-MM-DD format", value))
}
