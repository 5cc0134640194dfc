//! Date handling for the command line.
//!
//! GIS script tools hand dates over as `M/D/YYYY`, sometimes with a time
//! component appended. The CDO API wants `YYYY-MM-DD`.

use std::fmt;

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;

/// An inclusive range of observation dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            bail!("start date {} is after end date {}", iso(start), iso(end));
        }

        Ok(DateRange { start, end })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", iso(self.start), iso(self.end))
    }
}

/// Parses a script-tool date such as `3/4/2020` or `12/25/2019 12:00:00 AM`.
pub fn tool_date(input: &str) -> Result<NaiveDate> {
    let date_part = input
        .split_whitespace()
        .next()
        .ok_or_else(|| anyhow!("empty date"))?;

    NaiveDate::parse_from_str(date_part, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y-%m-%d"))
        .map_err(|_| anyhow!("`{}` is not a date in M/D/YYYY form", input))
}

/// Formats a date the way the CDO API expects it.
pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Value parser for clap arguments.
pub fn parse_arg(input: &str) -> Result<NaiveDate, String> {
    tool_date(input).map_err(|e| e.to_string())
}

// -- Tests -------------------------------------------------------------------
