//! Conversion between human date input and stored timestamps.
//!
//! Forms hand over `yyyy-MM-ddTHH:mm` strings in the salon's local time; the
//! store keeps UTC instants. [`LocalTime`] carries the salon's UTC offset so
//! both directions agree.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

use crate::error::SalonError;

/// Format used by date-time inputs
pub const DATE_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// A date supplied by a caller, either already resolved or as raw form text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DateInput {
    /// No date given
    #[default]
    Empty,
    /// Raw text, parsed in the salon's local time
    Text(String),
    /// Already an instant
    At(DateTime<Utc>),
}

impl From<DateTime<Utc>> for DateInput {
    fn from(value: DateTime<Utc>) -> Self {
        DateInput::At(value)
    }
}

impl From<Option<DateTime<Utc>>> for DateInput {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(DateInput::Empty, DateInput::At)
    }
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        DateInput::Text(value.to_string())
    }
}

impl From<String> for DateInput {
    fn from(value: String) -> Self {
        DateInput::Text(value)
    }
}

/// The salon's wall clock: a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    offset: FixedOffset,
}

impl Default for LocalTime {
    fn default() -> Self {
        Self::utc()
    }
}

impl LocalTime {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Build from an offset in minutes east of UTC (e.g. `330` for +05:30)
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, SalonError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
            .ok_or_else(|| SalonError::validation(format!("UTC offset out of range: {minutes} minutes")))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Parse a form value. Blank or unparseable input yields `None`.
    ///
    /// Accepts RFC 3339 instants, local date-times with or without seconds,
    /// and bare dates (local midnight).
    pub fn parse(&self, value: &str) -> Option<DateTime<Utc>> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(instant.with_timezone(&Utc));
        }

        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })?;

        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|local| local.with_timezone(&Utc))
    }

    pub fn resolve(&self, input: &DateInput) -> Option<DateTime<Utc>> {
        match input {
            DateInput::Empty => None,
            DateInput::Text(text) => self.parse(text),
            DateInput::At(instant) => Some(*instant),
        }
    }

    /// Inverse of [`LocalTime::parse`] for form prefill; `None` renders empty
    pub fn format_input(&self, ts: Option<DateTime<Utc>>) -> String {
        ts.map(|ts| ts.with_timezone(&self.offset).format(DATE_INPUT_FORMAT).to_string())
            .unwrap_or_default()
    }

    /// `Jan 5, 14:30`
    pub fn format_date_time_short(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.offset).format("%b %-d, %H:%M").to_string()
    }

    /// `Jan 5`
    pub fn format_date_short(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.offset).format("%b %-d").to_string()
    }

    /// `14:30`
    pub fn format_time_short(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.offset).format("%H:%M").to_string()
    }
}
