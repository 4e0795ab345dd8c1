//! Validity window parsing and the inclusive range check.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc};

use crate::error::GateError;

/// Formats accepted for timestamps without an explicit offset. These are
/// read in the host's local offset, as viewer date parsers do.
const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Inclusive `[start, end]` interval during which protected content may be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl ValidityWindow {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self { start, end }
    }

    /// Builds a window where a missing bound is left open: the start falls
    /// back to the Unix epoch and the end to 9999-12-31T23:59:59Z.
    pub fn from_bounds(start: Option<DateTime<FixedOffset>>, end: Option<DateTime<FixedOffset>>) -> Self {
        Self {
            start: start.unwrap_or_else(open_start),
            end: end.unwrap_or_else(open_end),
        }
    }

    /// Parses both compiled literals. `local` is the offset applied to
    /// literals that carry none.
    pub fn parse(start: &str, end: &str, local: &FixedOffset) -> Result<Self, GateError> {
        let start = parse_timestamp(start, local)
            .map_err(|e| GateError::ClockOrParseFailure(format!("start: {}", e.message())))?;
        let end = parse_timestamp(end, local)
            .map_err(|e| GateError::ClockOrParseFailure(format!("end: {}", e.message())))?;
        Ok(Self { start, end })
    }

    /// Both bounds are inclusive. An inverted window contains nothing.
    pub fn contains(&self, now: &DateTime<FixedOffset>) -> bool {
        *now >= self.start && *now <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// RFC 3339 literals suitable for substitution into the viewer script.
    pub fn to_literals(&self) -> (String, String) {
        (
            self.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.end.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )
    }
}

/// Parses a single timestamp literal the way viewer date parsers read them:
/// RFC 3339 with offset, a local date-time without offset, or a bare date
/// taken as UTC midnight.
pub fn parse_timestamp(literal: &str, local: &FixedOffset) -> Result<DateTime<FixedOffset>, GateError> {
    let trimmed = literal.trim();
    if trimmed.is_empty() {
        return Err(GateError::ClockOrParseFailure(invalid_timestamp_message(trimmed)));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed);
    }

    for format in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return local.from_local_datetime(&naive).single().ok_or_else(|| {
                GateError::ClockOrParseFailure(format!("ambiguous local time '{}'", trimmed))
            });
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.fix().from_utc_datetime(&midnight));
        }
    }

    Err(GateError::ClockOrParseFailure(invalid_timestamp_message(trimmed)))
}

/// Reason reported when `literal` cannot be read as a timestamp. The viewer
/// script reports the same text.
pub fn invalid_timestamp_message(literal: &str) -> String {
    let trimmed = literal.trim();
    if trimmed.is_empty() {
        "empty timestamp".to_string()
    } else {
        format!("invalid timestamp '{}'", trimmed)
    }
}

fn open_start() -> DateTime<FixedOffset> {
    Utc.fix().from_utc_datetime(&NaiveDateTime::default())
}

fn open_end() -> DateTime<FixedOffset> {
    let naive = NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .unwrap_or(NaiveDateTime::MAX);
    Utc.fix().from_utc_datetime(&naive)
}
