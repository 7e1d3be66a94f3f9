//! Timestamp formats for console output
//!
//! Event timestamps are milliseconds since the Unix epoch. The console
//! transport renders them with one of these formats.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// How the console transport prints an event's timestamp.
///
/// # Examples
///
/// ```
/// use rust_remote_logger::TimestampFormat;
///
/// let format = TimestampFormat::Iso8601;
/// assert_eq!(format.format_millis(0), "1970-01-01T00:00:00.000Z");
///
/// let format = TimestampFormat::Custom("%Y-%m-%d".to_string());
/// assert_eq!(format.format_millis(0), "1970-01-01");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// `2025-01-08T10:30:45.123Z`
    #[default]
    Iso8601,

    /// `2025-01-08T10:30:45.123+00:00`
    Rfc3339,

    /// Time of day only: `10:30:45.123`
    TimeOfDay,

    /// The raw value: `1736332245123`
    UnixMillis,

    /// Any strftime format string
    Custom(String),
}

impl TimestampFormat {
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Iso8601 => datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            TimestampFormat::Rfc3339 => {
                datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
            }
            TimestampFormat::TimeOfDay => datetime.format("%H:%M:%S%.3f").to_string(),
            TimestampFormat::UnixMillis => datetime.timestamp_millis().to_string(),
            TimestampFormat::Custom(format_str) => datetime.format(format_str).to_string(),
        }
    }

    /// Format an event timestamp. Out-of-range values are printed as the raw number.
    #[must_use]
    pub fn format_millis(&self, timestamp_ms: i64) -> String {
        match Utc.timestamp_millis_opt(timestamp_ms).single() {
            Some(datetime) => self.format(&datetime),
            None => timestamp_ms.to_string(),
        }
    }
}
