//! Timestamp formatting for log lines
//!
//! Every timestamp has the fixed-width shape `[YYYY/MM/DD HH:MM:SS TZ] `,
//! rendered in the registry's configured zone.

use super::error::{OutputError, Result};
use chrono::{DateTime, FixedOffset, Local, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

const STAMP_FORMAT: &str = "[%Y/%m/%d %H:%M:%S %Z] ";

/// The machine's zone by name, when the OS reports one chrono-tz knows.
/// Without it local stamps fall back to a numeric offset.
static LOCAL_ZONE: Lazy<Option<Tz>> = Lazy::new(|| {
    iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| name.parse::<Tz>().ok())
});

/// Zone used when rendering timestamps
///
/// # Examples
///
/// ```
/// use rust_output_system::core::Timezone;
///
/// assert_eq!(Timezone::parse("utc").unwrap(), Timezone::Utc);
/// assert_eq!(Timezone::parse("+05:30").unwrap(), Timezone::Fixed(19800));
/// assert!(matches!(Timezone::parse("Asia/Tokyo"), Ok(Timezone::Named(_))));
/// assert!(Timezone::parse("Mars/Olympus").is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timezone {
    /// The machine's local zone
    #[default]
    Local,
    Utc,
    /// Fixed offset in seconds east of UTC
    Fixed(i32),
    /// IANA zone such as `Europe/Berlin`, stamped with its abbreviation
    Named(Tz),
}

impl Timezone {
    /// Parse a zone name: `local`, `utc`/`gmt`/`z`, an IANA name such as
    /// `America/New_York`, or an offset such as `+05:30`, `-0800` or `+02`.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" => return Ok(Timezone::Local),
            "utc" | "gmt" | "z" | "etc/utc" => return Ok(Timezone::Utc),
            _ => {}
        }

        if let Ok(zone) = trimmed.parse::<Tz>() {
            return Ok(Timezone::Named(zone));
        }

        let invalid = || OutputError::InvalidTimezone(name.to_string());

        let (sign, rest) = match trimmed.chars().next() {
            Some('+') => (1, &trimmed[1..]),
            Some('-') => (-1, &trimmed[1..]),
            _ => return Err(invalid()),
        };

        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let (hours, minutes) = match digits.len() {
            1 | 2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
            4 => (
                digits[..2].parse::<i32>().map_err(|_| invalid())?,
                digits[2..].parse::<i32>().map_err(|_| invalid())?,
            ),
            _ => return Err(invalid()),
        };

        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }

        Ok(Timezone::Fixed(sign * (hours * 3600 + minutes * 60)))
    }

    /// Render `datetime` as a log timestamp in this zone
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_output_system::core::Timezone;
    /// use chrono::{TimeZone, Utc};
    ///
    /// let at = Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45).unwrap();
    /// assert_eq!(Timezone::Utc.format(&at), "[2025/01/08 10:30:45 UTC] ");
    /// ```
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            Timezone::Local => match *LOCAL_ZONE {
                Some(zone) => datetime.with_timezone(&zone).format(STAMP_FORMAT).to_string(),
                None => datetime.with_timezone(&Local).format(STAMP_FORMAT).to_string(),
            },
            Timezone::Named(zone) => datetime.with_timezone(zone).format(STAMP_FORMAT).to_string(),
            Timezone::Utc => datetime.format(STAMP_FORMAT).to_string(),
            Timezone::Fixed(seconds) => match FixedOffset::east_opt(*seconds) {
                Some(offset) => datetime
                    .with_timezone(&offset)
                    .format(STAMP_FORMAT)
                    .to_string(),
                None => datetime.format(STAMP_FORMAT).to_string(),
            },
        }
    }

    /// Current time as a log timestamp
    #[must_use]
    pub fn now(&self) -> String {
        self.format(&Utc::now())
    }
}
