//! Time-window resolution: calendar day key + IANA zone + window length
//! → absolute half-open instant range.
//!
//! Pure and deterministic; no I/O. The window covers local midnight of
//! `dateKey − (windowDays − 1)` up to (exclusive) local midnight of the
//! day after `dateKey`, both in the requested zone, so the digest for a
//! given day always spans whole local calendar days regardless of DST.

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Window lengths a digest may cover, in days.
pub const VALID_WINDOW_DAYS: [u32; 3] = [1, 3, 7];

/// Half-open absolute time range `[start, end_exclusive)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end_exclusive: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end_exclusive
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("INVALID_TIMEZONE: unknown IANA timezone `{0}`")]
    InvalidTimezone(String),
    #[error("INVALID_WINDOW_DAYS: windowDays must be 1, 3 or 7, got {0}")]
    InvalidWindowDays(u32),
    #[error("INVALID_DATE_KEY: expected YYYY-MM-DD, got `{0}`")]
    InvalidDateKey(String),
}

/// Resolve `(date_key, timezone, window_days)` into an absolute window.
///
/// `window_days` outside {1, 3, 7} is a validation error, never clamped.
pub fn resolve_window(
    date_key: &str,
    timezone: &str,
    window_days: u32,
) -> Result<TimeWindow, WindowError> {
    if !VALID_WINDOW_DAYS.contains(&window_days) {
        return Err(WindowError::InvalidWindowDays(window_days));
    }
    let tz: Tz = timezone
        .parse()
        .map_err(|_| WindowError::InvalidTimezone(timezone.to_string()))?;
    let day = NaiveDate::parse_from_str(date_key, "%Y-%m-%d")
        .map_err(|_| WindowError::InvalidDateKey(date_key.to_string()))?;

    let first_day = day
        .checked_sub_days(Days::new(u64::from(window_days) - 1))
        .ok_or_else(|| WindowError::InvalidDateKey(date_key.to_string()))?;
    let day_after = day
        .checked_add_days(Days::new(1))
        .ok_or_else(|| WindowError::InvalidDateKey(date_key.to_string()))?;

    Ok(TimeWindow {
        start: local_midnight(tz, first_day).with_timezone(&Utc),
        end_exclusive: local_midnight(tz, day_after).with_timezone(&Utc),
    })
}

/// Local day key ("YYYY-MM-DD") of an instant in the given zone.
pub fn local_day_key(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// First valid instant of a local calendar day.
///
/// Midnight can be skipped by a DST gap (e.g. America/Sao_Paulo) or occur
/// twice at a fall-back; take the earliest valid instant at or after 00:00,
/// probing forward in 15-minute steps through the gap.
fn local_midnight(tz: Tz, day: NaiveDate) -> DateTime<Tz> {
    let mut t = NaiveTime::from_hms_opt(0, 0, 0).expect("00:00:00 is valid");
    loop {
        match tz.from_local_datetime(&day.and_time(t)) {
            LocalResult::Single(dt) => return dt,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => {
                t = t + chrono::Duration::minutes(15);
            }
        }
    }
}
