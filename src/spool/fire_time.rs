use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc,
};

use crate::errors::AlarmError;

/// Compute when an alarm set for `hour:minute` fires, as seen from `now`.
///
/// The wall clock is the IANA zone `timezone` if given, otherwise the
/// process local zone. The result is the first `hour:minute:00` at or
/// after `now`; if today's has passed, tomorrow's.
pub fn next_fire_time(
    now: DateTime<Utc>,
    hour: u32,
    minute: u32,
    timezone: Option<&str>,
) -> Result<DateTime<FixedOffset>, AlarmError> {
    match timezone {
        Some(tz_str) => {
            let tz: chrono_tz::Tz = tz_str.parse().map_err(|e| {
                AlarmError::Configuration(format!("Invalid timezone '{}': {}", tz_str, e))
            })?;
            next_occurrence(&now.with_timezone(&tz), hour, minute).map(|t| t.fixed_offset())
        }
        None => {
            next_occurrence(&now.with_timezone(&Local), hour, minute).map(|t| t.fixed_offset())
        }
    }
}

/// An epoch timestamp as wall-clock time in the configured zone.
pub fn wall_clock(
    timestamp: i64,
    timezone: Option<&str>,
) -> Result<DateTime<FixedOffset>, AlarmError> {
    let utc = DateTime::<Utc>::from_timestamp(timestamp, 0).ok_or_else(|| {
        AlarmError::InvalidTime(format!("timestamp {} out of range", timestamp))
    })?;
    match timezone {
        Some(tz_str) => {
            let tz: chrono_tz::Tz = tz_str.parse().map_err(|e| {
                AlarmError::Configuration(format!("Invalid timezone '{}': {}", tz_str, e))
            })?;
            Ok(utc.with_timezone(&tz).fixed_offset())
        }
        None => Ok(utc.with_timezone(&Local).fixed_offset()),
    }
}

/// Next occurrence of `hour:minute:00` in `now`'s own zone.
pub fn next_occurrence<Tz: TimeZone>(
    now: &DateTime<Tz>,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Tz>, AlarmError> {
    let wanted = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| AlarmError::InvalidTime(format!("{:02}:{:02}", hour, minute)))?;
    let tz = now.timezone();
    let mut date = now.date_naive();

    // Today, tomorrow, and one spare day in case a DST shift pushed a
    // candidate back behind `now`.
    for _ in 0..3 {
        if let Some(candidate) = resolve_local(&tz, date.and_time(wanted)) {
            if candidate >= *now {
                return Ok(candidate);
            }
        }
        date = date
            .succ_opt()
            .ok_or_else(|| AlarmError::InvalidTime(format!("no date after {}", date)))?;
    }

    Err(AlarmError::InvalidTime(format!(
        "no occurrence of {:02}:{:02} found",
        hour, minute
    )))
}

/// Map a wall-clock time to an instant. Ambiguous times take the earlier
/// instant; times inside a spring-forward gap are moved one hour later.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest(),
    }
}
