use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse an RFC 3339 timestamp such as `2024-05-01T10:00:00+02:00`
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a timestamp without offset (Graph style, `2024-05-01T10:00:00.0000000`)
/// interpreting it in `tz`.
pub fn parse_naive_in(value: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    if let Some(dt) = parse_rfc3339(value) {
        return Some(dt);
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;

    local_to_utc(&naive, tz)
}

/// Parse a `YYYY-MM-DD` date as midnight in `tz`
pub fn parse_date_in(value: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    local_to_utc(&midnight, tz)
}

/// Resolve a local wall-clock time; gaps move forward by an hour and
/// ambiguous times take the earlier instant.
fn local_to_utc(naive: &NaiveDateTime, tz: &Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(naive) {
        chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        chrono::LocalResult::None => {
            let shifted = naive.checked_add_signed(Duration::hours(1))?;
            match tz.from_local_datetime(&shifted) {
                chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
                chrono::LocalResult::None => None,
            }
        }
    }
}

/// Format an instant as `HH:MM` in `tz`
pub fn format_clock(dt: &DateTime<Utc>, tz: &Tz) -> String {
    dt.with_timezone(tz).format("%H:%M").to_string()
}

/// Human readable distance such as `in 5 min` or `2 h 10 min ago`
pub fn format_relative(from: &DateTime<Utc>, to: &DateTime<Utc>) -> String {
    let delta = to.signed_duration_since(*from);
    let minutes = delta.num_minutes().abs();
    let text = if minutes < 1 {
        return "now".to_string();
    } else if minutes < 60 {
        format!("{} min", minutes)
    } else if minutes % 60 == 0 {
        format!("{} h", minutes / 60)
    } else {
        format!("{} h {} min", minutes / 60, minutes % 60)
    };

    if delta > Duration::zero() {
        format!("in {}", text)
    } else {
        format!("{} ago", text)
    }
}

/// Seconds since the epoch for `now`
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}
