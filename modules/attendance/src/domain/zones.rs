//! Zoned-calendar helpers. Every conversion goes through the zone's rules for
//! the specific date involved; fixed offsets are never cached.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// User zone value meaning "follow the browser/device", i.e. not set.
pub const DEVICE_TIMEZONE: &str = "device";

/// Parse `name` as an IANA zone, falling back to `default` when it is blank or unknown.
pub fn parse_or_default(name: Option<&str>, default: Tz) -> Tz {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => default,
        Some(raw) => raw.parse::<Tz>().unwrap_or_else(|_| {
            warn!(timezone = raw, fallback = %default.name(), "unknown time zone, using default");
            default
        }),
    }
}

/// First configured name wins; a bad first choice falls back to `default`
/// rather than to the next candidate.
pub fn resolve(candidates: &[Option<&str>], default: Tz) -> Tz {
    let chosen = candidates
        .iter()
        .flatten()
        .map(|n| n.trim())
        .find(|n| !n.is_empty());
    parse_or_default(chosen, default)
}

/// Attach `tz` to a wall-clock time.
///
/// Ambiguous times (autumn fold) take the earlier instant. Times inside a
/// spring-forward gap are read with the offset in force before the gap, so
/// 02:30 on a New York spring-forward day becomes 03:30 EDT.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let before = tz
                .offset_from_utc_datetime(&(naive - Duration::days(1)))
                .fix()
                .local_minus_utc();
            tz.from_utc_datetime(&(naive - Duration::seconds(i64::from(before))))
        }
    }
}

pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    localize(tz, date.and_time(NaiveTime::MIN))
}

/// UTC bounds `[local midnight, next local midnight)` of a local calendar date.
/// 23 or 25 hours long across DST changes.
pub fn day_bounds(tz: Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(tz, date).with_timezone(&Utc);
    let next = date.succ_opt().unwrap_or(date);
    let end = local_midnight(tz, next).with_timezone(&Utc);
    (start, end)
}

pub fn local_date(tz: Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}
