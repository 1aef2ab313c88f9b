//! Time and Timezone Utilities Module
//!
//! Resolves the user's local date and clock time into the UTC-normalized
//! instants the library works with.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_english::{Dialect, parse_date_string};
use chrono_tz::Tz;
use iana_time_zone::get_timezone;
use rooftop_irradiance::LonLat;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};
use tzf_rs::DefaultFinder;

// tzf-rs DefaultFinder is pre-compiled and very fast
static TZF_FINDER: OnceLock<DefaultFinder> = OnceLock::new();

#[derive(Debug, Error, PartialEq)]
pub enum TimeError {
    #[error("invalid time format '{0}'. Use HH:MM, HH:MM:SS, or HH:MM:SS.ns")]
    Clock(String),
    #[error("invalid date '{0}'")]
    Date(String),
    #[error("unknown time zone '{0}'")]
    UnknownZone(String),
    #[error("the time {time} does not exist on {date} in {zone} (DST gap)")]
    Nonexistent { date: NaiveDate, time: NaiveTime, zone: Tz },
}

// ===================== TIME PARSING =====================

/// Parse a clock time in HH:MM[:SS[.fffffffff]] format.
pub fn parse_clock(s: &str) -> Result<NaiveTime, TimeError> {
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .into_iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s.trim(), fmt).ok())
        .ok_or_else(|| TimeError::Clock(s.to_string()))
}

/// Parse a date, including natural-language forms, relative to `now` in `tz`.
pub fn parse_date(s: &str, tz: Tz, now: DateTime<Utc>) -> Result<NaiveDate, TimeError> {
    parse_date_string(s, now.with_timezone(&tz), Dialect::Us)
        .map(|dt| dt.date_naive())
        .map_err(|_| TimeError::Date(s.to_string()))
}

// ===================== TIMEZONE UTILITIES =====================

/// The system's configured timezone, UTC when it cannot be determined.
pub fn system_timezone() -> Tz {
    get_timezone().ok().and_then(|s| s.parse().ok()).unwrap_or(Tz::UTC)
}

/// Timezone of a geographic location, UTC when the finder has no answer.
pub fn resolve_timezone(location: LonLat) -> Tz {
    let finder = TZF_FINDER.get_or_init(DefaultFinder::new);
    finder.get_tz_name(location.lon, location.lat).parse::<Tz>().unwrap_or(Tz::UTC)
}

/// Pick the zone named on the command line.
///
/// `location` is only consulted for the "location" keyword.
pub fn select_timezone(name: &str, location: LonLat) -> Result<Tz, TimeError> {
    let tz = match name.to_lowercase().as_str() {
        "system" => system_timezone(),
        "location" => resolve_timezone(location),
        "utc" => Tz::UTC,
        _ => name.parse().map_err(|_| TimeError::UnknownZone(name.to_string()))?,
    };
    debug!(zone = %tz, "selected time zone");
    Ok(tz)
}

/// Convert a local wall-clock time in `tz` to UTC.
///
/// A time repeated by a DST fall-back resolves to its earlier instant; a time
/// skipped by spring-forward is an error.
pub fn local_to_utc(tz: Tz, date: NaiveDate, time: NaiveTime) -> Result<NaiveDateTime, TimeError> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(t) => Ok(t.naive_utc()),
        LocalResult::Ambiguous(early, late) => {
            warn!(
                "time {} is ambiguous (DST transition), using early option: {} (vs {})",
                time,
                early.format("%H:%M:%S %Z"),
                late.format("%H:%M:%S %Z")
            );
            Ok(early.naive_utc())
        }
        LocalResult::None => Err(TimeError::Nonexistent { date, time, zone: tz }),
    }
}

/// Show a UTC-normalized instant in `tz`.
pub fn to_local(tz: Tz, utc: NaiveDateTime) -> DateTime<Tz> {
    Utc.from_utc_datetime(&utc).with_timezone(&tz)
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::America::New_York;
    use chrono_tz::Asia::Bangkok;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_clock_parsing() {
        assert_eq!(parse_clock("12:30"), Ok(t(12, 30)));
        assert_eq!(parse_clock("12:30:45").unwrap().second(), 45);
        assert_eq!(parse_clock("12:30:45.123456789").unwrap().nanosecond(), 123_456_789);

        for bad in ["a", "21", "25:00", "12:60", "12:30:99"] {
            assert_eq!(
                parse_clock(bad),
                Err(TimeError::Clock(bad.to_string())),
                "{} should fail",
                bad
            );
        }
    }

    #[test]
    fn test_date_parsing() {
        let now = Utc.with_ymd_and_hms(2024, 6, 19, 20, 0, 0).unwrap();
        assert_eq!(parse_date("2024-06-20", Tz::UTC, now), Ok(d(2024, 6, 20)));
        // 20:00 UTC is already the next day in Bangkok
        assert_eq!(parse_date("today", Bangkok, now), Ok(d(2024, 6, 20)));
        assert!(parse_date("not a date at all", Tz::UTC, now).is_err());
    }

    #[test]
    fn test_select_timezone() {
        let bangkok = LonLat::new(100.54, 13.67);
        assert_eq!(select_timezone("utc", bangkok), Ok(Tz::UTC));
        assert_eq!(select_timezone("UTC", bangkok), Ok(Tz::UTC));
        assert_eq!(select_timezone("America/New_York", bangkok), Ok(New_York));
        assert_eq!(select_timezone("location", bangkok), Ok(Bangkok));
        assert_eq!(
            select_timezone("Mars/Olympus", bangkok),
            Err(TimeError::UnknownZone("Mars/Olympus".into()))
        );
    }

    #[test]
    fn test_resolve_timezone_new_york() {
        // Washington DC / New York region
        assert_eq!(resolve_timezone(LonLat::new(-77.0365, 38.8977)), New_York);
    }

    #[test]
    fn test_local_to_utc() {
        let utc = local_to_utc(Bangkok, d(2024, 6, 20), t(12, 0)).unwrap();
        assert_eq!(utc, d(2024, 6, 20).and_hms_opt(5, 0, 0).unwrap());

        // New York falls back at 02:00 EDT on 2024-11-03; 01:30 happens twice
        let ambiguous = local_to_utc(New_York, d(2024, 11, 3), t(1, 30)).unwrap();
        let early = d(2024, 11, 3).and_hms_opt(5, 30, 0).unwrap();
        assert_eq!(ambiguous, early, "earlier (EDT) instant");

        // and springs forward at 02:00 EST on 2024-03-10
        assert!(matches!(
            local_to_utc(New_York, d(2024, 3, 10), t(2, 30)),
            Err(TimeError::Nonexistent { .. })
        ));
    }

    #[test]
    fn test_to_local() {
        let local = to_local(Bangkok, d(2024, 6, 20).and_hms_opt(5, 0, 0).unwrap());
        assert_eq!(local.hour(), 12);
        assert_eq!(local.format("%:z").to_string(), "+07:00");
    }
}
