//! Solar Position Calculation Module
//!
//! Michalsky (1988) approximate solar position: the Astronomical Almanac's
//! low-precision ephemeris, good to about 0.01° between 1950 and 2050.
//!
//! Timestamps are naive and are read as UTC clock time. No timezone conversion
//! happens here; the caller normalizes local time before asking.
//!
//! References:
//! - Michalsky, J.J. (1988). "The Astronomical Almanac's algorithm for
//!   approximate solar position (1950-2050)". Solar Energy 40(3):227-235.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::geo::normalize_azimuth;

// ===================== CONSTANTS =====================

/// Julian date of the J2000.0 epoch (2000-01-01 12:00 TT)
const J2000: f64 = 2_451_545.0;

/// Sidereal hours per solar hour
const SIDEREAL_RATE: f64 = 1.002_737_909;

// ===================== TYPES =====================

/// Sun position as seen from a point on the ground.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolarPosition {
    /// Elevation above the horizon in degrees (negative below)
    pub elevation_deg: f64,
    /// Azimuth in degrees clockwise from North, in [0, 360)
    pub azimuth_deg: f64,
    /// Zenith angle in degrees, always 90 - elevation
    pub zenith_deg: f64,
    /// Solar declination in degrees
    pub declination_deg: f64,
    /// Local hour angle in degrees, in (-180, 180], zero at transit
    pub hour_angle_deg: f64,
}

impl SolarPosition {
    pub fn is_above_horizon(&self) -> bool {
        self.zenith_deg < 90.0
    }
}

// ===================== SOLAR CALCULATION CONTEXT =====================

/// Context for solar position calculations at one observer location.
#[derive(Debug, Clone, Copy)]
pub struct SolarCalc {
    /// Observer latitude in degrees
    pub lat: f64,
    /// Observer longitude in degrees (east positive)
    pub lon: f64,
}

impl SolarCalc {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Sun position at a UTC-normalized instant.
    pub fn position(&self, t: NaiveDateTime) -> SolarPosition {
        let jd = julian_date(t);
        let n = jd - J2000;
        let hour = fractional_hour(t);

        // Mean longitude and mean anomaly (degrees)
        let mean_lon = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
        let mean_anom = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();

        // Ecliptic longitude and obliquity
        let ecl_lon =
            (mean_lon + 1.915 * mean_anom.sin() + 0.020 * (2.0 * mean_anom).sin()).to_radians();
        let obliquity = (23.439 - 0.000_000_4 * n).to_radians();

        // Right ascension and declination
        let ra = (obliquity.cos() * ecl_lon.sin()).atan2(ecl_lon.cos());
        let dec = (obliquity.sin() * ecl_lon.sin()).asin();

        // Greenwich and local mean sidereal time (hours)
        let gmst = (6.697_375 + 0.065_709_824_2 * n + hour).rem_euclid(24.0);
        let lmst = gmst + self.lon / 15.0;
        let ha = wrap_hour_angle(lmst * 15.0 - ra.to_degrees());

        let lat = self.lat.to_radians();
        let ha_rad = ha.to_radians();

        let sin_elev = lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha_rad.cos();
        let elevation_deg = sin_elev.clamp(-1.0, 1.0).asin().to_degrees();

        let azimuth = ha_rad.sin().atan2(ha_rad.cos() * lat.sin() - dec.tan() * lat.cos());
        let azimuth_deg = normalize_azimuth(azimuth.to_degrees() + 180.0);

        SolarPosition {
            elevation_deg,
            azimuth_deg,
            zenith_deg: 90.0 - elevation_deg,
            declination_deg: dec.to_degrees(),
            hour_angle_deg: ha,
        }
    }

    /// Solar transit (local solar noon) for a calendar date, as UTC clock time.
    ///
    /// Starts from 12:00 local mean time and walks the hour angle to zero.
    /// The result may fall on the neighbouring UTC date for longitudes far
    /// from Greenwich.
    pub fn transit(&self, date: NaiveDate) -> NaiveDateTime {
        let noon = date.and_time(chrono::NaiveTime::MIN) + Duration::hours(12);
        let mut t = noon - hours(self.lon / 15.0);

        for _ in 0..8 {
            let ha = self.position(t).hour_angle_deg;
            if ha.abs() < 1e-6 {
                break;
            }
            t -= hours(ha / 15.0 / SIDEREAL_RATE);
        }
        t
    }
}

// ===================== HELPER FUNCTIONS =====================

/// Convenience wrapper for a one-off position.
pub fn solar_position(lat: f64, lon: f64, t: NaiveDateTime) -> SolarPosition {
    SolarCalc::new(lat, lon).position(t)
}

/// Local solar noon for a calendar date, as UTC clock time.
pub fn solar_noon(lat: f64, lon: f64, date: NaiveDate) -> NaiveDateTime {
    SolarCalc::new(lat, lon).transit(date)
}

/// Continuous Julian date of a UTC instant.
///
/// Integer Julian day number of the civil date (which refers to noon) plus
/// the fraction of the day elapsed since noon.
pub fn julian_date(t: NaiveDateTime) -> f64 {
    let (year, month, day) = (t.year() as i64, t.month() as i64, t.day() as i64);
    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    let jdn = day + (153 * m + 2) / 5 + 365 * y + y.div_euclid(4) - y.div_euclid(100)
        + y.div_euclid(400)
        - 32045;
    jdn as f64 + (fractional_hour(t) - 12.0) / 24.0
}

fn fractional_hour(t: NaiveDateTime) -> f64 {
    t.hour() as f64
        + t.minute() as f64 / 60.0
        + (t.second() as f64 + t.nanosecond() as f64 * 1e-9) / 3600.0
}

fn wrap_hour_angle(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0).round() as i64)
}

// ===================== TESTS =====================
