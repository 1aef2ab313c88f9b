//! Gridded Dataset Capability
//!
//! The retrieval chain only ever needs two things from an irradiance dataset:
//! a scalar aggregate over a region and date range, and the area of a region.
//! Everything provider-specific lives behind [`GriddedDataset`].

pub mod grid;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::geo::{LonLat, Polygon, buffered_area_m2};

pub use grid::GridDataset;

// ===================== REQUEST TYPES =====================

/// Region a query aggregates over.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Polygon(Polygon),
    /// Polygon grown outward by `radius_m`
    Buffered { polygon: Polygon, radius_m: f64 },
    Point(LonLat),
}

impl Geometry {
    /// Whether `p` falls inside the region. Points contain nothing.
    pub fn contains(&self, p: LonLat) -> bool {
        match self {
            Geometry::Polygon(polygon) => polygon.contains(p),
            Geometry::Buffered { polygon, radius_m } => polygon.distance_m(p) <= *radius_m,
            Geometry::Point(_) => false,
        }
    }

    /// Local planar area estimate in m².
    pub fn area_m2(&self) -> f64 {
        match self {
            Geometry::Polygon(polygon) => polygon.area_m2(),
            Geometry::Buffered { polygon, radius_m } => {
                buffered_area_m2(polygon.area_m2(), polygon.perimeter_m(), *radius_m)
            }
            Geometry::Point(_) => 0.0,
        }
    }

    /// (min_lon, min_lat, max_lon, max_lat) including any buffer.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        match self {
            Geometry::Polygon(polygon) => polygon.bounds(),
            Geometry::Buffered { polygon, radius_m } => {
                let (x0, y0, x1, y1) = polygon.bounds()?;
                let proj = polygon.projection();
                let dx = proj.meters_to_deg_lon(*radius_m);
                let dy = proj.meters_to_deg_lat(*radius_m);
                Some((x0 - dx, y0 - dy, x1 + dx, y1 + dy))
            }
            Geometry::Point(p) => Some((p.lon, p.lat, p.lon, p.lat)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Polygon(_) => "polygon",
            Geometry::Buffered { .. } => "buffered",
            Geometry::Point(_) => "point",
        }
    }
}

/// Spatial reducer applied to the sampled pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Mean,
    Median,
    Mode,
}

impl Reducer {
    pub const ALL: [Reducer; 3] = [Reducer::Mean, Reducer::Median, Reducer::Mode];

    /// Reduce a sample; None when it is empty.
    ///
    /// Mode picks the most frequent exact value, the lowest one on ties.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Reducer::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Reducer::Median => {
                let sorted = sorted(values);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
            Reducer::Mode => {
                let sorted = sorted(values);
                let (mut best, mut best_run) = (sorted[0], 0);
                let mut i = 0;
                while i < sorted.len() {
                    let run = sorted[i..].iter().take_while(|v| **v == sorted[i]).count();
                    if run > best_run {
                        best = sorted[i];
                        best_run = run;
                    }
                    i += run;
                }
                Some(best)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Median => "median",
            Reducer::Mode => "mode",
        }
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// How pixel values are resampled when the query scale differs from native.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window from `lookback_days` to `lag_days` before `today`.
    pub fn trailing(today: NaiveDate, lookback_days: u32, lag_days: u32) -> Self {
        let back = |days: u32| {
            today.checked_sub_days(Days::new(days.into())).unwrap_or(NaiveDate::MIN)
        };
        Self { start: back(lookback_days), end: back(lag_days) }
    }

    /// Number of days covered, 0 for an inverted window.
    pub fn days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One aggregate query.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub geometry: Geometry,
    pub date_range: DateRange,
    /// Pixel size the dataset is sampled at (m)
    pub scale_m: f64,
    pub reducer: Reducer,
    pub resampling: Resampling,
    /// Let the provider coarsen the query instead of failing on size
    pub best_effort: bool,
    pub timeout: Duration,
}

impl AggregateRequest {
    pub fn new(geometry: Geometry, date_range: DateRange, scale_m: f64) -> Self {
        Self {
            geometry,
            date_range,
            scale_m,
            reducer: Reducer::Mean,
            resampling: Resampling::Nearest,
            best_effort: true,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ===================== CAPABILITY =====================

/// Read access to a gridded daily surface solar radiation product.
///
/// Aggregates are daily radiation sums in J/m², averaged over the date range.
/// Implementations must be deterministic for identical requests.
pub trait GriddedDataset: Send + Sync {
    /// Scalar aggregate of the region, or None when no pixel contributes.
    fn aggregate(&self, request: &AggregateRequest) -> Result<Option<f64>, DatasetError>;

    /// Area of a region in m² as the provider measures it.
    fn area(&self, geometry: &Geometry) -> Result<f64, DatasetError> {
        Ok(geometry.area_m2())
    }

    /// Native pixel size (m).
    fn native_resolution_m(&self) -> f64;
}

macro_rules! forward_dataset {
    ($($wrapper:ident),*) => {$(
        impl<T: GriddedDataset + ?Sized> GriddedDataset for $wrapper<T> {
            fn aggregate(&self, request: &AggregateRequest) -> Result<Option<f64>, DatasetError> {
                (**self).aggregate(request)
            }

            fn area(&self, geometry: &Geometry) -> Result<f64, DatasetError> {
                (**self).area(geometry)
            }

            fn native_resolution_m(&self) -> f64 {
                (**self).native_resolution_m()
            }
        }
    )*};
}

forward_dataset!(Box, Arc);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::METERS_PER_DEGREE;

    fn square(side_m: f64) -> Polygon {
        let d = side_m / METERS_PER_DEGREE;
        Polygon::new([(0.0, 0.0), (d, 0.0), (d, d), (0.0, d)])
    }

    #[test]
    fn test_reducers() {
        let v = [3.0, 1.0, 2.0, 2.0, 10.0];
        assert_eq!(Reducer::Mean.apply(&v), Some(3.6));
        assert_eq!(Reducer::Median.apply(&v), Some(2.0));
        assert_eq!(Reducer::Mode.apply(&v), Some(2.0));

        assert_eq!(Reducer::Median.apply(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        // All unique: lowest wins the tie
        assert_eq!(Reducer::Mode.apply(&[5.0, 4.0, 6.0]), Some(4.0));

        for r in Reducer::ALL {
            assert_eq!(r.apply(&[]), None, "{} of empty", r.as_str());
        }
    }

    #[test]
    fn test_trailing_window() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let range = DateRange::trailing(today, 180, 30);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(range.days(), 151);
        assert_eq!(range.to_string(), "2024-01-03..2024-06-01");

        let inverted = DateRange::new(range.end, range.start);
        assert!(inverted.is_empty());
        assert_eq!(inverted.days(), 0);
    }

    #[test]
    fn test_buffered_geometry() {
        let poly = square(20.0);
        let buffered = Geometry::Buffered { polygon: poly.clone(), radius_m: 100.0 };

        // 50 m east of the square's east side
        let outside = LonLat::new(70.0 / METERS_PER_DEGREE, 10.0 / METERS_PER_DEGREE);
        assert!(!Geometry::Polygon(poly.clone()).contains(outside));
        assert!(buffered.contains(outside));

        let far = LonLat::new(200.0 / METERS_PER_DEGREE, 10.0 / METERS_PER_DEGREE);
        assert!(!buffered.contains(far));

        let expected = 400.0 + 80.0 * 100.0 + std::f64::consts::PI * 100.0 * 100.0;
        assert!((buffered.area_m2() - expected).abs() / expected < 1e-3);

        let (x0, _, x1, _) = buffered.bounds().unwrap();
        assert!(((x1 - x0) * METERS_PER_DEGREE - 220.0).abs() < 0.5);
    }

    #[test]
    fn test_point_geometry() {
        let g = Geometry::Point(LonLat::new(1.0, 2.0));
        assert_eq!(g.area_m2(), 0.0);
        assert!(!g.contains(LonLat::new(1.0, 2.0)));
        assert_eq!(g.bounds(), Some((1.0, 2.0, 1.0, 2.0)));
        assert_eq!(g.kind(), "point");
    }
}
