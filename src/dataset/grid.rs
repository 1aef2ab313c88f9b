//! Regular lat/lon grid loaded from JSON.
//!
//! Each cell holds a daily surface solar radiation sum (J/m²), or null where
//! the product has no data. Row 0 is the northernmost row.
//!
//! Aggregation mimics a server-side region reducer: the region is covered by
//! a lattice of sub-pixel samples at a quarter of the query scale, each sample
//! takes the value of the scale-pixel it falls in, and the reducer runs over
//! the samples. A region that no sample lands in aggregates to None.

use std::path::Path;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{AggregateRequest, Geometry, GriddedDataset, Resampling};
use crate::error::DatasetError;
use crate::geo::{LonLat, METERS_PER_DEGREE};

/// Samples per scale-pixel along each axis.
const SUBSAMPLES_PER_PIXEL: f64 = 4.0;

const DEFAULT_MAX_SAMPLES: usize = 1_000_000;

fn default_max_samples() -> usize {
    DEFAULT_MAX_SAMPLES
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridDataset {
    /// Longitude of the grid's west edge
    pub origin_lon: f64,
    /// Latitude of the grid's north edge
    pub origin_lat: f64,
    /// Cell size in degrees on both axes
    pub cell_deg: f64,
    /// Nominal native resolution (m); derived from `cell_deg` when absent
    #[serde(default)]
    pub resolution_m: Option<f64>,
    /// `values[row][col]`, rows north to south
    pub values: Vec<Vec<Option<f64>>>,
    /// Largest lattice a single query may sample
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

impl GridDataset {
    pub fn new(
        origin_lon: f64,
        origin_lat: f64,
        cell_deg: f64,
        values: Vec<Vec<Option<f64>>>,
    ) -> Self {
        Self {
            origin_lon,
            origin_lat,
            cell_deg,
            resolution_m: None,
            values,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn from_json(text: &str) -> Result<Self, DatasetError> {
        let grid: Self = serde_json::from_str(text)?;
        grid.validate()?;
        Ok(grid)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let grid = Self::from_json(&std::fs::read_to_string(path)?)?;
        debug!(
            path = %path.display(),
            rows = grid.rows(),
            cols = grid.cols(),
            "loaded grid dataset"
        );
        Ok(grid)
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        if !(self.cell_deg.is_finite() && self.cell_deg > 0.0) {
            return Err(DatasetError::Invalid(format!(
                "cell_deg must be positive, got {}",
                self.cell_deg
            )));
        }
        if !self.origin_lon.is_finite() || !self.origin_lat.is_finite() {
            return Err(DatasetError::Invalid("origin must be finite".into()));
        }
        let cols = self.cols();
        if self.rows() == 0 || cols == 0 {
            return Err(DatasetError::Invalid("grid has no cells".into()));
        }
        if let Some(r) = self.values.iter().position(|row| row.len() != cols) {
            return Err(DatasetError::Invalid(format!(
                "row {} has {} cells, expected {}",
                r,
                self.values[r].len(),
                cols
            )));
        }
        if let Some(res) = self.resolution_m
            && !(res.is_finite() && res > 0.0)
        {
            return Err(DatasetError::Invalid(format!(
                "resolution_m must be positive, got {}",
                res
            )));
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.values.len()
    }

    pub fn cols(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    /// (min_lon, min_lat, max_lon, max_lat)
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        (
            self.origin_lon,
            self.origin_lat - self.rows() as f64 * self.cell_deg,
            self.origin_lon + self.cols() as f64 * self.cell_deg,
            self.origin_lat,
        )
    }

    fn get(&self, row: i64, col: i64) -> Option<f64> {
        if row < 0 || col < 0 {
            return None;
        }
        let v = (*self.values.get(row as usize)?.get(col as usize)?)?;
        v.is_finite().then_some(v)
    }

    /// Value of the cell containing `p`.
    pub fn cell_value(&self, p: LonLat) -> Option<f64> {
        if !p.lon.is_finite() || !p.lat.is_finite() {
            return None;
        }
        let col = ((p.lon - self.origin_lon) / self.cell_deg).floor() as i64;
        let row = ((self.origin_lat - p.lat) / self.cell_deg).floor() as i64;
        self.get(row, col)
    }

    /// Bilinear interpolation between the four surrounding cell centres.
    ///
    /// Missing neighbours drop out and the remaining weights are renormalized.
    pub fn bilinear(&self, p: LonLat) -> Option<f64> {
        if !p.lon.is_finite() || !p.lat.is_finite() {
            return None;
        }
        let fx = (p.lon - self.origin_lon) / self.cell_deg - 0.5;
        let fy = (self.origin_lat - p.lat) / self.cell_deg - 0.5;
        let (c0, r0) = (fx.floor(), fy.floor());
        let (tx, ty) = (fx - c0, fy - r0);
        let (c0, r0) = (c0 as i64, r0 as i64);

        let corners = [
            (r0, c0, (1.0 - tx) * (1.0 - ty)),
            (r0, c0 + 1, tx * (1.0 - ty)),
            (r0 + 1, c0, (1.0 - tx) * ty),
            (r0 + 1, c0 + 1, tx * ty),
        ];

        let (sum, weight) = corners
            .iter()
            .filter(|(_, _, w)| *w > 0.0)
            .filter_map(|&(r, c, w)| self.get(r, c).map(|v| (v * w, w)))
            .fold((0.0, 0.0), |(s, tw), (v, w)| (s + v, tw + w));

        if weight > 0.0 { Some(sum / weight) } else { self.cell_value(p) }
    }

    fn sample(&self, p: LonLat, resampling: Resampling) -> Option<f64> {
        match resampling {
            Resampling::Nearest => self.cell_value(p),
            Resampling::Bilinear => self.bilinear(p),
        }
    }

    fn overlaps(&self, bounds: (f64, f64, f64, f64)) -> bool {
        let (x0, y0, x1, y1) = self.extent();
        bounds.0 <= x1 && bounds.2 >= x0 && bounds.1 <= y1 && bounds.3 >= y0
    }

    /// Sample points inside the geometry, each snapped to its scale-pixel centre.
    fn lattice(
        &self,
        geometry: &Geometry,
        scale_m: f64,
        best_effort: bool,
    ) -> Result<Vec<LonLat>, DatasetError> {
        let Some((x0, y0, x1, y1)) = geometry.bounds() else {
            return Ok(Vec::new());
        };

        let cos_lat = ((y0 + y1) / 2.0).to_radians().cos().max(1e-6);
        let m_per_deg_lon = METERS_PER_DEGREE * cos_lat;

        let mut scale = scale_m;
        let mut step = scale / SUBSAMPLES_PER_PIXEL;
        let span = |lo: f64, hi: f64, m: f64, step: f64| {
            ((lo * m / step).floor() as i64, (hi * m / step).ceil() as i64)
        };

        let mut ix = span(x0, x1, m_per_deg_lon, step);
        let mut iy = span(y0, y1, METERS_PER_DEGREE, step);
        let count = ((ix.1 - ix.0 + 1) as f64) * ((iy.1 - iy.0 + 1) as f64);
        if count > self.max_samples as f64 {
            if !best_effort {
                return Err(DatasetError::Query(format!(
                    "too many pixels in region: {} samples at {} m exceeds {}",
                    count, scale_m, self.max_samples
                )));
            }
            let factor = (count / self.max_samples as f64).sqrt();
            scale *= factor;
            step *= factor;
            ix = span(x0, x1, m_per_deg_lon, step);
            iy = span(y0, y1, METERS_PER_DEGREE, step);
            warn!(requested = scale_m, used = scale, "best effort coarsened query scale");
        }

        let snap = |v: f64| ((v / scale).floor() + 0.5) * scale;
        let mut points = Vec::new();
        for j in iy.0..=iy.1 {
            let y = (j as f64 + 0.5) * step;
            for i in ix.0..=ix.1 {
                let x = (i as f64 + 0.5) * step;
                let p = LonLat::new(x / m_per_deg_lon, y / METERS_PER_DEGREE);
                if geometry.contains(p) {
                    points.push(LonLat::new(snap(x) / m_per_deg_lon, snap(y) / METERS_PER_DEGREE));
                }
            }
        }
        Ok(points)
    }
}

impl GriddedDataset for GridDataset {
    fn aggregate(&self, request: &AggregateRequest) -> Result<Option<f64>, DatasetError> {
        let started = Instant::now();

        if request.date_range.is_empty() {
            return Err(DatasetError::Query(format!("empty date range {}", request.date_range)));
        }
        if !(request.scale_m.is_finite() && request.scale_m > 0.0) {
            return Err(DatasetError::Query(format!("invalid scale {}", request.scale_m)));
        }
        match request.geometry.bounds() {
            Some(bounds) if self.overlaps(bounds) => {}
            _ => return Err(DatasetError::NoCoverage),
        }

        let values: Vec<f64> = match &request.geometry {
            Geometry::Point(p) => self.sample(*p, request.resampling).into_iter().collect(),
            geometry => self
                .lattice(geometry, request.scale_m, request.best_effort)?
                .into_iter()
                .filter_map(|p| self.sample(p, request.resampling))
                .collect(),
        };

        if started.elapsed() > request.timeout {
            return Err(DatasetError::Timeout(request.timeout));
        }

        let result = request.reducer.apply(&values);
        debug!(
            geometry = request.geometry.kind(),
            scale = request.scale_m,
            reducer = request.reducer.as_str(),
            samples = values.len(),
            ?result,
            "grid aggregate"
        );
        Ok(result)
    }

    fn native_resolution_m(&self) -> f64 {
        self.resolution_m.unwrap_or(self.cell_deg * METERS_PER_DEGREE)
    }
}
