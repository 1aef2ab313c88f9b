//! Gridded Irradiance Retrieval
//!
//! Reanalysis pixels are kilometres wide and a rooftop is a few metres, so a
//! plain region mean over the rooftop usually touches no pixel at all. The
//! fallback chain tries up to four resampling strategies in order and keeps
//! the first positive aggregate, logging every attempt with a validity rating.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DatasetConfig;
use crate::consistency::Spread;
use crate::dataset::{AggregateRequest, DateRange, Geometry, GriddedDataset, Reducer, Resampling};
use crate::error::DatasetError;
use crate::geo::{LonLat, Polygon};

// ===================== CONSTANTS =====================

pub const JOULES_PER_KWH: f64 = 3.6e6;

/// Prefix of the provenance tag of gridded results
pub const DATA_SOURCE_PREFIX: &str = "ERA5_Enhanced";

/// Multiples of the native resolution sampled by multi-scale sampling
const MULTI_SCALE_FACTORS: [f64; 3] = [1.0, 0.5, 2.0];

/// Spatial interpolation samples this many times finer than native
const INTERPOLATION_REFINEMENT: f64 = 4.0;

/// Below this share of a native pixel a polygon is not representative
const REPRESENTATIVE_PIXEL_FRACTION: f64 = 0.01;

/// Clear-sky daily GHI relative to the observed all-sky value
const CLEAR_SKY_GHI_RATIO: f64 = 1.25;

/// Typical diffuse share of daily GHI in the humid tropics
const TYPICAL_DIFFUSE_FRACTION: f64 = 0.3;

// ===================== STRATEGIES =====================

/// Resampling strategies, declared in fixed fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    #[serde(rename = "adaptive_buffering")]
    AdaptiveBuffering,
    #[serde(rename = "multi_scale_sampling")]
    MultiScaleSampling,
    #[serde(rename = "spatial_interpolation")]
    SpatialInterpolation,
    #[serde(rename = "nearest_neighbor_sampling")]
    NearestNeighbor,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::AdaptiveBuffering,
        Strategy::MultiScaleSampling,
        Strategy::SpatialInterpolation,
        Strategy::NearestNeighbor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::AdaptiveBuffering => "adaptive_buffering",
            Strategy::MultiScaleSampling => "multi_scale_sampling",
            Strategy::SpatialInterpolation => "spatial_interpolation",
            Strategy::NearestNeighbor => "nearest_neighbor_sampling",
        }
    }

    /// Rating given to a successful result of this strategy.
    pub fn validity(&self) -> Validity {
        match self {
            Strategy::AdaptiveBuffering | Strategy::MultiScaleSampling => Validity::High,
            Strategy::SpatialInterpolation => Validity::MediumHigh,
            Strategy::NearestNeighbor => Validity::Medium,
        }
    }

    /// `preferred` first, then the others in fallback order.
    pub fn fallback_order(preferred: Strategy) -> Vec<Strategy> {
        std::iter::once(preferred)
            .chain(Self::ALL.into_iter().filter(|s| *s != preferred))
            .collect()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "adaptive_buffering" | "adaptive" | "buffer" => Ok(Strategy::AdaptiveBuffering),
            "multi_scale_sampling" | "multi_scale" => Ok(Strategy::MultiScaleSampling),
            "spatial_interpolation" | "interpolation" => Ok(Strategy::SpatialInterpolation),
            "nearest_neighbor_sampling" | "nearest_neighbor" | "nearest" => {
                Ok(Strategy::NearestNeighbor)
            }
            _ => Err(format!(
                "Unknown strategy '{}'. Use adaptive_buffering, multi_scale_sampling, spatial_interpolation or nearest_neighbor_sampling",
                s
            )),
        }
    }
}

/// Qualitative confidence in a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Validity {
    #[serde(rename = "High")]
    High,
    #[serde(rename = "Medium-High")]
    MediumHigh,
    #[serde(rename = "Medium")]
    Medium,
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl Validity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Validity::High => "High",
            Validity::MediumHigh => "Medium-High",
            Validity::Medium => "Medium",
            Validity::Low => "Low",
            Validity::NotApplicable => "N/A",
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ===================== ATTEMPTS =====================

/// One multi-scale query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleSample {
    pub scale_m: f64,
    pub reducer: Reducer,
    pub value: Option<f64>,
}

/// Strategy-specific bookkeeping attached to an attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptDetails {
    Buffer {
        buffer_distance_m: f64,
        original_area_m2: f64,
        buffered_area_m2: f64,
    },
    MultiScale {
        samples: Vec<ScaleSample>,
        spread: Option<Spread>,
    },
    Interpolation {
        scale_m: f64,
        resampling: Resampling,
    },
    Point {
        location: LonLat,
        scale_m: f64,
    },
    None,
}

/// What a strategy produced before rating.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    /// Daily radiation sum (J/m²), None when no pixel contributed
    pub value: Option<f64>,
    pub rationale: String,
    pub details: AttemptDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Positive value obtained
    Success,
    /// Query ran but gave null or non-positive
    Empty,
    /// Query raised an error
    Failed,
}

/// Audit record of one strategy run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalAttempt {
    pub method: Strategy,
    pub status: AttemptStatus,
    /// Raw aggregate in J/m²
    pub value: Option<f64>,
    pub validity: Validity,
    pub rationale: String,
    pub details: AttemptDetails,
    pub elapsed_ms: f64,
}

impl RetrievalAttempt {
    /// The value when it is usable: finite and strictly positive.
    pub fn usable_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite() && *v > 0.0)
    }
}

// ===================== RESULTS =====================

/// Sky conditions implied by a gridded daily total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SkyConditions {
    pub ghi_kwh_per_m2_day: f64,
    pub clear_sky_ghi_kwh_per_m2_day: f64,
    /// Observed over clear-sky GHI
    pub cloud_impact_factor: f64,
    pub diffuse_fraction: f64,
}

impl SkyConditions {
    pub fn from_ghi(ghi_kwh_per_m2_day: f64) -> Self {
        let clear_sky = ghi_kwh_per_m2_day * CLEAR_SKY_GHI_RATIO;
        Self {
            ghi_kwh_per_m2_day,
            clear_sky_ghi_kwh_per_m2_day: clear_sky,
            cloud_impact_factor: if clear_sky > 0.0 { ghi_kwh_per_m2_day / clear_sky } else { 0.0 },
            diffuse_fraction: TYPICAL_DIFFUSE_FRACTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalSuccess {
    pub method_used: Strategy,
    pub validity: Validity,
    pub raw_value_j_m2: f64,
    pub ghi_kwh_per_m2_day: f64,
    pub sky: SkyConditions,
    pub data_source_tag: String,
    pub rationale: String,
    pub polygon_area_m2: f64,
    pub date_range: DateRange,
    pub attempts: Vec<RetrievalAttempt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalFailure {
    pub polygon_area_m2: f64,
    pub date_range: DateRange,
    pub attempts: Vec<RetrievalAttempt>,
    /// Strategies never started because the time budget ran out
    pub skipped: Vec<Strategy>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    Success(RetrievalSuccess),
    Failure(RetrievalFailure),
}

impl RetrievalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RetrievalOutcome::Success(_))
    }

    pub fn success(&self) -> Option<&RetrievalSuccess> {
        match self {
            RetrievalOutcome::Success(s) => Some(s),
            RetrievalOutcome::Failure(_) => None,
        }
    }

    pub fn attempts(&self) -> &[RetrievalAttempt] {
        match self {
            RetrievalOutcome::Success(s) => &s.attempts,
            RetrievalOutcome::Failure(f) => &f.attempts,
        }
    }

    pub fn polygon_area_m2(&self) -> f64 {
        match self {
            RetrievalOutcome::Success(s) => s.polygon_area_m2,
            RetrievalOutcome::Failure(f) => f.polygon_area_m2,
        }
    }
}

// ===================== BUFFER SIZING =====================

/// Buffer radius that grows `area_m2` to the target share of a native pixel.
///
/// Zero when the polygon already reaches the target; never above the
/// configured maximum.
pub fn buffer_distance(area_m2: f64, config: &DatasetConfig) -> f64 {
    let target = config.target_pixel_fraction * config.pixel_area_m2();
    let area = area_m2.max(0.0);
    if area >= target {
        return 0.0;
    }
    ((target - area) / PI).sqrt().min(config.max_buffer_m)
}

// ===================== FALLBACK CHAIN =====================

pub struct FallbackChain<'a> {
    dataset: &'a dyn GriddedDataset,
    config: DatasetConfig,
}

impl<'a> FallbackChain<'a> {
    /// The dataset's own native resolution replaces the configured one.
    pub fn new(dataset: &'a dyn GriddedDataset, config: &DatasetConfig) -> Self {
        let mut config = *config;
        let native = dataset.native_resolution_m();
        if native.is_finite() && native > 0.0 {
            if native != config.native_resolution_m {
                debug!(
                    configured = config.native_resolution_m,
                    dataset = native,
                    "using dataset native resolution"
                );
            }
            config.native_resolution_m = native;
        }
        Self { dataset, config }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    fn request(&self, geometry: Geometry, date_range: DateRange, scale_m: f64) -> AggregateRequest {
        AggregateRequest::new(geometry, date_range, scale_m)
            .with_best_effort(self.config.best_effort)
            .with_timeout(self.config.query_timeout())
    }

    /// Polygon area as the dataset measures it, or the local shoelace area.
    pub fn polygon_area(&self, polygon: &Polygon) -> f64 {
        match self.dataset.area(&Geometry::Polygon(polygon.clone())) {
            Ok(area) if area.is_finite() && area >= 0.0 => area,
            Ok(area) => {
                warn!(area, "dataset reported unusable area, using local estimate");
                polygon.area_m2()
            }
            Err(e) => {
                warn!(error = %e, "dataset area query failed, using local estimate");
                polygon.area_m2()
            }
        }
    }

    /// Run a single strategy; dataset errors propagate.
    pub fn run_strategy(
        &self,
        strategy: Strategy,
        polygon: &Polygon,
        area_m2: f64,
        date_range: DateRange,
    ) -> Result<StrategyOutcome, DatasetError> {
        match strategy {
            Strategy::AdaptiveBuffering => self.adaptive_buffering(polygon, area_m2, date_range),
            Strategy::MultiScaleSampling => self.multi_scale_sampling(polygon, date_range),
            Strategy::SpatialInterpolation => self.spatial_interpolation(polygon, date_range),
            Strategy::NearestNeighbor => self.nearest_neighbor(polygon, date_range),
        }
    }

    fn adaptive_buffering(
        &self,
        polygon: &Polygon,
        area_m2: f64,
        date_range: DateRange,
    ) -> Result<StrategyOutcome, DatasetError> {
        let radius = buffer_distance(area_m2, &self.config);
        let scale = self.config.native_resolution_m;

        let (geometry, rationale) = if radius > 0.0 {
            (
                Geometry::Buffered { polygon: polygon.clone(), radius_m: radius },
                format!(
                    "Expands the {:.0} m² footprint by {:.0} m so it intersects native pixels while keeping spatial context",
                    area_m2, radius
                ),
            )
        } else {
            let rationale = "Polygon size adequate for native resolution".to_string();
            (Geometry::Polygon(polygon.clone()), rationale)
        };

        let buffered_area_m2 = if radius > 0.0 {
            self.dataset.area(&geometry).unwrap_or_else(|e| {
                warn!(error = %e, "dataset buffered area query failed, using local estimate");
                geometry.area_m2()
            })
        } else {
            area_m2
        };
        debug!(radius, buffered_area_m2, "adaptive buffering query");

        let value = self.dataset.aggregate(&self.request(geometry, date_range, scale))?;
        Ok(StrategyOutcome {
            value,
            rationale,
            details: AttemptDetails::Buffer {
                buffer_distance_m: radius,
                original_area_m2: area_m2,
                buffered_area_m2,
            },
        })
    }

    fn multi_scale_sampling(
        &self,
        polygon: &Polygon,
        date_range: DateRange,
    ) -> Result<StrategyOutcome, DatasetError> {
        let native = self.config.native_resolution_m;
        let mut samples = Vec::with_capacity(MULTI_SCALE_FACTORS.len() * Reducer::ALL.len());
        let mut errors = Vec::new();

        for factor in MULTI_SCALE_FACTORS {
            let scale_m = native * factor;
            for reducer in Reducer::ALL {
                let request = self
                    .request(Geometry::Polygon(polygon.clone()), date_range, scale_m)
                    .with_reducer(reducer);
                let value = match self.dataset.aggregate(&request) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(
                            scale_m,
                            reducer = reducer.as_str(),
                            error = %e,
                            "multi-scale query failed"
                        );
                        errors.push(e);
                        None
                    }
                };
                samples.push(ScaleSample { scale_m, reducer, value });
            }
        }

        // Every query erroring is a failure of the strategy, not an empty result.
        if errors.len() == samples.len()
            && let Some(e) = errors.pop()
        {
            return Err(e);
        }

        let positives: Vec<f64> =
            samples.iter().filter_map(|s| s.value).filter(|v| v.is_finite() && *v > 0.0).collect();
        let spread = Spread::of(&positives);
        Ok(StrategyOutcome {
            value: spread.map(|s| s.mean),
            rationale: "Multiple scales and reducers provide robust estimates with uncertainty quantification".into(),
            details: AttemptDetails::MultiScale { samples, spread },
        })
    }

    fn spatial_interpolation(
        &self,
        polygon: &Polygon,
        date_range: DateRange,
    ) -> Result<StrategyOutcome, DatasetError> {
        let scale_m = self.config.native_resolution_m / INTERPOLATION_REFINEMENT;
        let request = self
            .request(Geometry::Polygon(polygon.clone()), date_range, scale_m)
            .with_resampling(Resampling::Bilinear);
        let value = self.dataset.aggregate(&request)?;
        Ok(StrategyOutcome {
            value,
            rationale: "Bilinear interpolation preserves spatial relationships while enabling fine-scale sampling".into(),
            details: AttemptDetails::Interpolation { scale_m, resampling: Resampling::Bilinear },
        })
    }

    fn nearest_neighbor(
        &self,
        polygon: &Polygon,
        date_range: DateRange,
    ) -> Result<StrategyOutcome, DatasetError> {
        let location = polygon.centroid();
        let scale_m = self.config.native_resolution_m;
        let request = self.request(Geometry::Point(location), date_range, scale_m);
        let value = self.dataset.aggregate(&request)?;
        Ok(StrategyOutcome {
            value,
            rationale: "Samples the native pixel under the polygon centroid; guaranteed value but may not be spatially representative".into(),
            details: AttemptDetails::Point { location, scale_m },
        })
    }

    /// Run one strategy and rate it. Errors become a failed attempt.
    pub fn attempt(
        &self,
        strategy: Strategy,
        polygon: &Polygon,
        area_m2: f64,
        date_range: DateRange,
    ) -> RetrievalAttempt {
        debug!(method = strategy.as_str(), "trying retrieval strategy");
        let started = Instant::now();
        let result = self.run_strategy(strategy, polygon, area_m2, date_range);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;

        match result {
            Ok(outcome) => {
                let usable = outcome.value.is_some_and(|v| v.is_finite() && v > 0.0);
                if !usable {
                    warn!(
                        method = strategy.as_str(),
                        value = ?outcome.value,
                        "strategy returned null or non-positive value"
                    );
                }
                RetrievalAttempt {
                    method: strategy,
                    status: if usable { AttemptStatus::Success } else { AttemptStatus::Empty },
                    value: outcome.value,
                    validity: if usable { strategy.validity() } else { Validity::NotApplicable },
                    rationale: if usable {
                        outcome.rationale
                    } else {
                        "No positive value returned".to_string()
                    },
                    details: outcome.details,
                    elapsed_ms,
                }
            }
            Err(e) => {
                warn!(method = strategy.as_str(), error = %e, "strategy failed");
                RetrievalAttempt {
                    method: strategy,
                    status: AttemptStatus::Failed,
                    value: None,
                    validity: Validity::NotApplicable,
                    rationale: e.to_string(),
                    details: AttemptDetails::None,
                    elapsed_ms,
                }
            }
        }
    }

    /// Try strategies in fallback order, stopping at the first positive value.
    pub fn retrieve(
        &self,
        polygon: &Polygon,
        date_range: DateRange,
        preferred: Option<Strategy>,
    ) -> RetrievalOutcome {
        let preferred = preferred.unwrap_or(self.config.preferred_strategy);
        let area_m2 = self.polygon_area(polygon);
        let budget = self.config.time_budget();
        let started = Instant::now();

        let mut attempts: Vec<RetrievalAttempt> = Vec::new();
        let mut skipped = Vec::new();

        for strategy in Strategy::fallback_order(preferred) {
            if let Some(budget) = budget
                && !attempts.is_empty()
                && started.elapsed() >= budget
            {
                skipped.push(strategy);
                continue;
            }

            let attempt = self.attempt(strategy, polygon, area_m2, date_range);
            let value = attempt.usable_value();
            let rationale = attempt.rationale.clone();
            attempts.push(attempt);

            if let Some(raw) = value {
                let ghi = raw / JOULES_PER_KWH;
                info!(
                    method = strategy.as_str(),
                    raw_j_m2 = raw,
                    ghi_kwh_m2_day = ghi,
                    attempts = attempts.len(),
                    "gridded irradiance retrieved"
                );
                return RetrievalOutcome::Success(RetrievalSuccess {
                    method_used: strategy,
                    validity: strategy.validity(),
                    raw_value_j_m2: raw,
                    ghi_kwh_per_m2_day: ghi,
                    sky: SkyConditions::from_ghi(ghi),
                    data_source_tag: format!("{}_{}", DATA_SOURCE_PREFIX, strategy.as_str()),
                    rationale,
                    polygon_area_m2: area_m2,
                    date_range,
                    attempts,
                });
            }
        }

        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), "retrieval time budget exhausted");
        }
        warn!(area_m2, attempts = attempts.len(), "all retrieval strategies exhausted");

        let recommendations = recommendations(area_m2, &attempts, &skipped, &self.config);
        RetrievalOutcome::Failure(RetrievalFailure {
            polygon_area_m2: area_m2,
            date_range,
            attempts,
            skipped,
            recommendations,
        })
    }
}

/// Advice attached to an exhausted chain.
pub fn recommendations(
    area_m2: f64,
    attempts: &[RetrievalAttempt],
    skipped: &[Strategy],
    config: &DatasetConfig,
) -> Vec<String> {
    let mut out = Vec::new();

    if area_m2 < config.min_area_m2 {
        out.push(format!(
            "Polygon is very small (<{:.0} m²). Consider using a representative point instead.",
            config.min_area_m2
        ));
    }
    if area_m2 < config.pixel_area_m2() * REPRESENTATIVE_PIXEL_FRACTION {
        out.push("Polygon is <1% of the native pixel size. Results may not be spatially representative.".into());
    }
    if !attempts.is_empty() && attempts.iter().all(|a| a.status == AttemptStatus::Failed) {
        out.push("All methods failed. Check dataset provider access and data availability.".into());
    }
    if !skipped.is_empty() {
        let names: Vec<&str> = skipped.iter().map(Strategy::as_str).collect();
        out.push(format!("Time budget exhausted before trying: {}.", names.join(", ")));
    }
    out.push("Consider using multiple nearby points and averaging results.".into());
    out.push("Validate results against ground measurements if available.".into());
    out
}
