//! Rooftop Irradiance Estimation
//!
//! Top-level entry point. Gridded data is tried first when allowed; otherwise,
//! or when every retrieval strategy comes back empty, the clear-sky model
//! supplies the number. Either way the caller gets a value plus the
//! provenance needed to judge it.

use chrono::{NaiveDateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::IrradianceConfig;
use crate::consistency::{self, ConsistencyReport};
use crate::dataset::{DateRange, GriddedDataset};
use crate::geo::{LonLat, Polygon};
use crate::irradiance::{
    IrradianceComponents, PoaIrradiance, SurfaceOrientation, air_mass, clear_sky_irradiance,
    plane_of_array_irradiance,
};
use crate::retrieval::{
    FallbackChain, RetrievalAttempt, RetrievalOutcome, SkyConditions, Strategy, Validity,
};
use crate::shading::ShadingEstimate;
use crate::solar::{SolarPosition, solar_position};

/// Provenance tag of modelled results
pub const CLEAR_SKY_TAG: &str = "Enhanced_Clear_Sky";

/// One polygon to estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateRequest {
    pub polygon: Polygon,
    /// UTC-normalized instant for the clear-sky model
    pub timestamp: NaiveDateTime,
    /// Falls back to the configured default
    pub surface: Option<SurfaceOrientation>,
    pub use_external_data: bool,
    /// Falls back to the configured trailing window
    pub date_range: Option<DateRange>,
    /// Falls back to the configured preferred strategy
    pub preferred_strategy: Option<Strategy>,
}

impl EstimateRequest {
    pub fn new(polygon: Polygon, timestamp: NaiveDateTime) -> Self {
        Self {
            polygon,
            timestamp,
            surface: None,
            use_external_data: true,
            date_range: None,
            preferred_strategy: None,
        }
    }

    pub fn with_surface(mut self, surface: SurfaceOrientation) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_external_data(mut self, enabled: bool) -> Self {
        self.use_external_data = enabled;
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_preferred_strategy(mut self, strategy: Strategy) -> Self {
        self.preferred_strategy = Some(strategy);
        self
    }
}

/// Modelled breakdown behind a clear-sky estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhysicalModel {
    pub air_mass: f64,
    pub horizontal: IrradianceComponents,
    pub poa: PoaIrradiance,
    pub shading: ShadingEstimate,
    pub soiling_factor: f64,
    pub spectral_factor: f64,
}

/// Final irradiance figure with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrradianceEstimate {
    /// Plane-of-array irradiance (W/m²)
    pub poa_global: f64,
    pub daily_energy_kwh_per_m2: f64,
    pub data_source_tag: String,
    pub satellite_data_used: bool,
    pub scientific_validity: Validity,
    /// Every retrieval attempt made, in order
    pub attempt_log: Vec<RetrievalAttempt>,
    pub timestamp: NaiveDateTime,
    pub location: LonLat,
    pub polygon_area_m2: f64,
    pub surface: SurfaceOrientation,
    pub solar_position: SolarPosition,
    /// Strategy that produced the gridded value
    pub method_used: Option<Strategy>,
    /// Present when the gridded dataset produced the value
    pub sky: Option<SkyConditions>,
    /// Advice from an exhausted retrieval chain
    pub recommendations: Vec<String>,
    /// Present when the clear-sky model produced the value
    pub model: Option<PhysicalModel>,
}

pub struct IrradianceEstimator {
    config: IrradianceConfig,
    dataset: Option<Box<dyn GriddedDataset>>,
}

impl IrradianceEstimator {
    pub fn new(config: IrradianceConfig) -> Self {
        Self { config, dataset: None }
    }

    pub fn with_dataset(mut self, dataset: impl GriddedDataset + 'static) -> Self {
        self.dataset = Some(Box::new(dataset));
        self
    }

    pub fn config(&self) -> &IrradianceConfig {
        &self.config
    }

    pub fn has_dataset(&self) -> bool {
        self.dataset.is_some()
    }

    /// Default retrieval window ending before today.
    pub fn default_date_range(&self) -> DateRange {
        let dataset = &self.config.dataset;
        DateRange::trailing(Utc::now().date_naive(), dataset.lookback_days, dataset.lag_days)
    }

    fn chain(&self) -> Option<FallbackChain<'_>> {
        self.dataset.as_deref().map(|d| FallbackChain::new(d, &self.config.dataset))
    }

    /// Estimate one polygon.
    pub fn estimate(
        &self,
        polygon: &Polygon,
        timestamp: NaiveDateTime,
        surface: SurfaceOrientation,
        use_external_data: bool,
    ) -> IrradianceEstimate {
        let request = EstimateRequest::new(polygon.clone(), timestamp)
            .with_surface(surface)
            .with_external_data(use_external_data);
        self.estimate_request(&request)
    }

    pub fn estimate_request(&self, request: &EstimateRequest) -> IrradianceEstimate {
        let polygon = &request.polygon;
        let surface = request.surface.unwrap_or(self.config.surface);
        let location = polygon.centroid();
        let sun = solar_position(location.lat, location.lon, request.timestamp);

        let retrieval = if request.use_external_data {
            match self.chain() {
                Some(chain) => {
                    let range = request.date_range.unwrap_or_else(|| self.default_date_range());
                    Some(chain.retrieve(polygon, range, request.preferred_strategy))
                }
                None => {
                    warn!("external data requested but no dataset configured");
                    None
                }
            }
        } else {
            None
        };

        let base = IrradianceEstimate {
            poa_global: 0.0,
            daily_energy_kwh_per_m2: 0.0,
            data_source_tag: String::new(),
            satellite_data_used: false,
            scientific_validity: Validity::NotApplicable,
            attempt_log: Vec::new(),
            timestamp: request.timestamp,
            location,
            polygon_area_m2: polygon.area_m2(),
            surface,
            solar_position: sun,
            method_used: None,
            sky: None,
            recommendations: Vec::new(),
            model: None,
        };

        match retrieval {
            Some(RetrievalOutcome::Success(success)) => {
                let peak_hours = self.config.factors.peak_equivalent_hours;
                let poa_global = success.ghi_kwh_per_m2_day * 1000.0 / peak_hours;
                info!(
                    method = success.method_used.as_str(),
                    poa_global,
                    "using gridded irradiance"
                );
                IrradianceEstimate {
                    poa_global,
                    daily_energy_kwh_per_m2: success.ghi_kwh_per_m2_day,
                    data_source_tag: success.data_source_tag,
                    satellite_data_used: true,
                    scientific_validity: success.validity,
                    attempt_log: success.attempts,
                    polygon_area_m2: success.polygon_area_m2,
                    method_used: Some(success.method_used),
                    sky: Some(success.sky),
                    ..base
                }
            }
            Some(RetrievalOutcome::Failure(failure)) => {
                info!(
                    attempts = failure.attempts.len(),
                    "gridded retrieval exhausted, using clear-sky model"
                );
                self.physical(
                    polygon,
                    IrradianceEstimate {
                        attempt_log: failure.attempts,
                        recommendations: failure.recommendations,
                        ..base
                    },
                )
            }
            None => {
                info!("using clear-sky model");
                self.physical(polygon, base)
            }
        }
    }

    /// Clear-sky, transposition, shading and derating.
    fn physical(&self, polygon: &Polygon, base: IrradianceEstimate) -> IrradianceEstimate {
        let atmosphere = &self.config.atmosphere;
        let factors = &self.config.factors;
        let sun = base.solar_position;

        let am = air_mass(sun.zenith_deg, atmosphere.altitude_m);
        let horizontal = clear_sky_irradiance(sun.zenith_deg, am, atmosphere);
        let poa = plane_of_array_irradiance(&horizontal, &sun, &base.surface, atmosphere.albedo);
        let shading = factors.shading.estimate(polygon, sun.elevation_deg, sun.azimuth_deg);

        let poa_global =
            poa.poa_global * shading.multiplier * factors.soiling_factor * factors.spectral_factor;
        let validity = if sun.is_above_horizon() && !polygon.is_degenerate() {
            Validity::Medium
        } else {
            Validity::Low
        };

        IrradianceEstimate {
            poa_global,
            daily_energy_kwh_per_m2: poa_global * factors.peak_equivalent_hours / 1000.0,
            data_source_tag: CLEAR_SKY_TAG.to_string(),
            satellite_data_used: false,
            scientific_validity: validity,
            model: Some(PhysicalModel {
                air_mass: am,
                horizontal,
                poa,
                shading,
                soiling_factor: factors.soiling_factor,
                spectral_factor: factors.spectral_factor,
            }),
            ..base
        }
    }

    /// Estimate independent polygons in parallel; output order follows input.
    pub fn estimate_batch(&self, requests: &[EstimateRequest]) -> Vec<IrradianceEstimate> {
        requests.par_iter().map(|r| self.estimate_request(r)).collect()
    }

    /// Run every retrieval strategy and rate their agreement.
    pub fn compare_strategies(
        &self,
        polygon: &Polygon,
        date_range: Option<DateRange>,
    ) -> Option<ConsistencyReport> {
        let chain = self.chain()?;
        let range = date_range.unwrap_or_else(|| self.default_date_range());
        Some(consistency::analyze(&chain, polygon, range))
    }
}
