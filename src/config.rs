//! Estimator Configuration
//!
//! One immutable value handed to the estimator at construction. Every field has
//! a default, so a JSON file only needs to name what it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::irradiance::{AtmosphericProfile, SurfaceOrientation};
use crate::retrieval::Strategy;
use crate::shading::ShadingModel;

// ===================== DATASET =====================

/// How the gridded dataset is queried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Native pixel size of the dataset (m)
    pub native_resolution_m: f64,
    /// Below this area a single point is as good as the polygon (m²)
    pub min_area_m2: f64,
    /// Upper bound on the adaptive buffer radius (m)
    pub max_buffer_m: f64,
    /// Fraction of a native pixel the buffered footprint should cover
    pub target_pixel_fraction: f64,
    /// Strategy tried first
    pub preferred_strategy: Strategy,
    /// Per-query timeout (s)
    pub query_timeout_s: f64,
    /// Accept approximate aggregates from the provider
    pub best_effort: bool,
    /// Stop starting new strategies once this much time has elapsed (s)
    pub time_budget_s: Option<f64>,
    /// Default date window: from `lookback_days` to `lag_days` before today
    pub lookback_days: u32,
    pub lag_days: u32,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            native_resolution_m: 11_132.0,
            min_area_m2: 100.0,
            max_buffer_m: 15_000.0,
            target_pixel_fraction: 0.25,
            preferred_strategy: Strategy::AdaptiveBuffering,
            query_timeout_s: 30.0,
            best_effort: true,
            time_budget_s: None,
            lookback_days: 180,
            lag_days: 30,
        }
    }
}

impl DatasetConfig {
    pub fn pixel_area_m2(&self) -> f64 {
        self.native_resolution_m * self.native_resolution_m
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.query_timeout_s)
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_s.map(Duration::from_secs_f64)
    }

    pub fn with_native_resolution(mut self, meters: f64) -> Self {
        self.native_resolution_m = meters;
        self
    }

    pub fn with_max_buffer(mut self, meters: f64) -> Self {
        self.max_buffer_m = meters;
        self
    }

    pub fn with_preferred_strategy(mut self, strategy: Strategy) -> Self {
        self.preferred_strategy = strategy;
        self
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget_s = budget.map(|d| d.as_secs_f64());
        self
    }
}

// ===================== ROOFTOP DERATING =====================

/// Derating applied to the modelled plane-of-array irradiance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RooftopFactors {
    pub shading: ShadingModel,
    /// Dust and dirt losses
    pub soiling_factor: f64,
    /// Spectral gain of the local sky over the reference spectrum
    pub spectral_factor: f64,
    /// Hours of 1 kW/m² sun equivalent to a day's energy
    pub peak_equivalent_hours: f64,
}

impl Default for RooftopFactors {
    fn default() -> Self {
        Self {
            shading: ShadingModel::default(),
            soiling_factor: 0.98,
            spectral_factor: 1.02,
            peak_equivalent_hours: 8.0,
        }
    }
}

// ===================== TOP LEVEL =====================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IrradianceConfig {
    pub dataset: DatasetConfig,
    pub atmosphere: AtmosphericProfile,
    pub surface: SurfaceOrientation,
    pub factors: RooftopFactors,
}

impl IrradianceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_dataset(mut self, dataset: DatasetConfig) -> Self {
        self.dataset = dataset;
        self
    }

    pub fn with_atmosphere(mut self, atmosphere: AtmosphericProfile) -> Self {
        self.atmosphere = atmosphere;
        self
    }

    pub fn with_surface(mut self, surface: SurfaceOrientation) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_factors(mut self, factors: RooftopFactors) -> Self {
        self.factors = factors;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let d = &self.dataset;
        positive("dataset.native_resolution_m", d.native_resolution_m)?;
        positive("dataset.max_buffer_m", d.max_buffer_m)?;
        positive("dataset.query_timeout_s", d.query_timeout_s)?;
        within("dataset.min_area_m2", d.min_area_m2, 0.0, f64::MAX)?;
        within("dataset.target_pixel_fraction", d.target_pixel_fraction, f64::MIN_POSITIVE, 1.0)?;
        if let Some(budget) = d.time_budget_s {
            positive("dataset.time_budget_s", budget)?;
        }

        let a = &self.atmosphere;
        positive("atmosphere.pressure_pa", a.pressure_pa)?;
        within("atmosphere.water_vapor_cm", a.water_vapor_cm, 0.0, 10.0)?;
        within("atmosphere.aerosol_optical_depth", a.aerosol_optical_depth, 0.0, 5.0)?;
        within("atmosphere.ozone_atm_cm", a.ozone_atm_cm, 0.0, 1.0)?;
        within("atmosphere.albedo", a.albedo, 0.0, 1.0)?;
        within("atmosphere.altitude_m", a.altitude_m, -500.0, 9000.0)?;

        within("surface.tilt_deg", self.surface.tilt_deg, 0.0, 90.0)?;
        within("surface.azimuth_deg", self.surface.azimuth_deg, 0.0, 360.0)?;

        let f = &self.factors;
        positive("factors.soiling_factor", f.soiling_factor)?;
        positive("factors.spectral_factor", f.spectral_factor)?;
        positive("factors.peak_equivalent_hours", f.peak_equivalent_hours)?;
        positive("factors.shading.reference_elevation_deg", f.shading.reference_elevation_deg)?;
        within("factors.shading.min_multiplier", f.shading.min_multiplier, 0.0, 1.0)?;
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn within(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> std::result::Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = IrradianceConfig::default();
        assert_eq!(c.dataset.native_resolution_m, 11_132.0);
        assert_eq!(c.dataset.max_buffer_m, 15_000.0);
        assert_eq!(c.dataset.preferred_strategy, Strategy::AdaptiveBuffering);
        assert_eq!(c.dataset.query_timeout(), Duration::from_secs(30));
        assert_eq!(c.atmosphere.water_vapor_cm, 2.5);
        assert_eq!(c.surface, SurfaceOrientation::new(15.0, 180.0));
        assert_eq!(c.factors.peak_equivalent_hours, 8.0);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "dataset": { "max_buffer_m": 5000, "preferred_strategy": "nearest_neighbor_sampling" },
            "surface": { "tilt_deg": 25 }
        }"#;
        let c: IrradianceConfig = serde_json::from_str(json).unwrap();

        assert_eq!(c.dataset.max_buffer_m, 5000.0);
        assert_eq!(c.dataset.preferred_strategy, Strategy::NearestNeighbor);
        assert_eq!(c.dataset.native_resolution_m, 11_132.0, "untouched fields keep defaults");
        assert_eq!(c.surface.tilt_deg, 25.0);
        assert_eq!(c.surface.azimuth_deg, 180.0);
        assert_eq!(c.atmosphere, AtmosphericProfile::default());
    }

    #[test]
    fn test_json_round_trip() {
        let c = IrradianceConfig::new()
            .with_surface(SurfaceOrientation::new(30.0, 200.0))
            .with_dataset(DatasetConfig::default().with_time_budget(Some(Duration::from_secs(5))));
        let json = serde_json::to_string(&c).unwrap();
        let back: IrradianceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        let bad_tilt = IrradianceConfig::new().with_surface(SurfaceOrientation::new(95.0, 180.0));
        assert!(matches!(
            bad_tilt.validate(),
            Err(ConfigError::OutOfRange { field: "surface.tilt_deg", .. })
        ));

        let bad_res = IrradianceConfig::new()
            .with_dataset(DatasetConfig::default().with_native_resolution(0.0));
        assert_eq!(
            bad_res.validate(),
            Err(ConfigError::NotPositive { field: "dataset.native_resolution_m", value: 0.0 })
        );

        let mut bad_hours = IrradianceConfig::new();
        bad_hours.factors.peak_equivalent_hours = -1.0;
        assert!(bad_hours.validate().is_err());

        let mut nan_albedo = IrradianceConfig::new();
        nan_albedo.atmosphere.albedo = f64::NAN;
        assert!(nan_albedo.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let name = format!("rooftop-irradiance-cfg-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, r#"{ "factors": { "soiling_factor": 0.95 } }"#).unwrap();
        let c = IrradianceConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(c.factors.soiling_factor, 0.95);

        let missing = IrradianceConfig::from_json_file("/nonexistent/rooftop.json");
        assert!(matches!(missing, Err(crate::error::Error::Io(_))));
    }
}
