//! Rooftop Shading Estimate
//!
//! A coarse multiplier from roof orientation against the sun. The roof faces
//! along its longest edge; the further the sun sits from that bearing, and the
//! lower it stands, the more of the surface is assumed to be self-shaded.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::{Polygon, angular_difference};

/// Step-function shading parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadingModel {
    /// Upper deviation bound of the aligned band (degrees)
    pub aligned_max_deg: f64,
    /// Upper deviation bound of the oblique band (degrees)
    pub oblique_max_deg: f64,
    pub aligned_multiplier: f64,
    pub oblique_multiplier: f64,
    pub opposed_multiplier: f64,
    /// Sun elevation at and above which no low-sun attenuation applies
    pub reference_elevation_deg: f64,
    /// Floor of the final multiplier
    pub min_multiplier: f64,
    /// Returned when the polygon has no usable edge
    pub neutral_multiplier: f64,
}

impl Default for ShadingModel {
    fn default() -> Self {
        Self {
            aligned_max_deg: 45.0,
            oblique_max_deg: 90.0,
            aligned_multiplier: 0.95,
            oblique_multiplier: 0.85,
            opposed_multiplier: 0.70,
            reference_elevation_deg: 30.0,
            min_multiplier: 0.70,
            neutral_multiplier: 0.95,
        }
    }
}

/// Breakdown of a shading multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShadingEstimate {
    /// Bearing of the longest roof edge, if the polygon has one
    pub roof_azimuth_deg: Option<f64>,
    /// Angular distance between sun and roof bearing, in [0, 180]
    pub deviation_deg: f64,
    pub band_multiplier: f64,
    pub elevation_factor: f64,
    pub multiplier: f64,
}

impl ShadingModel {
    /// Multiplier from the deviation band.
    pub fn band(&self, deviation_deg: f64) -> f64 {
        if deviation_deg <= self.aligned_max_deg {
            self.aligned_multiplier
        } else if deviation_deg <= self.oblique_max_deg {
            self.oblique_multiplier
        } else {
            self.opposed_multiplier
        }
    }

    /// Linear low-sun attenuation, 0 at the horizon and 1 at the reference elevation.
    pub fn elevation_factor(&self, sun_elevation_deg: f64) -> f64 {
        (sun_elevation_deg / self.reference_elevation_deg).clamp(0.0, 1.0)
    }

    pub fn estimate(
        &self,
        polygon: &Polygon,
        sun_elevation_deg: f64,
        sun_azimuth_deg: f64,
    ) -> ShadingEstimate {
        let edge = if polygon.distinct_vertex_count() < 3 { None } else { polygon.longest_edge() };

        let Some(edge) = edge else {
            debug!(vertices = polygon.vertices().len(), "no usable roof edge, neutral shading");
            return ShadingEstimate {
                roof_azimuth_deg: None,
                deviation_deg: 0.0,
                band_multiplier: self.neutral_multiplier,
                elevation_factor: 1.0,
                multiplier: self.neutral_multiplier,
            };
        };

        let deviation_deg = angular_difference(sun_azimuth_deg, edge.azimuth_deg);
        let band_multiplier = self.band(deviation_deg);
        let elevation_factor = self.elevation_factor(sun_elevation_deg);
        let multiplier = (band_multiplier * elevation_factor).max(self.min_multiplier);

        debug!(
            roof_azimuth = edge.azimuth_deg,
            deviation = deviation_deg,
            multiplier,
            "shading estimate"
        );

        ShadingEstimate {
            roof_azimuth_deg: Some(edge.azimuth_deg),
            deviation_deg,
            band_multiplier,
            elevation_factor,
            multiplier,
        }
    }

    pub fn multiplier(
        &self,
        polygon: &Polygon,
        sun_elevation_deg: f64,
        sun_azimuth_deg: f64,
    ) -> f64 {
        self.estimate(polygon, sun_elevation_deg, sun_azimuth_deg).multiplier
    }
}
