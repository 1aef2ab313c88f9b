//! Plane-of-array irradiance for rooftop polygons.
//!
//! Small polygons fall inside a single coarse reanalysis pixel and frequently
//! come back empty from gridded queries. [`retrieval::FallbackChain`] works
//! around that with four rated strategies, and [`estimate::IrradianceEstimator`]
//! falls back to a clear-sky physical model when none of them produce data.

pub mod config;
pub mod consistency;
pub mod dataset;
pub mod error;
pub mod estimate;
pub mod geo;
pub mod irradiance;
pub mod retrieval;
pub mod shading;
pub mod solar;

pub use config::{DatasetConfig, IrradianceConfig, RooftopFactors};
pub use dataset::{DateRange, GridDataset, GriddedDataset};
pub use error::{Error, Result};
pub use estimate::{EstimateRequest, IrradianceEstimate, IrradianceEstimator};
pub use geo::{LonLat, Polygon};
pub use irradiance::{AtmosphericProfile, SurfaceOrientation};
pub use retrieval::{Strategy, Validity};
