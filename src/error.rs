//! Error Types
//!
//! Failures that can leave the library. Dataset failures inside the retrieval
//! chain are recorded as attempts instead and never reach a caller through here.

use thiserror::Error;

/// Strict polygon validation failures.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("polygon needs at least 3 distinct vertices, got {0}")]
    TooFewVertices(usize),
    #[error("vertex {index} is not a finite coordinate ({lon}, {lat})")]
    NonFinite { index: usize, lon: f64, lat: f64 },
    #[error("vertex {index} is outside WGS84 bounds ({lon}, {lat})")]
    OutOfRange { index: usize, lon: f64, lat: f64 },
}

/// Errors reported by a gridded-dataset collaborator.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("query exceeded its {0:?} timeout")]
    Timeout(std::time::Duration),
    #[error("dataset has no coverage for the requested region")]
    NoCoverage,
    #[error("dataset query failed: {0}")]
    Query(String),
    #[error("invalid dataset: {0}")]
    Invalid(String),
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration values that make no physical sense.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange { field: &'static str, value: f64, min: f64, max: f64 },
}

/// Top-level library error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
