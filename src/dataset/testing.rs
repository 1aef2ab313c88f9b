//! Deterministic in-memory dataset for tests.

use std::sync::Mutex;

use super::{AggregateRequest, Geometry, GriddedDataset};
use crate::error::DatasetError;

pub(crate) type Answer = Result<Option<f64>, DatasetError>;

/// Answers from a closure and records every request.
///
/// `area` overrides the area query: a negative value makes it fail.
pub(crate) struct StubDataset<F> {
    pub answer: F,
    pub area: Option<f64>,
    pub resolution_m: f64,
    pub calls: Mutex<Vec<AggregateRequest>>,
}

impl<F: Fn(&AggregateRequest) -> Answer + Send + Sync> StubDataset<F> {
    pub fn new(answer: F) -> Self {
        Self { answer, area: None, resolution_m: 11_132.0, calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<AggregateRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl<F: Fn(&AggregateRequest) -> Answer + Send + Sync> GriddedDataset for StubDataset<F> {
    fn aggregate(&self, request: &AggregateRequest) -> Answer {
        self.calls.lock().unwrap().push(request.clone());
        (self.answer)(request)
    }

    fn area(&self, geometry: &Geometry) -> Result<f64, DatasetError> {
        match self.area {
            Some(a) if a < 0.0 => Err(DatasetError::Query("area unavailable".into())),
            Some(a) => Ok(a),
            None => Ok(geometry.area_m2()),
        }
    }

    fn native_resolution_m(&self) -> f64 {
        self.resolution_m
    }
}

/// Answers every request with the same value.
pub(crate) fn constant(
    value: f64,
) -> StubDataset<impl Fn(&AggregateRequest) -> Answer + Send + Sync> {
    StubDataset::new(move |_: &AggregateRequest| Ok(Some(value)))
}
