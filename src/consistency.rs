//! Strategy Consistency Analysis
//!
//! Diagnostics only: runs every retrieval strategy on its own, without the
//! fallback short-circuit, and rates how well the successful ones agree.

use serde::Serialize;
use tracing::info;

use crate::dataset::DateRange;
use crate::geo::Polygon;
use crate::retrieval::{FallbackChain, JOULES_PER_KWH, RetrievalAttempt, Strategy};

/// Coefficient of variation below which strategies agree well
const HIGH_CONSISTENCY_CV: f64 = 0.10;
/// Coefficient of variation below which strategies agree moderately
const MEDIUM_CONSISTENCY_CV: f64 = 0.20;

/// Summary statistics of a sample (population standard deviation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Spread {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// std_dev / mean
    pub cv: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
}

impl Spread {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let std_dev = variance.sqrt();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let cv = if mean.abs() > f64::EPSILON { std_dev / mean.abs() } else { f64::INFINITY };
        Some(Self { n, mean, std_dev, cv, min, max, range: max - min })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConsistencyRating {
    High,
    Medium,
    Low,
}

impl ConsistencyRating {
    pub fn from_cv(cv: f64) -> Self {
        if cv < HIGH_CONSISTENCY_CV {
            ConsistencyRating::High
        } else if cv < MEDIUM_CONSISTENCY_CV {
            ConsistencyRating::Medium
        } else {
            ConsistencyRating::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyRating::High => "High",
            ConsistencyRating::Medium => "Medium",
            ConsistencyRating::Low => "Low",
        }
    }
}

/// Agreement between successful strategies, in kWh/m²/day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsistencyAnalysis {
    pub ghi_kwh_per_m2_day: Spread,
    pub rating: ConsistencyRating,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub polygon_area_m2: f64,
    pub date_range: DateRange,
    /// One attempt per strategy, in fallback order
    pub attempts: Vec<RetrievalAttempt>,
    /// None when fewer than two strategies succeeded
    pub analysis: Option<ConsistencyAnalysis>,
    pub recommendations: Vec<String>,
}

impl ConsistencyReport {
    pub fn successful(&self) -> impl Iterator<Item = &RetrievalAttempt> {
        self.attempts.iter().filter(|a| a.usable_value().is_some())
    }
}

/// Run all four strategies and compare them.
pub fn analyze(
    chain: &FallbackChain<'_>,
    polygon: &Polygon,
    date_range: DateRange,
) -> ConsistencyReport {
    let area_m2 = chain.polygon_area(polygon);
    let attempts: Vec<RetrievalAttempt> =
        Strategy::ALL.iter().map(|s| chain.attempt(*s, polygon, area_m2, date_range)).collect();

    let ghi: Vec<f64> = attempts
        .iter()
        .filter_map(RetrievalAttempt::usable_value)
        .map(|j| j / JOULES_PER_KWH)
        .collect();
    let analysis = if ghi.len() >= 2 {
        Spread::of(&ghi).map(|spread| ConsistencyAnalysis {
            rating: ConsistencyRating::from_cv(spread.cv),
            ghi_kwh_per_m2_day: spread,
        })
    } else {
        None
    };

    let succeeded: Vec<Strategy> =
        attempts.iter().filter(|a| a.usable_value().is_some()).map(|a| a.method).collect();
    let recommendations = method_recommendations(&succeeded, analysis.as_ref());

    info!(
        succeeded = succeeded.len(),
        rating = analysis.map(|a| a.rating.as_str()).unwrap_or("insufficient data"),
        "strategy consistency analysed"
    );

    ConsistencyReport { polygon_area_m2: area_m2, date_range, attempts, analysis, recommendations }
}

/// Advice derived from which strategies succeeded and how well they agree.
pub fn method_recommendations(
    succeeded: &[Strategy],
    analysis: Option<&ConsistencyAnalysis>,
) -> Vec<String> {
    match (succeeded, analysis) {
        ([], _) => vec!["No methods succeeded. Check polygon size and location.".into()],
        ([only], _) => {
            vec![format!("Only {} succeeded. Use this method but validate results.", only)]
        }
        (_, Some(a)) if a.rating == ConsistencyRating::High => vec![
            "High consistency between methods. Results are reliable.".into(),
            format!(
                "Recommend using {} for best scientific validity.",
                Strategy::AdaptiveBuffering
            ),
        ],
        (_, Some(a)) if a.rating == ConsistencyRating::Medium => {
            vec!["Medium consistency between methods. Consider averaging results.".into()]
        }
        _ => vec![
            "Low consistency between methods. Investigate polygon characteristics.".into(),
            "Consider using ground truth data for validation.".into(),
        ],
    }
}
