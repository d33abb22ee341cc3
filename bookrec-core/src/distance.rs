//! Defines distance metrics for comparing vectors.

use ndarray::ArrayView1;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;
use crate::error::{RecError, RecResult};

/// Enum representing supported distance metrics.
///
/// Both metrics produce a *distance*: lower values mean more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean (L2) distance, range [0, inf).
    #[default]
    Euclidean,
    /// Angular distance `sqrt(2 * (1 - cos))`, range [0, 2].
    Angular,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Angular => write!(f, "angular"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = RecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "angular" | "cosine" => Ok(DistanceMetric::Angular),
            other => Err(RecError::Configuration(format!("Unknown distance metric '{}'", other))),
        }
    }
}

/// Calculates the distance between two vectors based on the specified metric.
///
/// Returns `RecError::DimensionMismatch` if vectors have different lengths.
/// Zero vectors are treated as having cosine 0 to everything under `Angular`.
pub fn calculate_distance(
    metric: DistanceMetric,
    v1: ArrayView1<f32>,
    v2: ArrayView1<f32>,
) -> RecResult<f32> {
    if v1.len() != v2.len() {
        return Err(RecError::DimensionMismatch {
            expected: v1.len(),
            actual: v2.len(),
        });
    }

    match metric {
        DistanceMetric::Angular => {
            let dot_product = v1.dot(&v2);
            let norm_v1 = v1.dot(&v1).sqrt();
            let norm_v2 = v2.dot(&v2).sqrt();

            let cosine = if norm_v1 == 0.0 || norm_v2 == 0.0 {
                0.0
            } else {
                // Clamp to avoid floating point drift outside [-1, 1]
                (dot_product / (norm_v1 * norm_v2)).clamp(-1.0, 1.0)
            };
            Ok((2.0 * (1.0 - cosine)).max(0.0).sqrt())
        }
        DistanceMetric::Euclidean => {
            let diff = &v1 - &v2;
            Ok(diff.dot(&diff).sqrt())
        }
    }
}
