//! Pairwise distance scorers and their "same subject" thresholds.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2, Axis};
use serde::Serialize;

use crate::core::embeddings::row_norms;
use crate::error::{AppError, Result};

/// Turns a set of vectors into a square matrix of pairwise distances.
///
/// Implementations must return an `n x n` matrix for `n` input rows that is
/// symmetric, non-negative and zero on the diagonal.
pub trait DistanceScorer: Send + Sync {
    /// Short identifier used in logs and reports
    fn name(&self) -> &'static str;

    /// Pairwise distances between all rows of `vectors`
    fn pairwise_distances(&self, vectors: ArrayView2<'_, f32>) -> Result<Array2<f32>>;

    /// Distance below which two embeddings count as the same subject
    fn default_threshold(&self) -> f32;
}

/// `1 - cos(a, b)`; rows with zero norm are treated as orthogonal to everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineDistance;

impl DistanceScorer for CosineDistance {
    fn name(&self) -> &'static str {
        "cosine"
    }

    fn pairwise_distances(&self, vectors: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let norms = row_norms(vectors);
        let inv = norms.mapv(|n| if n > 0.0 { 1.0 / n } else { 0.0 });
        let unit = vectors.mapv(f64::from) * &inv.insert_axis(Axis(1));

        let mut dist = unit.dot(&unit.t()).mapv(|s| (1.0 - s).max(0.0) as f32);
        dist.diag_mut().fill(0.0);
        Ok(symmetrize(dist))
    }

    fn default_threshold(&self) -> f32 {
        0.15
    }
}

/// Euclidean distance divided by the mean norm of the pair.
///
/// Unlike cosine distance this is sensitive to magnitude, so a merged vector
/// has to match the scale of the originals to score well.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl DistanceScorer for EuclideanDistance {
    fn name(&self) -> &'static str {
        "euclidean"
    }

    fn pairwise_distances(&self, vectors: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let norms = row_norms(vectors);
        let n = vectors.nrows();
        let mut dist = Array2::zeros((n, n));

        for i in 0..n {
            for j in (i + 1)..n {
                let scale = 0.5 * (norms[i] + norms[j]);
                if scale == 0.0 {
                    continue;
                }
                let diff: f64 = vectors
                    .row(i)
                    .iter()
                    .zip(vectors.row(j).iter())
                    .map(|(&a, &b)| (f64::from(a) - f64::from(b)).powi(2))
                    .sum::<f64>()
                    .sqrt();
                let d = (diff / scale) as f32;
                dist[[i, j]] = d;
                dist[[j, i]] = d;
            }
        }
        Ok(dist)
    }

    fn default_threshold(&self) -> f32 {
        0.3
    }
}

/// Averages `m` with its transpose so rounding never breaks symmetry.
fn symmetrize(m: Array2<f32>) -> Array2<f32> {
    let t = m.t().to_owned();
    (m + t) * 0.5
}

/// Scorers selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// [`CosineDistance`]
    Cosine,
    /// [`EuclideanDistance`], the default since it also checks the merged scale
    #[default]
    Euclidean,
}

impl MetricKind {
    /// Builds the scorer this kind names
    pub fn build(self) -> Box<dyn DistanceScorer> {
        match self {
            Self::Cosine => Box::new(CosineDistance),
            Self::Euclidean => Box::new(EuclideanDistance),
        }
    }
}

impl FromStr for MetricKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            other => Err(AppError::Config(format!("unknown metric {:?}", other))),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::Euclidean => f.write_str("euclidean"),
        }
    }
}
