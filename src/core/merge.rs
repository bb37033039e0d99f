//! Strategies that collapse the embeddings of one tag into a single vector.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::core::embeddings::row_norms;
use crate::error::{AppError, Result};

/// A pluggable merge function.
///
/// Takes `N x D` embeddings and returns one vector of length `D`.
pub trait MergeStrategy: Send + Sync {
    /// Short identifier used in logs and reports
    fn name(&self) -> &'static str;

    /// Merges the rows of `embeddings` into one vector
    fn merge(&self, embeddings: ArrayView2<'_, f32>) -> Result<Array1<f32>>;
}

/// Shared preprocessing of the merge strategies.
struct Prepared {
    /// Rows scaled to unit length; zero rows stay zero
    units: Array2<f64>,
    /// Mean L2 norm of the original rows
    mean_norm: f64,
}

fn prepare(embeddings: ArrayView2<'_, f32>) -> Result<Prepared> {
    let (n, dim) = embeddings.dim();
    if n == 0 {
        return Err(AppError::EmptyEmbeddings("<merge input>".into()));
    }
    if dim == 0 {
        return Err(AppError::InvalidInput("embeddings have zero dimensions".into()));
    }
    if !embeddings.iter().all(|v| v.is_finite()) {
        return Err(AppError::InvalidInput("embeddings contain NaN or infinite values".into()));
    }

    let norms = row_norms(embeddings);
    let zero_rows = norms.iter().filter(|&&len| len == 0.0).count();
    if zero_rows > 0 {
        log::warn!("{} of {} embeddings have zero norm and carry no direction", zero_rows, n);
    }

    let inv = norms.mapv(|len| if len > 0.0 { 1.0 / len } else { 0.0 });
    let units = embeddings.mapv(f64::from) * &inv.insert_axis(Axis(1));
    let mean_norm = norms.sum() / n as f64;

    Ok(Prepared { units, mean_norm })
}

fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

fn rescale(direction: &Array1<f64>, length: f64) -> Array1<f32> {
    direction.mapv(|v| (v * length) as f32)
}

/// Result of [`maximize_on_sphere`].
#[derive(Debug, Clone)]
pub struct SphereOptimum {
    /// Best unit vector found
    pub x: Array1<f64>,
    /// Objective value at `x`
    pub value: f64,
    /// Outer iterations performed
    pub iterations: usize,
    /// Whether the tangent gradient fell below the tolerance
    pub converged: bool,
}

const MIN_STEP: f64 = 1e-12;
const MAX_STEP: f64 = 1e6;
/// Fraction of the first-order gain a step has to realise to be accepted.
///
/// Kept well above the usual 1e-4 so steps that overshoot the optimum and land
/// on its far side are rejected instead of trading one small angle for another.
const SUFFICIENT_INCREASE: f64 = 0.3;

/// Maximises `objective` over unit vectors by projected gradient ascent.
///
/// `gradient` must return the gradient already projected onto the tangent
/// space at `x`. The step length grows after an accepted move and halves after
/// a rejected one. A move is accepted only when it gains at least
/// [`SUFFICIENT_INCREASE`] of what the gradient predicts, so the returned point
/// is always the best iterate seen, whether or not the run converged.
pub fn maximize_on_sphere<F, G>(
    objective: F,
    gradient: G,
    initial: Array1<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> SphereOptimum
where
    F: Fn(&Array1<f64>) -> f64,
    G: Fn(&Array1<f64>) -> Array1<f64>,
{
    let len = norm(&initial);
    let mut x = if len > 0.0 {
        initial / len
    } else {
        let mut e = Array1::zeros(initial.len());
        if !e.is_empty() {
            e[0] = 1.0;
        }
        e
    };
    let mut value = objective(&x);
    let mut step = 1.0;
    let mut converged = false;
    let mut iterations = 0;

    'outer: while iterations < max_iterations {
        iterations += 1;

        let g = gradient(&x);
        if norm(&g) < tolerance {
            converged = true;
            break;
        }

        let slope = g.dot(&g);
        loop {
            let mut candidate = &x + &(&g * step);
            let len = norm(&candidate);
            candidate /= len;

            let candidate_value = objective(&candidate);
            if candidate_value >= value + SUFFICIENT_INCREASE * step * slope {
                x = candidate;
                value = candidate_value;
                step = (step * 2.0).min(MAX_STEP);
                break;
            }

            step *= 0.5;
            if step < MIN_STEP {
                break 'outer;
            }
        }
    }

    SphereOptimum {
        x,
        value,
        iterations,
        converged,
    }
}

/// Finds the unit vector with the highest mean cosine similarity to the inputs,
/// then scales it to the mean input norm.
///
/// The search starts from a random non-negative guess. With `seed` set the
/// result is reproducible; without it every call draws a fresh guess.
#[derive(Debug, Clone)]
pub struct CosineOptimMerge {
    /// Seed for the initial guess
    pub seed: Option<u64>,
    /// Upper bound on ascent iterations
    pub max_iterations: usize,
    /// Tangent gradient norm treated as converged
    pub tolerance: f64,
}

impl Default for CosineOptimMerge {
    fn default() -> Self {
        Self {
            seed: None,
            max_iterations: 1000,
            tolerance: 1e-6,
        }
    }
}

impl CosineOptimMerge {
    fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Runs the ascent over unit rows `units` from a fresh random guess.
    fn search(&self, units: &Array2<f64>) -> SphereOptimum {
        let n = units.nrows() as f64;
        let dim = units.ncols();

        // mean cosine is linear in x on the sphere: cos_mean(x) = x . m
        let m = units.sum_axis(Axis(0)) / n;
        if norm(&m) == 0.0 {
            log::warn!("Embeddings have no mean direction, objective is flat");
        }

        let objective = |x: &Array1<f64>| m.dot(x) / norm(x);
        let gradient = |x: &Array1<f64>| &m - &(x * m.dot(x));

        let mut rng = self.rng();
        let initial = Array1::from_shape_fn(dim, |_| rng.gen::<f64>());

        maximize_on_sphere(
            objective,
            gradient,
            initial,
            self.max_iterations,
            self.tolerance,
        )
    }
}

impl MergeStrategy for CosineOptimMerge {
    fn name(&self) -> &'static str {
        "optimize"
    }

    fn merge(&self, embeddings: ArrayView2<'_, f32>) -> Result<Array1<f32>> {
        let Prepared { units, mean_norm } = prepare(embeddings)?;
        let optimum = self.search(&units);
        if optimum.converged {
            log::debug!(
                "Converged after {} iterations, mean cosine {:.6}",
                optimum.iterations,
                optimum.value
            );
        } else {
            log::debug!(
                "Stopped without convergence after {} iterations, mean cosine {:.6}",
                optimum.iterations,
                optimum.value
            );
        }

        Ok(rescale(&optimum.x, mean_norm))
    }
}

/// Normalised mean of the unit inputs, scaled to the mean input norm.
#[derive(Debug, Clone, Copy, Default)]
pub struct CentroidMerge;

impl MergeStrategy for CentroidMerge {
    fn name(&self) -> &'static str {
        "centroid"
    }

    fn merge(&self, embeddings: ArrayView2<'_, f32>) -> Result<Array1<f32>> {
        let Prepared { units, mean_norm } = prepare(embeddings)?;
        let sum = units.sum_axis(Axis(0));
        let len = norm(&sum);
        if len == 0.0 {
            return Err(AppError::InvalidInput(
                "embeddings cancel out, centroid has no direction".into(),
            ));
        }
        Ok(rescale(&(sum / len), mean_norm))
    }
}

/// Merge strategies selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeKind {
    /// [`CosineOptimMerge`]
    #[default]
    Optimize,
    /// [`CentroidMerge`]
    Centroid,
}

impl MergeKind {
    /// Builds the strategy this kind names
    pub fn build(
        self,
        seed: Option<u64>,
        max_iterations: usize,
        tolerance: f64,
    ) -> Box<dyn MergeStrategy> {
        match self {
            Self::Optimize => Box::new(CosineOptimMerge {
                seed,
                max_iterations,
                tolerance,
            }),
            Self::Centroid => Box::new(CentroidMerge),
        }
    }
}

impl FromStr for MergeKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimize" => Ok(Self::Optimize),
            "centroid" => Ok(Self::Centroid),
            other => Err(AppError::Config(format!("unknown merge strategy {:?}", other))),
        }
    }
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimize => f.write_str("optimize"),
            Self::Centroid => f.write_str("centroid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embeddings::{cosine_similarity, l2_norm, EmbeddingSource, SyntheticSource};
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn seeded() -> CosineOptimMerge {
        CosineOptimMerge {
            seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_vectors_keep_direction_and_norm() {
        let v = Array1::from_shape_fn(768, |i| ((i % 13) as f32 - 4.0) * 0.1);
        let embs = Array2::from_shape_fn((5, 768), |(_, j)| v[j]);

        for strategy in [&seeded() as &dyn MergeStrategy, &CentroidMerge] {
            let merged = strategy.merge(embs.view()).unwrap();
            assert_eq!(merged.len(), 768);
            assert_relative_eq!(cosine_similarity(merged.view(), v.view()), 1.0, epsilon = 1e-4);
            assert_relative_eq!(l2_norm(merged.view()), l2_norm(v.view()), max_relative = 1e-3);
        }
    }

    #[test]
    fn test_unseeded_merge_keeps_contract() {
        let v = array![0.5f32, -1.0, 2.0, 0.0];
        let embs = Array2::from_shape_fn((3, 4), |(_, j)| v[j]);
        let merge = CosineOptimMerge::default();

        for _ in 0..2 {
            let merged = merge.merge(embs.view()).unwrap();
            assert_eq!(merged.len(), 4);
            assert_relative_eq!(cosine_similarity(merged.view(), v.view()), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_optimum_matches_centroid_direction() {
        let source = SyntheticSource {
            dim: 64,
            samples_per_tag: 10,
            ..Default::default()
        };
        let embs = source.get_embeddings("cluster").unwrap();

        let optimized = seeded().merge(embs.view()).unwrap();
        let centroid = CentroidMerge.merge(embs.view()).unwrap();
        assert_relative_eq!(
            cosine_similarity(optimized.view(), centroid.view()),
            1.0,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_seeded_merge_is_reproducible() {
        let embs = array![[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let a = seeded().merge(embs.view()).unwrap();
        let b = seeded().merge(embs.view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let embs = Array2::<f32>::zeros((0, 768));
        assert!(matches!(
            seeded().merge(embs.view()),
            Err(AppError::EmptyEmbeddings(_))
        ));
        assert!(matches!(
            CentroidMerge.merge(embs.view()),
            Err(AppError::EmptyEmbeddings(_))
        ));
    }

    #[test]
    fn test_non_finite_input_is_rejected() {
        let embs = array![[1.0f32, f32::NAN]];
        assert!(matches!(
            seeded().merge(embs.view()),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_iteration_cap_returns_best_iterate() {
        let embs = array![[1.0f32, 2.0, 3.0], [3.0, 2.0, 1.0]];
        let merge = CosineOptimMerge {
            seed: Some(1),
            max_iterations: 1,
            tolerance: 0.0,
        };
        let merged = merge.merge(embs.view()).unwrap();
        assert_eq!(merged.len(), 3);
        assert!(merged.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_maximize_on_sphere_finds_target() {
        let target = array![0.0, 0.6, 0.8];
        let optimum = maximize_on_sphere(
            |x| x.dot(&target),
            |x| &target - &(x * target.dot(x)),
            array![1.0, 0.0, 0.0],
            500,
            1e-6,
        );
        assert!(optimum.converged);
        assert!(optimum.iterations < 50, "{} iterations", optimum.iterations);
        assert_relative_eq!(optimum.value, 1.0, epsilon = 1e-9);
        assert_relative_eq!(optimum.x[2], 0.8, epsilon = 1e-5);
    }

    #[test]
    fn test_converges_from_the_opposite_orthant() {
        // the random guess is non-negative, these inputs are all negative
        for dim in [3, 16, 768] {
            let v = Array1::from_shape_fn(dim, |i| -(1.0 + 0.1 * (i % 5) as f32));
            let embs = Array2::from_shape_fn((4, dim), |(_, j)| v[j]);
            let Prepared { units, mean_norm } = prepare(embs.view()).unwrap();

            for seed in 0..5 {
                let merge = CosineOptimMerge {
                    seed: Some(seed),
                    ..Default::default()
                };
                let optimum = merge.search(&units);
                assert!(optimum.converged, "dim {} seed {}", dim, seed);
                assert!(
                    optimum.iterations < 100,
                    "dim {} seed {}: {} iterations",
                    dim,
                    seed,
                    optimum.iterations
                );

                let merged = rescale(&optimum.x, mean_norm);
                assert_relative_eq!(cosine_similarity(merged.view(), v.view()), 1.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_large_magnitudes_merge_to_finite_vectors() {
        let embs = Array2::from_shape_fn((3, 16), |(i, j)| 1e20f32 * (1.0 + 0.01 * (i + j) as f32));
        for strategy in [&seeded() as &dyn MergeStrategy, &CentroidMerge] {
            let merged = strategy.merge(embs.view()).unwrap();
            assert!(merged.iter().all(|v| v.is_finite()), "{}", strategy.name());
            assert_relative_eq!(
                cosine_similarity(merged.view(), embs.row(0)),
                1.0,
                epsilon = 1e-3
            );
        }
    }

    #[test]
    fn test_merge_kind_builds_strategies() {
        assert_eq!(MergeKind::default().build(None, 10, 1e-6).name(), "optimize");
        assert_eq!("centroid".parse::<MergeKind>().unwrap(), MergeKind::Centroid);
        assert!("median".parse::<MergeKind>().is_err());
    }
}
