use std::time::Instant;

use ndarray::{concatenate, Axis};

use crate::core::embeddings::EmbeddingSource;
use crate::core::merge::MergeStrategy;
use crate::core::metrics::DistanceScorer;
use crate::error::{AppError, Result};
use crate::models::report::MetricsRow;

/// Arithmetic mean of `distances` (NaN for an empty slice).
pub fn mean_diff(distances: &[f32]) -> f64 {
    distances.iter().map(|&d| f64::from(d)).sum::<f64>() / distances.len() as f64
}

/// Fraction of `distances` strictly below `threshold` (NaN for an empty slice).
pub fn same_ratio(distances: &[f32], threshold: f32) -> f64 {
    let same = distances.iter().filter(|&&d| d < threshold).count();
    same as f64 / distances.len() as f64
}

/// Merges the embeddings of `tag` and scores the result against them.
///
/// Only the merge call is timed. The scorer sees the merged vector first and
/// the originals after it in input order, so row 0 without its first entry
/// holds one distance per original embedding.
pub fn evaluate_tag(
    tag: &str,
    source: &dyn EmbeddingSource,
    merger: &dyn MergeStrategy,
    scorer: &dyn DistanceScorer,
    threshold: f32,
) -> Result<MetricsRow> {
    log::info!("Reading embeddings for tag {:?} ...", tag);
    let embeddings = source.get_embeddings(tag)?;
    let (n, dim) = embeddings.dim();
    if n == 0 {
        return Err(AppError::EmptyEmbeddings(tag.to_string()));
    }
    log::info!("Embedding shape: ({}, {}) ...", n, dim);

    log::info!("Merging embeddings ...");
    let start = Instant::now();
    let merged = merger.merge(embeddings.view())?;
    let time_cost = start.elapsed().as_secs_f64();

    if merged.len() != dim {
        return Err(AppError::DimensionMismatch {
            expected: dim,
            found: merged.len(),
        });
    }
    if !merged.iter().all(|v| v.is_finite()) {
        return Err(AppError::InvalidInput(format!(
            "{} produced NaN or infinite values for tag {:?}",
            merger.name(),
            tag
        )));
    }
    log::info!("Result embedding shape of {:?}: ({},).", tag, merged.len());

    let batch = concatenate(Axis(0), &[merged.view().insert_axis(Axis(0)), embeddings.view()])?;
    let matrix = scorer.pairwise_distances(batch.view())?;
    if matrix.dim() != (n + 1, n + 1) {
        return Err(AppError::Scorer(format!(
            "{} returned a {:?} matrix for {} vectors",
            scorer.name(),
            matrix.dim(),
            n + 1
        )));
    }
    let distances: Vec<f32> = matrix.row(0).iter().skip(1).copied().collect();

    let row = MetricsRow {
        tag: tag.to_string(),
        mean_diff: mean_diff(&distances),
        same_ratio: same_ratio(&distances, threshold),
        time_cost,
    };
    log::info!(
        "Tag {:?}, mean diff: {:.4}, same ratio: {:.4}, time cost: {:.4}s.",
        tag,
        row.mean_diff,
        row.same_ratio,
        row.time_cost
    );
    Ok(row)
}
