//! Core functionality for merging and scoring tag embeddings

/// Embedding sources and vector helpers.
pub mod embeddings;
/// The per-tag merge-and-score step.
pub mod evaluate;
/// Strategies that merge many embeddings into one.
pub mod merge;
/// Distance scorers and thresholds.
pub mod metrics;
/// Runs the evaluator over a list of tags.
pub mod runner;
/// The ordered list of tags to benchmark.
pub mod tags;
