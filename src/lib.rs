#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

//! # ccip-merge
//!
//! A benchmark harness for embedding merge functions. A merge function turns
//! the embeddings of every image carrying a tag into one representative
//! vector; the harness measures how close that vector stays to the originals.
//!
//! For each tag the harness
//!
//! - reads the tag's embeddings from an [`EmbeddingSource`],
//! - times the [`MergeStrategy`] on them,
//! - scores the merged vector against every original with a [`DistanceScorer`],
//! - records the mean distance and the share of originals below a threshold.
//!
//! Rows are collected into a [`ResultTable`] and written as CSV.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ccip_merge::{run_benchmark, BenchConfig, JsonDirSource, Result, TagList};
//!
//! fn main() -> Result<()> {
//!     ccip_merge::init()?;
//!     let source = JsonDirSource::new("features")?;
//!     let tags = TagList::from_file("picked_tags.txt")?;
//!     let table = run_benchmark(&BenchConfig::default(), &source, &tags)?;
//!     println!("{}", table);
//!     Ok(())
//! }
//! ```

/// Run configuration and its environment overlay.
pub mod config;
pub mod core;
/// Defines the crate's error types and result aliases.
pub mod error;
pub mod models;
mod utils;

// Public API exports
pub use crate::{
    config::BenchConfig,
    core::{
        embeddings::{EmbeddingSource, InMemorySource, JsonDirSource, SyntheticSource},
        evaluate::evaluate_tag,
        merge::{CentroidMerge, CosineOptimMerge, MergeKind, MergeStrategy},
        metrics::{CosineDistance, DistanceScorer, EuclideanDistance, MetricKind},
        runner::BatchRunner,
        tags::TagList,
    },
    error::{AppError, Result, ResultExt},
    models::report::{MetricsRow, ResultTable, RunSummary, Summary},
};

/// Initialize logging with default settings
///
/// Logs at `info` unless `RUST_LOG` says otherwise. Call it once, early in
/// `main`; library code never installs a logger by itself.
///
/// # Errors
///
/// Returns an error if a logger is already installed.
pub fn init() -> Result<()> {
    let env = env_logger::Env::default()
        .default_filter_or("info")
        .default_write_style_or("auto");

    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .map_err(|e| AppError::Config(format!("logger already initialized: {}", e)))?;

    Ok(())
}

/// Runs a full benchmark as described by `config`
///
/// Evaluates the first `config.tag_count` tags, logs the rendered table, writes
/// the CSV report (and the JSON summary when configured) and returns the table.
///
/// # Errors
///
/// Fails on the first tag that cannot be evaluated, or when a report cannot
/// be written. Nothing is written in that case.
pub fn run_benchmark(
    config: &BenchConfig,
    source: &dyn EmbeddingSource,
    tags: &TagList,
) -> Result<ResultTable> {
    config.validate()?;

    let merger = config.merge_strategy();
    let scorer = config.scorer();
    let threshold = config.threshold_for(scorer.as_ref());
    log::info!(
        "Benchmarking {} merge with {} distance, threshold {:.4}",
        merger.name(),
        scorer.name(),
        threshold
    );

    let table = BatchRunner::new(source, merger.as_ref(), scorer.as_ref())
        .threshold(threshold)
        .parallel(config.parallel)
        .show_progress(config.progress)
        .run(tags, config.tag_count)?;
    log::info!("\n{}", table);

    log::info!("Saving result to {:?} ...", config.output.display().to_string());
    table.write_csv(&config.output)?;

    if let Some(path) = &config.summary {
        log::info!("Saving summary to {:?} ...", path.display().to_string());
        RunSummary::new(merger.name(), scorer.name(), threshold, &table).write_json(path)?;
    }

    Ok(table)
}
