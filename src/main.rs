//! Command line entry point of the merge benchmark.
//!
//! ```bash
//! # Precomputed features, one <tag>.json per tag
//! ccip-merge --embeddings features/ --tags picked_tags.txt -n 100
//!
//! # Smoke run on generated clusters
//! ccip-merge --synthetic --tags picked_tags.txt --seed 0 --parallel
//! ```

use std::path::PathBuf;

use clap::Parser;

use ccip_merge::{
    init, run_benchmark, BenchConfig, EmbeddingSource, JsonDirSource, MergeKind, MetricKind,
    Result, SyntheticSource, TagList,
};

#[allow(dead_code)]
mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Measure how well a merged embedding represents the embeddings it came from.
#[derive(Parser, Debug)]
#[command(name = "ccip-merge")]
#[command(about = "Benchmark embedding merge strategies per tag", version)]
struct Args {
    /// Number of leading tags to evaluate
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Directory holding one <tag>.json embedding file per tag
    #[arg(long, conflicts_with = "synthetic", required_unless_present = "synthetic")]
    embeddings: Option<PathBuf>,

    /// Generate clustered embeddings instead of reading them
    #[arg(long, requires = "tags")]
    synthetic: bool,

    /// Tag list file, one tag per line (defaults to every tag of the source)
    #[arg(long)]
    tags: Option<PathBuf>,

    /// CSV report path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write a JSON run summary to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Merge strategy (optimize or centroid)
    #[arg(long)]
    strategy: Option<MergeKind>,

    /// Distance metric (cosine or euclidean)
    #[arg(long)]
    metric: Option<MetricKind>,

    /// Distance below which two embeddings count as the same subject
    #[arg(long)]
    threshold: Option<f32>,

    /// Seed for the merge's random initial guess
    #[arg(long)]
    seed: Option<u64>,

    /// Iteration cap of the optimizing merge
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Convergence tolerance of the optimizing merge
    #[arg(long)]
    tolerance: Option<f64>,

    /// Evaluate tags concurrently
    #[arg(long)]
    parallel: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Synthetic embedding dimensionality
    #[arg(long, default_value = "768")]
    dim: usize,

    /// Synthetic embeddings per tag
    #[arg(long, default_value = "16")]
    samples: usize,

    /// Synthetic per-component noise
    #[arg(long, default_value = "0.25")]
    noise: f32,
}

impl Args {
    /// Command line values take precedence over the environment.
    fn apply(&self, config: &mut BenchConfig) {
        if let Some(count) = self.count {
            config.tag_count = count;
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(summary) = &self.summary {
            config.summary = Some(summary.clone());
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(metric) = self.metric {
            config.metric = metric;
        }
        if self.threshold.is_some() {
            config.threshold = self.threshold;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.max_iterations = max_iterations;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if self.parallel {
            config.parallel = true;
        }
        if self.no_progress {
            config.progress = false;
        }
    }

    fn source(&self, config: &BenchConfig) -> Result<Box<dyn EmbeddingSource>> {
        match &self.embeddings {
            Some(dir) => Ok(Box::new(JsonDirSource::new(dir)?)),
            None => {
                let source = SyntheticSource {
                    dim: self.dim,
                    samples_per_tag: self.samples,
                    noise: self.noise,
                    seed: config.seed.unwrap_or_default(),
                };
                source.validate()?;
                Ok(Box::new(source))
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = BenchConfig::from_env()?;
    args.apply(&mut config);
    config.validate()?;
    log::debug!("Configuration: {:?}", config);

    let source = args.source(&config)?;
    let tags = match &args.tags {
        Some(path) => TagList::from_file(path)?,
        None => TagList::from_source(source.as_ref())?,
    };
    if tags.is_empty() {
        log::warn!("Tag list is empty, nothing to evaluate");
    }

    run_benchmark(&config, source.as_ref(), &tags)?;
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init() {
        eprintln!("{}", e);
    }
    log::info!(
        "ccip-merge {} (built {})",
        built_info::PKG_VERSION,
        built_info::BUILT_TIME_UTC
    );

    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
