use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::merge::{CosineOptimMerge, MergeKind, MergeStrategy};
use crate::core::metrics::{DistanceScorer, MetricKind};
use crate::error::{AppError, Result};

/// Prefix of every environment variable read by [`BenchConfig::from_env`].
pub const ENV_PREFIX: &str = "CCIP_MERGE_";

/// Default file the result table is written to
pub const DEFAULT_OUTPUT: &str = "test_result.csv";

/// Configuration for a benchmark run
#[derive(Clone, Debug, PartialEq)]
pub struct BenchConfig {
    /// Number of leading tags to evaluate
    pub tag_count: usize,
    /// CSV report path
    pub output: PathBuf,
    /// Optional JSON summary path
    pub summary: Option<PathBuf>,
    /// Merge strategy under test
    pub strategy: MergeKind,
    /// Distance metric used for scoring
    pub metric: MetricKind,
    /// Cutoff override; the metric's default applies when unset
    pub threshold: Option<f32>,
    /// Seed for stochastic merge strategies
    pub seed: Option<u64>,
    /// Iteration cap of the optimizing merge
    pub max_iterations: usize,
    /// Convergence tolerance of the optimizing merge
    pub tolerance: f64,
    /// Evaluate tags concurrently
    pub parallel: bool,
    /// Draw a progress bar on stderr
    pub progress: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        let optim = CosineOptimMerge::default();
        Self {
            tag_count: 100,
            output: PathBuf::from(DEFAULT_OUTPUT),
            summary: None,
            strategy: MergeKind::default(),
            metric: MetricKind::default(),
            threshold: None,
            seed: None,
            max_iterations: optim.max_iterations,
            tolerance: optim.tolerance,
            parallel: false,
            progress: true,
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            AppError::Config(format!("{}{}={:?}: {}", ENV_PREFIX, name, raw, e))
        }),
        None => Ok(None),
    }
}

fn parse_flag(name: &str) -> Result<Option<bool>> {
    match var(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(AppError::Config(format!(
                "{}{}={:?} is not a boolean",
                ENV_PREFIX, name, raw
            ))),
        },
        None => Ok(None),
    }
}

impl BenchConfig {
    /// Defaults overlaid with `CCIP_MERGE_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }

        let mut config = Self::default();
        if let Some(count) = parse_var("COUNT")? {
            config.tag_count = count;
        }
        if let Some(output) = var("OUTPUT") {
            config.output = PathBuf::from(output);
        }
        if let Some(summary) = var("SUMMARY") {
            config.summary = Some(PathBuf::from(summary));
        }
        if let Some(strategy) = parse_var("STRATEGY")? {
            config.strategy = strategy;
        }
        if let Some(metric) = parse_var("METRIC")? {
            config.metric = metric;
        }
        if let Some(threshold) = parse_var("THRESHOLD")? {
            config.threshold = Some(threshold);
        }
        if let Some(seed) = parse_var("SEED")? {
            config.seed = Some(seed);
        }
        if let Some(parallel) = parse_flag("PARALLEL")? {
            config.parallel = parallel;
        }
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no run can use.
    pub fn validate(&self) -> Result<()> {
        if let Some(threshold) = self.threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(AppError::Config(format!(
                    "threshold must be a non-negative number, got {}",
                    threshold
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(AppError::Config("max_iterations must be positive".into()));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(AppError::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Merge strategy described by this configuration
    pub fn merge_strategy(&self) -> Box<dyn MergeStrategy> {
        self.strategy
            .build(self.seed, self.max_iterations, self.tolerance)
    }

    /// Scorer described by this configuration
    pub fn scorer(&self) -> Box<dyn DistanceScorer> {
        self.metric.build()
    }

    /// Explicit threshold, or the default of `scorer`
    pub fn threshold_for(&self, scorer: &dyn DistanceScorer) -> f32 {
        self.threshold.unwrap_or_else(|| scorer.default_threshold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            "COUNT", "OUTPUT", "SUMMARY", "STRATEGY", "METRIC", "THRESHOLD", "SEED", "PARALLEL",
        ] {
            env::remove_var(format!("{}{}", ENV_PREFIX, name));
        }
    }

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.tag_count, 100);
        assert_eq!(config.output, PathBuf::from("test_result.csv"));
        assert_eq!(config.strategy, MergeKind::Optimize);
        assert_eq!(config.metric, MetricKind::Euclidean);
        assert_eq!(config.threshold_for(config.scorer().as_ref()), 0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("CCIP_MERGE_COUNT", "7");
        env::set_var("CCIP_MERGE_METRIC", "cosine");
        env::set_var("CCIP_MERGE_THRESHOLD", "0.2");
        env::set_var("CCIP_MERGE_PARALLEL", "yes");
        env::set_var("CCIP_MERGE_SEED", "");

        let config = BenchConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.tag_count, 7);
        assert_eq!(config.metric, MetricKind::Cosine);
        assert_eq!(config.threshold, Some(0.2));
        assert!(config.parallel);
        assert_eq!(config.seed, None);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        env::set_var("CCIP_MERGE_COUNT", "many");
        let result = BenchConfig::from_env();
        clear_env();
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let config = BenchConfig {
            threshold: Some(-1.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
