use indicatif::{ProgressBar, ProgressStyle};

use crate::core::embeddings::EmbeddingSource;
use crate::core::evaluate::evaluate_tag;
use crate::core::merge::MergeStrategy;
use crate::core::metrics::DistanceScorer;
use crate::core::tags::TagList;
use crate::error::Result;
use crate::models::report::{MetricsRow, ResultTable};

/// Runs the tag evaluator over the head of a tag list.
///
/// The first failing tag aborts the whole batch. Rows always come back in
/// tag-list order, also when tags are evaluated in parallel.
pub struct BatchRunner<'a> {
    source: &'a dyn EmbeddingSource,
    merger: &'a dyn MergeStrategy,
    scorer: &'a dyn DistanceScorer,
    threshold: f32,
    parallel: bool,
    show_progress: bool,
}

impl std::fmt::Debug for BatchRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("merger", &self.merger.name())
            .field("scorer", &self.scorer.name())
            .field("threshold", &self.threshold)
            .field("parallel", &self.parallel)
            .field("show_progress", &self.show_progress)
            .finish()
    }
}

impl<'a> BatchRunner<'a> {
    /// Sequential runner using the scorer's default threshold, with a progress bar.
    pub fn new(
        source: &'a dyn EmbeddingSource,
        merger: &'a dyn MergeStrategy,
        scorer: &'a dyn DistanceScorer,
    ) -> Self {
        Self {
            source,
            merger,
            scorer,
            threshold: scorer.default_threshold(),
            parallel: false,
            show_progress: true,
        }
    }

    /// Overrides the "same subject" distance cutoff.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Evaluates tags concurrently when the `parallel` feature is enabled.
    pub fn parallel(mut self, parallel: bool) -> Self {
        if parallel && !cfg!(feature = "parallel") {
            log::warn!("Built without the `parallel` feature, evaluating tags sequentially");
        }
        self.parallel = parallel;
        self
    }

    /// Shows or hides the progress bar.
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Cutoff in use.
    pub fn current_threshold(&self) -> f32 {
        self.threshold
    }

    /// Evaluates the first `n` tags of `tags` (fewer if the list is shorter).
    pub fn run(&self, tags: &TagList, n: usize) -> Result<ResultTable> {
        let picked = tags.first(n);
        if picked.len() < n {
            log::info!("Requested {} tags but only {} are available", n, picked.len());
        }

        let progress = self.progress_bar(picked.len() as u64);
        let rows = self.evaluate_all(picked, &progress);
        match &rows {
            Ok(_) => progress.finish(),
            Err(_) => progress.abandon(),
        }
        let table = ResultTable::new(rows?);

        match table.summary() {
            Some(summary) => log::info!(
                "Mean diff: {:.4}, same ratio: {:.4}, time cost: {:.4}s.",
                summary.mean_diff,
                summary.same_ratio,
                summary.time_cost
            ),
            None => log::warn!("No tags were evaluated"),
        }
        Ok(table)
    }

    fn evaluate_one(&self, tag: &str) -> Result<MetricsRow> {
        log::info!("Merging for tag {:?} ...", tag);
        evaluate_tag(tag, self.source, self.merger, self.scorer, self.threshold)
    }

    #[cfg(feature = "parallel")]
    fn evaluate_all(&self, tags: &[String], progress: &ProgressBar) -> Result<Vec<MetricsRow>> {
        use rayon::prelude::*;

        if !self.parallel {
            return self.evaluate_sequential(tags, progress);
        }
        tags.par_iter()
            .map(|tag| {
                let row = self.evaluate_one(tag);
                progress.inc(1);
                row
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_all(&self, tags: &[String], progress: &ProgressBar) -> Result<Vec<MetricsRow>> {
        self.evaluate_sequential(tags, progress)
    }

    fn evaluate_sequential(
        &self,
        tags: &[String],
        progress: &ProgressBar,
    ) -> Result<Vec<MetricsRow>> {
        let mut rows = Vec::with_capacity(tags.len());
        for tag in tags {
            rows.push(self.evaluate_one(tag)?);
            progress.inc(1);
        }
        Ok(rows)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        match ProgressStyle::default_bar().template("{msg} [{bar:40}] {pos}/{len} ({elapsed})") {
            Ok(style) => pb.set_style(style),
            Err(e) => log::debug!("Falling back to the default progress style: {}", e),
        }
        pb.set_message(self.merger.name());
        pb
    }
}
