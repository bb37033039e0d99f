use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::ensure_parent_dir;

/// Column names of the CSV report, in order.
pub const CSV_HEADER: [&str; 4] = ["tag", "mean_diff", "same_ratio", "time_cost"];

/// Measurements for a single tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    /// The evaluated tag.
    pub tag: String,
    /// Mean distance between the merged vector and every original embedding.
    pub mean_diff: f64,
    /// Fraction of original embeddings closer than the threshold.
    pub same_ratio: f64,
    /// Seconds spent inside the merge function.
    pub time_cost: f64,
}

/// Column means over a [`ResultTable`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of rows averaged
    pub count: usize,
    /// Mean of `mean_diff`
    pub mean_diff: f64,
    /// Mean of `same_ratio`
    pub same_ratio: f64,
    /// Mean of `time_cost`
    pub time_cost: f64,
}

/// Metrics rows in tag order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<MetricsRow>,
}

impl ResultTable {
    /// Wraps already ordered rows.
    pub fn new(rows: Vec<MetricsRow>) -> Self {
        Self { rows }
    }

    /// Rows in evaluation order.
    pub fn rows(&self) -> &[MetricsRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no tag was evaluated.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Tags in row order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.tag.as_str())
    }

    /// Column-wise means, or `None` for an empty table.
    pub fn summary(&self) -> Option<Summary> {
        if self.rows.is_empty() {
            return None;
        }
        let n = self.rows.len() as f64;
        let (diff, ratio, time) = self.rows.iter().fold((0.0, 0.0, 0.0), |acc, r| {
            (acc.0 + r.mean_diff, acc.1 + r.same_ratio, acc.2 + r.time_cost)
        });

        Some(Summary {
            count: self.rows.len(),
            mean_diff: diff / n,
            same_ratio: ratio / n,
            time_cost: time / n,
        })
    }

    /// Writes the table as comma-separated values with a header row.
    ///
    /// An existing file is overwritten and missing parent directories are
    /// created. The header is written even when the table is empty.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(CSV_HEADER)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl FromIterator<MetricsRow> for ResultTable {
    fn from_iter<I: IntoIterator<Item = MetricsRow>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.tag.chars().count())
            .chain(std::iter::once(CSV_HEADER[0].len()))
            .max()
            .unwrap_or(3);

        write!(f, "{:<width$}", CSV_HEADER[0], width = width)?;
        for name in &CSV_HEADER[1..] {
            write!(f, "  {:>10}", name)?;
        }
        for row in &self.rows {
            write!(
                f,
                "\n{:<width$}  {:>10.4}  {:>10.4}  {:>10.4}",
                row.tag,
                row.mean_diff,
                row.same_ratio,
                row.time_cost,
                width = width
            )?;
        }
        write!(f, "\n[{} rows]", self.rows.len())
    }
}

/// Machine-readable description of one benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Merge strategy that produced the vectors
    pub strategy: String,
    /// Distance metric used for scoring
    pub metric: String,
    /// "Same subject" cutoff
    pub threshold: f32,
    /// Column means, absent when nothing was evaluated
    pub means: Option<Summary>,
    /// When the report was produced (RFC 3339 format)
    pub generated_at: String,
}

impl RunSummary {
    /// Builds the summary of `table`, stamped with the current time.
    pub fn new(strategy: &str, metric: &str, threshold: f32, table: &ResultTable) -> Self {
        Self {
            strategy: strategy.to_string(),
            metric: metric.to_string(),
            threshold,
            means: table.summary(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Serializes the summary to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the summary as JSON, overwriting `path`.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
