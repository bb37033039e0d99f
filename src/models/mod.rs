//! Result records produced by a benchmark run

/// Per-tag metrics, the result table and the run summary.
pub mod report;
