/// Main error type for the benchmark
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// I/O errors (embedding files, tag lists, reports)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Array shape errors raised by ndarray
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown tag or missing resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// A tag resolved to zero embeddings, so there is nothing to merge
    #[error("No embeddings available for tag {0:?}")]
    EmptyEmbeddings(String),

    /// Vector length disagreement between inputs and outputs
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// The dimensionality that was required.
        expected: usize,
        /// The dimensionality that was produced.
        found: usize,
    },

    /// The similarity scorer broke its output contract
    #[error("Scorer error: {0}")]
    Scorer(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, AppError>;

/// Extension trait for working with Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add lazily built context to an error
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| AppError::Internal(format!("{}: {}", context, e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| {
            let context = f();
            AppError::Internal(format!("{}: {}", context, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_message() {
        let err = AppError::DimensionMismatch { expected: 768, found: 512 };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 768, found 512");
    }

    #[test]
    fn test_context_wraps_foreign_errors() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        let err = res.context("reading tag list").unwrap_err();
        assert!(matches!(err, AppError::Internal(ref m) if m == "reading tag list: disk gone"));
    }

    #[test]
    fn test_anyhow_maps_to_internal() {
        let err: AppError = anyhow::anyhow!("solver exploded").into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
