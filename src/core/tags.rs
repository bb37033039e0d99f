use std::fs;
use std::path::Path;

use crate::core::embeddings::EmbeddingSource;
use crate::error::{Result, ResultExt};
use crate::utils::dedup_preserving_order;

/// Ordered, duplicate-free list of tags to benchmark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList {
    tags: Vec<String>,
}

impl TagList {
    /// Builds a list from any sequence of tags; later duplicates are dropped.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: dedup_preserving_order(tags.into_iter().map(Into::into)),
        }
    }

    /// Reads one tag per line. Blank lines and `#` comments are skipped.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading tag list {}", path.display()))?;
        let tags = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect::<Vec<_>>();
        log::debug!("Loaded {} tags from {}", tags.len(), path.display());
        Ok(Self::new(tags))
    }

    /// Every tag an embedding source advertises, in its order.
    pub fn from_source(source: &dyn EmbeddingSource) -> Result<Self> {
        Ok(Self::new(source.tags()?))
    }

    /// The leading `n` tags, or all of them when fewer are available.
    pub fn first(&self, n: usize) -> &[String] {
        &self.tags[..n.min(self.tags.len())]
    }

    /// All tags.
    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
