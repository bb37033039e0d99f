//! Small helpers shared across the crate

use std::collections::HashSet;
use std::path::Path;

use crate::error::Result;

/// Ensure the directory holding `path` exists, creating it if necessary
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Drop repeated items, keeping the first occurrence of each
pub(crate) fn dedup_preserving_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b").join("out.csv");
        ensure_parent_dir(&target).unwrap();
        assert!(target.parent().unwrap().is_dir());

        // bare file names have an empty parent
        ensure_parent_dir(Path::new("out.csv")).unwrap();
    }

    #[test]
    fn test_dedup_preserving_order() {
        let items = ["b", "a", "b", "c", "a"].iter().map(|s| s.to_string());
        assert_eq!(dedup_preserving_order(items), vec!["b", "a", "c"]);
    }
}
