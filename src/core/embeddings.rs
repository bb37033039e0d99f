use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::error::{AppError, Result, ResultExt};

/// Something that can hand out the precomputed embeddings of a tag.
///
/// Rows of the returned matrix are samples, columns are feature dimensions.
pub trait EmbeddingSource: Send + Sync {
    /// Returns every embedding stored for `tag`.
    fn get_embeddings(&self, tag: &str) -> Result<Array2<f32>>;

    /// Lists the tags this source knows about, in a stable order.
    fn tags(&self) -> Result<Vec<String>>;
}

/// L2 norm of a vector, accumulated in f64 so large components cannot overflow
pub fn l2_norm(v: ArrayView1<'_, f32>) -> f64 {
    v.iter().map(|&x| f64::from(x).powi(2)).sum::<f64>().sqrt()
}

/// L2 norm of every row of a matrix
pub fn row_norms(m: ArrayView2<'_, f32>) -> Array1<f64> {
    m.map_axis(Axis(1), l2_norm)
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if !(norm_a > 0.0 && norm_b > 0.0) || !norm_a.is_finite() || !norm_b.is_finite() {
        return 0.0;
    }

    let dot_product: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (f64::from(x) / norm_a) * (f64::from(y) / norm_b))
        .sum();
    dot_product.clamp(-1.0, 1.0) as f32
}

/// Reads `<root>/<tag>.json` files, each a JSON array of equal-length float arrays.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    /// Creates a source rooted at `root`; the directory must exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(AppError::NotFound(format!(
                "embedding directory {} does not exist",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    fn path_for(&self, tag: &str) -> Result<PathBuf> {
        if tag.is_empty() || tag.contains(['/', '\\']) || tag == "." || tag == ".." {
            return Err(AppError::InvalidInput(format!(
                "tag {:?} cannot be mapped to an embedding file",
                tag
            )));
        }
        Ok(self.root.join(format!("{}.json", tag)))
    }
}

impl EmbeddingSource for JsonDirSource {
    fn get_embeddings(&self, tag: &str) -> Result<Array2<f32>> {
        let path = self.path_for(tag)?;
        if !path.is_file() {
            return Err(AppError::NotFound(format!("tag {:?} ({})", tag, path.display())));
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let rows: Vec<Vec<f32>> = serde_json::from_str(&raw)?;
        rows_to_matrix(tag, rows)
    }

    fn tags(&self) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tags.push(stem.to_string());
            }
        }
        tags.sort();
        Ok(tags)
    }
}

/// Stacks row vectors into a matrix, rejecting empty and ragged input.
pub fn rows_to_matrix(tag: &str, rows: Vec<Vec<f32>>) -> Result<Array2<f32>> {
    let n = rows.len();
    let dim = match rows.first() {
        Some(first) => first.len(),
        None => return Err(AppError::EmptyEmbeddings(tag.to_string())),
    };

    let mut flat = Vec::with_capacity(n * dim);
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() != dim {
            return Err(AppError::InvalidInput(format!(
                "embedding {} of tag {:?} has {} values, expected {}",
                i,
                tag,
                row.len(),
                dim
            )));
        }
        flat.extend(row);
    }

    Ok(Array2::from_shape_vec((n, dim), flat)?)
}

/// Embeddings held in memory, keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    store: BTreeMap<String, Array2<f32>>,
}

impl InMemorySource {
    /// Creates an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the embeddings of `tag`.
    pub fn insert<S: Into<String>>(&mut self, tag: S, embeddings: Array2<f32>) {
        self.store.insert(tag.into(), embeddings);
    }

    /// Builder-style variant of [`InMemorySource::insert`].
    pub fn with<S: Into<String>>(mut self, tag: S, embeddings: Array2<f32>) -> Self {
        self.insert(tag, embeddings);
        self
    }
}

impl EmbeddingSource for InMemorySource {
    fn get_embeddings(&self, tag: &str) -> Result<Array2<f32>> {
        self.store
            .get(tag)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("tag {:?}", tag)))
    }

    fn tags(&self) -> Result<Vec<String>> {
        Ok(self.store.keys().cloned().collect())
    }
}

/// Generates clustered embeddings on the fly.
///
/// Every tag gets its own non-negative centre; samples are the centre plus
/// uniform noise, scaled by a random magnitude factor. Output depends only on
/// the base seed and the tag name.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    /// Feature dimensionality
    pub dim: usize,
    /// Embeddings generated per tag
    pub samples_per_tag: usize,
    /// Half-width of the per-component noise
    pub noise: f32,
    /// Base seed mixed with the tag name
    pub seed: u64,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            dim: 768,
            samples_per_tag: 16,
            noise: 0.25,
            seed: 42,
        }
    }
}

/// Largest noise half-width [`SyntheticSource`] accepts.
pub const MAX_SYNTHETIC_NOISE: f32 = 1e6;

impl SyntheticSource {
    /// Rejects parameters that cannot produce finite embeddings.
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(AppError::Config("synthetic dimension must be positive".into()));
        }
        if !self.noise.is_finite() || self.noise.abs() > MAX_SYNTHETIC_NOISE {
            return Err(AppError::Config(format!(
                "synthetic noise must be a finite value up to {}, got {}",
                MAX_SYNTHETIC_NOISE, self.noise
            )));
        }
        Ok(())
    }

    fn rng_for(&self, tag: &str) -> ChaCha8Rng {
        // FNV-1a keeps the per-tag stream stable across builds
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in tag.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        ChaCha8Rng::seed_from_u64(self.seed ^ hash)
    }
}

impl EmbeddingSource for SyntheticSource {
    fn get_embeddings(&self, tag: &str) -> Result<Array2<f32>> {
        if self.samples_per_tag == 0 {
            return Err(AppError::EmptyEmbeddings(tag.to_string()));
        }
        self.validate()?;

        let mut rng = self.rng_for(tag);
        let centre: Vec<f32> = (0..self.dim).map(|_| rng.gen::<f32>()).collect();
        let noise = self.noise.abs();

        let mut flat = Vec::with_capacity(self.samples_per_tag * self.dim);
        for _ in 0..self.samples_per_tag {
            let scale: f32 = rng.gen_range(0.8..1.2);
            for &c in &centre {
                let jitter = if noise > 0.0 { rng.gen_range(-noise..=noise) } else { 0.0 };
                flat.push((c + jitter) * scale);
            }
        }

        Ok(Array2::from_shape_vec((self.samples_per_tag, self.dim), flat)?)
    }

    fn tags(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use std::io::Write;

    #[test]
    fn test_cosine_similarity() {
        // Test with identical vectors
        let a = Array1::from(vec![1.0, 0.0, 0.0]);
        let b = Array1::from(vec![1.0, 0.0, 0.0]);
        assert!((cosine_similarity(a.view(), b.view()) - 1.0).abs() < 1e-6);

        // Test with orthogonal vectors
        let a = Array1::from(vec![1.0, 0.0]);
        let b = Array1::from(vec![0.0, 1.0]);
        assert!(cosine_similarity(a.view(), b.view()).abs() < 1e-6);

        // Test with opposite vectors
        let a = Array1::from(vec![1.0, 0.0]);
        let b = Array1::from(vec![-1.0, 0.0]);
        assert!((cosine_similarity(a.view(), b.view()) + 1.0).abs() < 1e-6);

        // Zero vector has no direction
        let z = Array1::from(vec![0.0, 0.0]);
        assert_eq!(cosine_similarity(z.view(), a.view()), 0.0);
    }

    #[test]
    fn test_row_norms() {
        let m = array![[3.0f32, 4.0], [0.0, 0.0], [1.0, 0.0]];
        assert_eq!(row_norms(m.view()), array![5.0f64, 0.0, 1.0]);
    }

    #[test]
    fn test_norms_do_not_overflow() {
        let v = Array1::from_elem(8, 1e20f32);
        let norm = l2_norm(v.view());
        assert!(norm.is_finite());
        assert!((norm / (1e20 * 8f64.sqrt()) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(v.view(), v.view()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rows_to_matrix_rejects_ragged() {
        let err = rows_to_matrix("t", vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_rows_to_matrix_rejects_empty() {
        let err = rows_to_matrix("t", Vec::new()).unwrap_err();
        assert!(matches!(err, AppError::EmptyEmbeddings(ref tag) if tag == "t"));
    }

    #[test]
    fn test_json_dir_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("alice.json")).unwrap();
        write!(file, "[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = JsonDirSource::new(dir.path()).unwrap();
        let embs = source.get_embeddings("alice").unwrap();
        assert_eq!(embs.dim(), (2, 3));
        assert_eq!(embs[[1, 2]], 6.0);
        assert_eq!(source.tags().unwrap(), vec!["alice".to_string()]);

        assert!(matches!(
            source.get_embeddings("bob"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            source.get_embeddings("../alice"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_json_dir_source_missing_root() {
        assert!(JsonDirSource::new("/definitely/not/here").is_err());
    }

    #[test]
    fn test_in_memory_source() {
        let source = InMemorySource::new()
            .with("b", array![[1.0f32, 0.0]])
            .with("a", array![[0.0f32, 1.0]]);
        assert_eq!(source.tags().unwrap(), vec!["a", "b"]);
        assert_eq!(source.get_embeddings("b").unwrap(), array![[1.0f32, 0.0]]);
        assert!(source.get_embeddings("c").is_err());
    }

    #[test]
    fn test_synthetic_source_is_deterministic_per_tag() {
        let source = SyntheticSource {
            dim: 32,
            samples_per_tag: 4,
            ..Default::default()
        };
        let a1 = source.get_embeddings("a").unwrap();
        let a2 = source.get_embeddings("a").unwrap();
        let b = source.get_embeddings("b").unwrap();
        assert_eq!(a1.dim(), (4, 32));
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }

    #[test]
    fn test_synthetic_source_rejects_unbounded_noise() {
        for noise in [f32::INFINITY, f32::NAN, f32::MAX] {
            let source = SyntheticSource {
                dim: 4,
                noise,
                ..Default::default()
            };
            assert!(matches!(source.validate(), Err(AppError::Config(_))));
            assert!(matches!(source.get_embeddings("a"), Err(AppError::Config(_))));
        }
        assert!(SyntheticSource::default().validate().is_ok());
    }

    #[test]
    fn test_synthetic_source_rejects_zero_samples() {
        let source = SyntheticSource {
            samples_per_tag: 0,
            ..Default::default()
        };
        assert!(matches!(
            source.get_embeddings("a"),
            Err(AppError::EmptyEmbeddings(_))
        ));
    }
}
