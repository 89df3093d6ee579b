use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Word vectors in the classic text format: a `<count> <dim>` header line
/// followed by one `word v1 .. vdim` row per line.
#[derive(Debug)]
pub struct WordVectors {
    key_to_index: HashMap<String, usize>,
    vectors: Vec<f32>,
    dim: usize,
}

impl WordVectors {
    /// Load from `path` directly when it is a file, otherwise from
    /// `path/<model_file>`.
    pub fn load(path: &Path, model_file: &str) -> Result<Self> {
        let file_path = if path.is_file() {
            path.to_path_buf()
        } else {
            path.join(model_file)
        };
        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("failed to read vectors file {}", file_path.display()))?;

        let mut lines = contents.lines();
        let header = lines.next().ok_or_else(|| anyhow!("empty vectors file"))?;
        let mut parts = header.split_whitespace();
        let (count, dim) = match (parts.next(), parts.next(), parts.next()) {
            (Some(count), Some(dim), None) => (
                count.parse::<usize>().context("invalid header count")?,
                dim.parse::<usize>().context("invalid header dimension")?,
            ),
            _ => return Err(anyhow!("expected '<count> <dim>' header, got '{header}'")),
        };
        if dim == 0 {
            return Err(anyhow!("vector dimension must be greater than 0"));
        }

        let mut key_to_index = HashMap::with_capacity(count);
        let mut vectors = Vec::with_capacity(count * dim);
        for (line_no, line) in lines.enumerate() {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let word = parts
                .next()
                .ok_or_else(|| anyhow!("missing word on line {}", line_no + 2))?;
            let index = vectors.len() / dim;
            for value in parts {
                let value: f32 = value
                    .parse()
                    .with_context(|| format!("invalid float on line {}", line_no + 2))?;
                vectors.push(value);
            }
            if vectors.len() != (index + 1) * dim {
                return Err(anyhow!(
                    "line {} has {} values, expected {dim}",
                    line_no + 2,
                    vectors.len() - index * dim
                ));
            }
            key_to_index.insert(word.to_string(), index);
        }

        debug!(
            words = key_to_index.len(),
            dim,
            file = %file_path.display(),
            "word vectors loaded"
        );

        Ok(Self {
            key_to_index,
            vectors,
            dim,
        })
    }

    pub fn len(&self) -> usize {
        self.key_to_index.len()
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Look up the stored vector for `word`, if present.
    pub fn encode(&self, word: &str) -> Option<&[f32]> {
        let index = *self.key_to_index.get(word)?;
        Some(&self.vectors[index * self.dim..(index + 1) * self.dim])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VECTORS: &str = "3 4\n\
                           king 1 2 3 4\n\
                           queen 4 3 2 1\n\
                           apple 0 0 0 1\n";

    fn write_vectors(contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("model.txt"), contents).unwrap();
        dir
    }

    #[test]
    fn test_load_from_directory() {
        let dir = write_vectors(VECTORS);
        let vectors = WordVectors::load(dir.path(), "model.txt").expect("load");
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors.dimension(), 4);
    }

    #[test]
    fn test_load_from_file_path() {
        let dir = write_vectors(VECTORS);
        let file = dir.path().join("model.txt");
        let vectors = WordVectors::load(&file, "ignored.txt").expect("load");
        assert_eq!(vectors.len(), 3);
    }

    #[test]
    fn test_encode_returns_stored_row() {
        let dir = write_vectors(VECTORS);
        let vectors = WordVectors::load(dir.path(), "model.txt").expect("load");
        assert_eq!(vectors.encode("king").unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(vectors.encode("apple").unwrap(), &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_encode_unknown_word() {
        let dir = write_vectors(VECTORS);
        let vectors = WordVectors::load(dir.path(), "model.txt").expect("load");
        assert!(vectors.encode("zebra").is_none());
    }

    #[test]
    fn test_invalid_header() {
        let dir = write_vectors("not a header\nking 1 2 3 4\n");
        let err = WordVectors::load(dir.path(), "model.txt").unwrap_err();
        assert!(err.to_string().contains("header"), "{err}");
    }

    #[test]
    fn test_row_width_mismatch() {
        let dir = write_vectors("2 4\nking 1 2 3 4\nqueen 4 3\n");
        let err = WordVectors::load(dir.path(), "model.txt").unwrap_err();
        assert!(err.to_string().contains("expected 4"), "{err}");
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = WordVectors::load(dir.path(), "model.txt").unwrap_err();
        assert!(err.to_string().contains("model.txt"), "{err}");
    }
}
