use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use memmap2::Mmap;
use safetensors::{Dtype, SafeTensors};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::debug;

/// One entry of a sentence-transformers `modules.json`
#[derive(Debug, Deserialize)]
struct ModuleEntry {
    path: String,
    #[serde(rename = "type")]
    module_type: String,
}

/// Sentence-transformers StaticEmbedding model: a token-embedding matrix
/// plus a tokenizer. Encoding is a mean over the looked-up rows, optionally
/// truncated (Matryoshka-style) and L2-normalized.
#[derive(Debug)]
pub struct StaticEmbeddingsModel {
    tokenizer: Tokenizer,
    embeddings: Vec<f32>,
    vocab_size: usize,
    dim: usize,
}

impl StaticEmbeddingsModel {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let module_dir = resolve_module_dir(model_dir)?;
        let weights_path = module_dir.join("model.safetensors");
        let tokenizer_path = [
            module_dir.join("tokenizer.json"),
            model_dir.join("tokenizer.json"),
        ]
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| anyhow!("tokenizer.json not found in {}", model_dir.display()))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("failed to load tokenizer: {e}"))?;

        let file = File::open(&weights_path)
            .with_context(|| format!("failed to open {}", weights_path.display()))?;
        let mmap = unsafe { Mmap::map(&file)? };
        let tensors = SafeTensors::deserialize(&mmap)
            .map_err(|e| anyhow!("failed to parse {}: {e}", weights_path.display()))?;
        let view = tensors
            .tensor("embedding.weight")
            .map_err(|e| anyhow!("missing embedding.weight tensor: {e}"))?;

        if view.dtype() != Dtype::F32 {
            return Err(anyhow!(
                "embedding.weight has dtype {:?}, expected F32",
                view.dtype()
            ));
        }
        let shape = view.shape();
        if shape.len() != 2 {
            return Err(anyhow!(
                "embedding.weight has shape {shape:?}, expected [vocab, dim]"
            ));
        }
        let (vocab_size, dim) = (shape[0], shape[1]);

        let embeddings: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if embeddings.len() != vocab_size * dim {
            return Err(anyhow!("embedding.weight data does not match its shape"));
        }

        debug!(vocab_size, dim, "static embeddings loaded");

        Ok(Self {
            tokenizer,
            embeddings,
            vocab_size,
            dim,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Encode one text: mean of token embedding rows, truncated to
    /// `min(truncate_dim, dim)` columns. Empty token sequences produce a
    /// zero vector.
    pub fn encode(&self, text: &str, truncate_dim: usize, normalize: bool) -> Result<Vec<f32>> {
        let dimension = truncate_dim.min(self.dim);
        if dimension == 0 {
            return Err(anyhow!("truncate dimension must be greater than 0"));
        }

        // No special tokens for static models
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("tokenization failed: {e}"))?;
        let ids = encoding.get_ids();
        if ids.is_empty() {
            return Ok(vec![0.0; dimension]);
        }

        let mut pooled = vec![0.0f32; dimension];
        for &id in ids {
            let id = id as usize;
            if id >= self.vocab_size {
                return Err(anyhow!("token id {id} out of range for vocabulary"));
            }
            let row = &self.embeddings[id * self.dim..id * self.dim + dimension];
            for (acc, &v) in pooled.iter_mut().zip(row) {
                *acc += v;
            }
        }
        let count = ids.len() as f32;
        for v in &mut pooled {
            *v /= count;
        }

        if normalize {
            l2_normalize(&mut pooled);
        }
        Ok(pooled)
    }
}

/// Divide by the L2 norm, with an epsilon so zero vectors stay zero.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt() + f32::EPSILON;
    for v in values {
        *v /= norm;
    }
}

/// Locate the StaticEmbedding module directory inside a sentence-transformers
/// layout: follow `modules.json` when present, otherwise probe the usual
/// `0_StaticEmbedding/` subfolder and the directory root.
fn resolve_module_dir(model_dir: &Path) -> Result<PathBuf> {
    let modules_path = model_dir.join("modules.json");
    if modules_path.is_file() {
        let contents = std::fs::read_to_string(&modules_path)
            .with_context(|| format!("failed to read {}", modules_path.display()))?;
        let modules: Vec<ModuleEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", modules_path.display()))?;
        let entry = modules
            .iter()
            .find(|m| m.module_type.contains("StaticEmbedding"))
            .ok_or_else(|| anyhow!("no StaticEmbedding module in {}", modules_path.display()))?;
        return Ok(model_dir.join(&entry.path));
    }

    for candidate in ["0_StaticEmbedding", ""] {
        let dir = model_dir.join(candidate);
        if dir.join("model.safetensors").is_file() {
            return Ok(dir);
        }
    }
    Err(anyhow!(
        "model.safetensors not found in {}",
        model_dir.display()
    ))
}
