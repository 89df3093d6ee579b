use std::path::Path;

use anyhow::{Result, anyhow};
use model2vec_rs::model::StaticModel;
use tracing::debug;

use crate::encoder::{Pooling, TextEncoder};
use crate::static_embeddings::StaticEmbeddingsModel;
use crate::word2vec::WordVectors;

/// Supported embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Generic BERT-style encoder, first-token hidden state
    Bert,
    /// XLM-RoBERTa encoder, first-token hidden state
    XlmRoberta,
    /// CLIP text tower, pooled output
    Clip,
    /// Model2Vec static lookup model
    Model2Vec,
    /// Sentence-transformers StaticEmbedding, truncated and L2-normalized
    StaticEmbeddings,
    /// Plain-text word vectors, single-word lookup
    Word2Vec,
}

impl Backend {
    /// Parse a backend tag from the CLI
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bert" => Ok(Backend::Bert),
            "xlm-roberta" | "xlmroberta" | "xlmr" => Ok(Backend::XlmRoberta),
            "clip" => Ok(Backend::Clip),
            "model2vec" | "m2v" => Ok(Backend::Model2Vec),
            "static-embeddings" | "static" => Ok(Backend::StaticEmbeddings),
            "word2vec" | "w2v" => Ok(Backend::Word2Vec),
            _ => Err(anyhow!(
                "unknown backend '{s}', options: bert, xlm-roberta, clip, model2vec, \
                 static-embeddings, word2vec"
            )),
        }
    }

    /// Default token truncation length, matching the upstream model defaults
    pub fn default_max_length(self) -> usize {
        match self {
            Backend::Bert => 512,
            Backend::XlmRoberta => 128,
            Backend::Clip => 77,
            // Static backends tokenize without a sequence limit
            Backend::Model2Vec | Backend::StaticEmbeddings | Backend::Word2Vec => usize::MAX,
        }
    }
}

/// Per-invocation loading knobs, filled from CLI options
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Token truncation length override for encoder backends
    pub max_length: Option<usize>,
    /// Output dimensionality for static-embeddings (Matryoshka truncation)
    pub truncate_dim: usize,
    /// Vectors file name for word2vec when `model_dir` is a directory
    pub model_file: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_length: None,
            truncate_dim: 1023,
            model_file: "model.txt".to_string(),
        }
    }
}

#[derive(Debug)]
enum EmbedBackend {
    Encoder(TextEncoder),
    Model2Vec(StaticModel),
    Static(StaticEmbeddingsModel),
    Word2Vec(WordVectors),
}

#[derive(Debug)]
pub struct Embedder {
    backend: EmbedBackend,
    truncate_dim: usize,
}

impl Embedder {
    /// Load the model for `backend` from a local directory. No downloads:
    /// missing files fail fast with the underlying error.
    pub fn load(backend: Backend, model_dir: &Path, opts: &LoadOptions) -> Result<Self> {
        let max_length = opts.max_length.unwrap_or(backend.default_max_length());
        debug!(?backend, model_dir = %model_dir.display(), "loading model");

        let inner = match backend {
            Backend::Bert | Backend::XlmRoberta => EmbedBackend::Encoder(TextEncoder::load(
                model_dir,
                Pooling::FirstToken,
                max_length,
            )?),
            Backend::Clip => {
                EmbedBackend::Encoder(TextEncoder::load(model_dir, Pooling::Pooler, max_length)?)
            }
            Backend::Model2Vec => {
                let path = model_dir
                    .to_str()
                    .ok_or_else(|| anyhow!("model dir is not valid UTF-8"))?;
                EmbedBackend::Model2Vec(StaticModel::from_pretrained(path, None, None, None)?)
            }
            Backend::StaticEmbeddings => {
                EmbedBackend::Static(StaticEmbeddingsModel::load(model_dir)?)
            }
            Backend::Word2Vec => {
                EmbedBackend::Word2Vec(WordVectors::load(model_dir, &opts.model_file)?)
            }
        };

        Ok(Self {
            backend: inner,
            truncate_dim: opts.truncate_dim,
        })
    }

    /// Compute one embedding vector for `text`, already flattened to 1-D.
    /// Values come out in the backend's own order, untouched.
    pub fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        match &mut self.backend {
            EmbedBackend::Encoder(encoder) => encoder.embed(text),
            EmbedBackend::Model2Vec(model) => model
                .encode(&[text.to_string()])
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("no embedding returned")),
            EmbedBackend::Static(model) => model.encode(text, self.truncate_dim, true),
            EmbedBackend::Word2Vec(vectors) => vectors
                .encode(text)
                .map(|v| v.to_vec())
                .ok_or_else(|| anyhow!("word '{text}' not found in vocabulary")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tags() {
        assert_eq!(Backend::parse("bert").unwrap(), Backend::Bert);
        assert_eq!(Backend::parse("xlm-roberta").unwrap(), Backend::XlmRoberta);
        assert_eq!(Backend::parse("clip").unwrap(), Backend::Clip);
        assert_eq!(Backend::parse("model2vec").unwrap(), Backend::Model2Vec);
        assert_eq!(
            Backend::parse("static-embeddings").unwrap(),
            Backend::StaticEmbeddings
        );
        assert_eq!(Backend::parse("word2vec").unwrap(), Backend::Word2Vec);
    }

    #[test]
    fn test_parse_aliases_and_case() {
        assert_eq!(Backend::parse("BERT").unwrap(), Backend::Bert);
        assert_eq!(Backend::parse("xlmr").unwrap(), Backend::XlmRoberta);
        assert_eq!(Backend::parse("m2v").unwrap(), Backend::Model2Vec);
        assert_eq!(Backend::parse("static").unwrap(), Backend::StaticEmbeddings);
        assert_eq!(Backend::parse("w2v").unwrap(), Backend::Word2Vec);
    }

    #[test]
    fn test_parse_unknown_tag() {
        let err = Backend::parse("nonexistent").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown backend 'nonexistent'"), "{msg}");
        assert!(msg.contains("options:"), "{msg}");
    }

    #[test]
    fn test_default_max_lengths() {
        assert_eq!(Backend::Bert.default_max_length(), 512);
        assert_eq!(Backend::XlmRoberta.default_max_length(), 128);
        assert_eq!(Backend::Clip.default_max_length(), 77);
    }

    #[test]
    fn test_load_missing_encoder_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Embedder::load(Backend::Bert, dir.path(), &LoadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("model.onnx"), "{err}");
    }

    #[test]
    fn test_load_missing_word2vec_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err =
            Embedder::load(Backend::Word2Vec, dir.path(), &LoadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("model.txt"), "{err}");
    }
}
