use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use ndarray::Ix3;
use ort::{execution_providers::CPUExecutionProvider, session::Session, value::Tensor};
use tokenizers::Tokenizer;
use tracing::debug;

/// How to reduce the model output to a single vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    /// First token (CLS) of the last hidden state
    FirstToken,
    /// The model's own pooled output (CLIP text tower)
    Pooler,
}

/// Transformer text encoder backed by ONNX Runtime.
///
/// Loads `model.onnx` (or `onnx/model.onnx`) and `tokenizer.json` from a
/// local model directory. One text in, one vector out.
#[derive(Debug)]
pub struct TextEncoder {
    session: Session,
    tokenizer: Tokenizer,
    pooling: Pooling,
    max_length: usize,
    wants_token_type_ids: bool,
}

impl TextEncoder {
    pub fn load(model_dir: &Path, pooling: Pooling, max_length: usize) -> Result<Self> {
        let model_path = resolve_in_dir(model_dir, &["model.onnx", "onnx/model.onnx"])?;
        let tokenizer_path = resolve_in_dir(model_dir, &["tokenizer.json", "onnx/tokenizer.json"])?;

        let session = Session::builder()?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .commit_from_file(&model_path)
            .with_context(|| format!("failed to load ONNX model {}", model_path.display()))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("failed to load tokenizer: {e}"))?;

        // XLM-RoBERTa and CLIP graphs take no token_type_ids input
        let wants_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        debug!(
            model = %model_path.display(),
            ?pooling,
            wants_token_type_ids,
            "encoder ready"
        );

        Ok(Self {
            session,
            tokenizer,
            pooling,
            max_length,
            wants_token_type_ids,
        })
    }

    pub fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenization failed: {e}"))?;

        let seq_len = encoding.get_ids().len().min(self.max_length);
        if seq_len == 0 {
            return Err(anyhow!("input tokenized to an empty sequence"));
        }

        let input_ids: Vec<i64> = encoding.get_ids()[..seq_len]
            .iter()
            .map(|&id| id as i64)
            .collect();
        let attention_mask: Vec<i64> = encoding.get_attention_mask()[..seq_len]
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding.get_type_ids()[..seq_len]
            .iter()
            .map(|&t| t as i64)
            .collect();

        let shape = [1, seq_len];
        let outputs = if self.wants_token_type_ids {
            self.session.run(ort::inputs![
                "input_ids" => Tensor::from_array((shape, input_ids))?,
                "attention_mask" => Tensor::from_array((shape, attention_mask))?,
                "token_type_ids" => Tensor::from_array((shape, token_type_ids))?,
            ])?
        } else {
            self.session.run(ort::inputs![
                "input_ids" => Tensor::from_array((shape, input_ids))?,
                "attention_mask" => Tensor::from_array((shape, attention_mask))?,
            ])?
        };

        match self.pooling {
            Pooling::FirstToken => {
                let first = outputs.iter().next().map(|(_, v)| v);
                let value = outputs
                    .get("last_hidden_state")
                    .or_else(|| first.as_deref())
                    .ok_or_else(|| anyhow!("model produced no outputs"))?;
                let hidden = value.try_extract_array::<f32>()?;
                let hidden = hidden
                    .into_dimensionality::<Ix3>()
                    .map_err(|e| anyhow!("expected [batch, seq, hidden] output: {e}"))?;
                Ok(hidden.slice(ndarray::s![0, 0, ..]).to_vec())
            }
            Pooling::Pooler => {
                let value = outputs
                    .get("pooler_output")
                    .ok_or_else(|| anyhow!("model has no pooler_output"))?;
                let pooled = value.try_extract_array::<f32>()?;
                Ok(pooled.iter().copied().collect())
            }
        }
    }
}

/// Find the first of `candidates` that exists under `dir`.
fn resolve_in_dir(dir: &Path, candidates: &[&str]) -> Result<PathBuf> {
    for candidate in candidates {
        let path = dir.join(candidate);
        if path.is_file() {
            return Ok(path);
        }
    }
    Err(anyhow!(
        "none of [{}] found in {}",
        candidates.join(", "),
        dir.display()
    ))
}
