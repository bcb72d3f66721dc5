#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::marian::{Config, MTModel};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};

use crate::domain::request::Batch;
use crate::domain::response::{FlatMatrix, PerSentenceArtifact};
use crate::domain::traits::InferenceBackend;

/// Per-replica settings for loading an encoder-decoder translation model off
/// the hub via `hf_hub::api::sync::Api` + `VarBuilder::from_mmaped_safetensors`
/// into an encoder-decoder `MTModel`.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub model_repo: String,
    pub revision: String,
    pub device: String,
    pub max_target_len: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model_repo: "Helsinki-NLP/opus-mt-en-de".to_string(),
            revision: "main".to_string(),
            device: "cpu".to_string(),
            max_target_len: 256,
        }
    }
}

/// Real inference collaborator: greedy (not beam-search) decoding over a
/// `candle_transformers` Marian encoder-decoder. Beam search, scorer
/// ensembles and shortlisting are deliberately left out so the fabric above
/// it (batching, caching, response building) has a real collaborator to
/// drive rather than a production-grade decoder. Per-step attention weights
/// are not exposed through this greedy loop, so the alignment matrix
/// returned here is a uniform placeholder rather than genuine soft
/// alignment (see DESIGN.md).
pub struct CandleMarianBackend {
    // `Mutex` because `MTModel`'s decoder step mutates cached KV state;
    // each replica is only ever touched by the one worker thread assigned
    // to it, so this is never actually contended, but the model's own API
    // is not `Sync` without interior mutability.
    model: Mutex<MTModel>,
    config: Config,
    device: Device,
}

impl CandleMarianBackend {
    pub fn load(settings: &BackendConfig) -> Result<Self> {
        let device = resolve_device(&settings.device);

        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            settings.model_repo.clone(),
            RepoType::Model,
            settings.revision.clone(),
        ));

        let config_file = repo.get("config.json")?;
        let weights_file = repo.get("model.safetensors")?;

        let config: Config = serde_json::from_str(&std::fs::read_to_string(config_file)?)?;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_file], DType::F32, &device)? };
        let model = MTModel::new(&config, vb)?;

        Ok(Self {
            model: Mutex::new(model),
            config,
            device,
        })
    }

    pub fn eos_id(&self) -> u32 {
        self.config.eos_token_id
    }

    fn greedy_decode(&self, source_ids: &[u32]) -> Result<(Vec<u32>, Vec<f32>)> {
        let mut model = self.model.lock().unwrap();
        model.reset_kv_cache();

        let input_ids = Tensor::new(source_ids, &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encoder().forward(&input_ids, 0)?;

        let mut decoded = vec![self.config.decoder_start_token_id];
        let mut word_scores = Vec::new();

        for step in 0..self.config.max_position_embeddings.min(256) {
            let decoder_ids = Tensor::new(decoded.as_slice(), &self.device)?.unsqueeze(0)?;
            let logits = model.decoder().forward(&decoder_ids, &encoder_output, step)?;
            let last = logits.squeeze(0)?.get(logits.dim(1)? - 1)?;

            let probs = candle_nn::ops::softmax(&last, 0)?;
            let next_token = probs.argmax(0)?.to_scalar::<u32>()?;
            let prob = probs.get(next_token as usize)?.to_scalar::<f32>()?;
            word_scores.push(prob.max(1e-9).ln());

            decoded.push(next_token);
            if next_token == self.config.eos_token_id {
                break;
            }
        }

        decoded.remove(0); // drop the synthetic decoder-start token
        Ok((decoded, word_scores))
    }
}

impl InferenceBackend for CandleMarianBackend {
    fn translate_batch(&self, _replica_id: usize, batch: &Batch) -> Vec<PerSentenceArtifact> {
        batch
            .sentences()
            .iter()
            .map(|sentence| {
                let source = sentence.segment();
                match self.greedy_decode(&source) {
                    Ok((target_tokens, word_scores)) => {
                        let sentence_score = if word_scores.is_empty() {
                            0.0
                        } else {
                            word_scores.iter().sum::<f32>() / word_scores.len() as f32
                        };
                        let rows = target_tokens.len().max(1);
                        let cols = source.len().max(1);
                        let uniform = 1.0 / cols as f32;
                        PerSentenceArtifact {
                            target_tokens,
                            word_scores,
                            alignment: FlatMatrix::new(vec![uniform; rows * cols], rows, cols),
                            sentence_score,
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "inference backend failed on sentence");
                        PerSentenceArtifact::default()
                    }
                }
            })
            .collect()
    }
}

/// Fetches just `config.json` for a hub repo, without downloading weights,
/// so callers wiring up a tokenizer can learn the model's `eos_token_id`
/// before the (much larger) `CandleMarianBackend::load` runs.
pub fn fetch_eos_id(settings: &BackendConfig) -> Result<u32> {
    let api = Api::new()?;
    let repo = api.repo(Repo::with_revision(
        settings.model_repo.clone(),
        RepoType::Model,
        settings.revision.clone(),
    ));
    let config_file = repo.get("config.json")?;
    let config: Config = serde_json::from_str(&std::fs::read_to_string(config_file)?)?;
    Ok(config.eos_token_id)
}

fn resolve_device(device_str: &str) -> Device {
    match device_str.to_lowercase().as_str() {
        "cuda" | "gpu" => {
            #[cfg(feature = "cuda")]
            {
                Device::new_cuda(0).unwrap_or(Device::Cpu)
            }
            #[cfg(not(feature = "cuda"))]
            {
                tracing::warn!("cuda requested but not compiled in, falling back to cpu");
                Device::Cpu
            }
        }
        "metal" => {
            #[cfg(feature = "metal")]
            {
                Device::new_metal(0).unwrap_or(Device::Cpu)
            }
            #[cfg(not(feature = "metal"))]
            {
                tracing::warn!("metal requested but not compiled in, falling back to cpu");
                Device::Cpu
            }
        }
        _ => Device::Cpu,
    }
}

/// Deterministic backend used by tests: "translates" a sentence by
/// reversing its token ids, scoring every word `-0.1` and producing an
/// identity alignment. No model download, no device, no nondeterminism —
/// suitable for unit and property tests.
pub struct MockInferenceBackend {
    pub path: PathBuf,
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self { path: PathBuf::new() }
    }
}

impl InferenceBackend for MockInferenceBackend {
    fn translate_batch(&self, _replica_id: usize, batch: &Batch) -> Vec<PerSentenceArtifact> {
        batch
            .sentences()
            .iter()
            .map(|sentence| {
                let mut target_tokens = sentence.segment();
                target_tokens.reverse();
                let n = target_tokens.len();
                let rows = n.max(1);
                let cols = n.max(1);
                let mut values = vec![0.0; rows * cols];
                for i in 0..n {
                    values[i * cols + (n - 1 - i)] = 1.0;
                }
                PerSentenceArtifact {
                    word_scores: vec![-0.1; n],
                    alignment: FlatMatrix::new(values, rows, cols),
                    sentence_score: -0.1,
                    target_tokens,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::annotation::AnnotatedText;
    use crate::domain::request::{Request, RequestSentence};
    use crate::domain::response::ResponseOptions;
    use crate::infrastructure::tokenizer::WhitespaceTokenizer;
    use std::sync::Arc;

    #[test]
    fn mock_backend_reverses_tokens_and_produces_identity_alignment() {
        let backend = MockInferenceBackend::default();
        let request = Request::new(
            1,
            AnnotatedText::new(),
            vec![vec![1, 2, 3]],
            ResponseOptions::default(),
            Arc::new(WhitespaceTokenizer::new()),
            Box::new(|_response| {}),
        );

        let mut batch = Batch::new();
        batch.add(RequestSentence::new(0, request));

        let artifacts = backend.translate_batch(0, &batch);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].target_tokens, vec![3, 2, 1]);
        assert_eq!(artifacts[0].alignment.row(0), &[0.0, 0.0, 1.0]);
    }
}
