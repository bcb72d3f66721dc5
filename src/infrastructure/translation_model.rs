use std::sync::{Arc, Mutex};

use crate::domain::annotation::AnnotatedText;
use crate::domain::errors::InferenceError;
use crate::domain::request::{Batch, Request, Segment};
use crate::domain::traits::{InferenceBackend, Tokenizer};
use crate::infrastructure::batching_pool::BatchingPool;
use crate::infrastructure::cache::SentenceCache;
use crate::infrastructure::text_processor::TextProcessor;

/// Per-model tunables, ported from `translation_model.h`'s constructor
/// options and `FabricConfig`'s fields that vary per registered model rather
/// than process-wide.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub name: String,
    pub mini_batch_words: usize,
    pub max_length_break: usize,
    /// Independent inference backend replicas. A batch
    /// is assigned to replica `worker_index % replicas.len()`, so no two
    /// worker threads ever touch the same replica concurrently.
    pub replicas: usize,
}

/// Holds everything needed to take one model from raw text to translated
/// artifacts: its text processor, its (mutex-guarded, not internally
/// thread-safe) batching pool, its target vocabulary, its cache, and its `R`
/// inference backend replicas. Ported from `translation_model.h`/`.cpp`.
pub struct TranslationModel {
    config: ModelConfig,
    text_processor: TextProcessor,
    target_tokenizer: Arc<dyn Tokenizer>,
    batching_pool: Mutex<BatchingPool>,
    cache: Arc<dyn SentenceCache>,
    replicas: Vec<Arc<dyn InferenceBackend>>,
}

impl TranslationModel {
    pub fn new(
        config: ModelConfig,
        text_processor: TextProcessor,
        target_tokenizer: Arc<dyn Tokenizer>,
        cache: Arc<dyn SentenceCache>,
    ) -> Result<Self, InferenceError> {
        let batching_pool = BatchingPool::new(config.mini_batch_words, config.max_length_break)?;
        Ok(Self {
            replicas: Vec::new(),
            config,
            text_processor,
            target_tokenizer,
            batching_pool: Mutex::new(batching_pool),
            cache,
        })
    }

    /// Attaches the `R` inference backend replicas. Split from `new` so
    /// tests can build a model without a real backend when they only
    /// exercise the batching/caching path.
    pub fn with_replicas(mut self, replicas: Vec<Arc<dyn InferenceBackend>>) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn target_tokenizer(&self) -> Arc<dyn Tokenizer> {
        self.target_tokenizer.clone()
    }

    pub fn cache(&self) -> &Arc<dyn SentenceCache> {
        &self.cache
    }

    pub fn process(&self, text: &str) -> (AnnotatedText, Vec<Segment>) {
        self.text_processor.process(text)
    }

    /// Probes the cache for each segment; segments with a hit are delivered
    /// immediately (as if a worker had translated them) and excluded from
    /// what gets enqueued into the batching pool.
    pub fn enqueue(&self, request: Arc<Request>) -> usize {
        let mut prefilled = vec![false; request.num_segments()];
        for i in 0..request.num_segments() {
            let segment = request.segment(i);
            if let Some(artifact) = self.cache.fetch(&segment) {
                request.process_artifact(i, artifact);
                prefilled[i] = true;
            }
        }

        let mut pool = self.batching_pool.lock().unwrap();
        pool.enqueue_request(&request, &prefilled)
    }

    pub fn generate_batch(&self, batch: &mut Batch) -> usize {
        let mut pool = self.batching_pool.lock().unwrap();
        pool.generate_batch(batch)
    }

    /// Runs a batch through replica `worker_index % R`, storing each fresh
    /// artifact into the cache before delivering it to its `RequestSentence`.
    pub fn translate_batch(&self, worker_index: usize, batch: &mut Batch) -> Result<(), InferenceError> {
        if batch.is_empty() {
            return Err(InferenceError::EmptyBatch);
        }
        let replica_id = worker_index % self.replicas.len().max(1);
        let backend = self
            .replicas
            .get(replica_id)
            .cloned()
            .ok_or_else(|| InferenceError::ModelNotFound {
                model_id: self.config.name.clone(),
            })?;

        let artifacts = backend.translate_batch(replica_id, batch);
        debug_assert_eq!(artifacts.len(), batch.len());

        for (sentence, artifact) in batch.sentences().iter().zip(&artifacts) {
            self.cache.insert(&sentence.segment(), artifact);
        }

        batch.complete(artifacts);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::response::ResponseOptions;
    use crate::infrastructure::cache::ShardedCache;
    use crate::infrastructure::splitter::LineSplitter;
    use crate::infrastructure::tokenizer::WhitespaceTokenizer;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn make_model() -> TranslationModel {
        let tokenizer = Arc::new(WhitespaceTokenizer::new());
        let processor = TextProcessor::new(
            Arc::new(LineSplitter),
            tokenizer.clone(),
            8,
            crate::domain::traits::SplitMode::WrappedText,
            100,
        )
        .unwrap();
        TranslationModel::new(
            ModelConfig {
                name: "test".to_string(),
                mini_batch_words: 100,
                max_length_break: 8,
                replicas: 1,
            },
            processor,
            tokenizer,
            Arc::new(ShardedCache::new(8)),
        )
        .unwrap()
    }

    #[test]
    fn cache_hit_prefills_and_skips_enqueue() {
        let model = make_model();
        let (source, segments) = model.process("hi");
        let segment = segments[0].clone();

        model.cache().insert(
            &segment,
            &crate::domain::response::PerSentenceArtifact {
                target_tokens: vec![9],
                ..Default::default()
            },
        );

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let request = Request::new(
            1,
            source,
            segments,
            ResponseOptions::default(),
            model.target_tokenizer(),
            Box::new(move |_response| fired_clone.store(true, Ordering::SeqCst)),
        );
        let enqueued = model.enqueue(request);
        assert_eq!(enqueued, 0);

        let mut batch = Batch::new();
        assert_eq!(model.generate_batch(&mut batch), 0);
        assert!(fired.load(Ordering::SeqCst));
    }
}
