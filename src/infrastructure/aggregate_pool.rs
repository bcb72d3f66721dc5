use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use crate::domain::request::{Batch, Request};
use crate::infrastructure::translation_model::TranslationModel;

/// FIFO of weak references to registered models, round-robining a single
/// service thread across many models' batching pools, ported from the
/// original's `AggregateBatchingPool`. A model is pushed onto the back every
/// time a request is enqueued for it; `generate_batch` pops from the front
/// and tries that model. A model that yields a batch is pushed back onto the
/// front, since its pool may still hold more sentences than fit in one
/// batch — it stays at the front until a call finds it empty, draining it
/// across repeated calls exactly like the original's `generateBatch`. Dead
/// (dropped) models are silently skipped.
#[derive(Default)]
pub struct AggregateBatchingPool {
    fifo: VecDeque<Weak<TranslationModel>>,
}

impl AggregateBatchingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_request(&mut self, model: &Arc<TranslationModel>, request: Arc<Request>) -> usize {
        let enqueued = model.enqueue(request);
        if enqueued > 0 {
            self.fifo.push_back(Arc::downgrade(model));
        }
        enqueued
    }

    /// Pops models off the front of the FIFO until one yields a non-empty
    /// batch or the FIFO is drained. Returns the model the batch came from
    /// alongside the batch itself.
    pub fn generate_batch(&mut self, batch: &mut Batch) -> Option<Arc<TranslationModel>> {
        while let Some(weak) = self.fifo.pop_front() {
            let Some(model) = weak.upgrade() else {
                continue;
            };
            let n = model.generate_batch(batch);
            if n > 0 {
                self.fifo.push_front(Arc::downgrade(&model));
                return Some(model);
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::response::ResponseOptions;
    use crate::infrastructure::cache::ShardedCache;
    use crate::infrastructure::splitter::LineSplitter;
    use crate::infrastructure::text_processor::TextProcessor;
    use crate::infrastructure::tokenizer::WhitespaceTokenizer;
    use crate::infrastructure::translation_model::{ModelConfig, TranslationModel};

    fn make_model(name: &str) -> Arc<TranslationModel> {
        let tokenizer = Arc::new(WhitespaceTokenizer::new());
        let processor = TextProcessor::new(
            Arc::new(LineSplitter),
            tokenizer.clone(),
            8,
            crate::domain::traits::SplitMode::WrappedText,
            100,
        )
        .unwrap();
        Arc::new(
            TranslationModel::new(
                ModelConfig {
                    name: name.to_string(),
                    mini_batch_words: 100,
                    max_length_break: 8,
                    replicas: 1,
                },
                processor,
                tokenizer,
                Arc::new(ShardedCache::new(8)),
            )
            .unwrap(),
        )
    }

    fn request(model: &TranslationModel, text: &str) -> Arc<Request> {
        let (source, segments) = model.process(text);
        Request::new(
            1,
            source,
            segments,
            ResponseOptions::default(),
            model.target_tokenizer(),
            Box::new(|_response| {}),
        )
    }

    #[test]
    fn round_robins_across_models() {
        let model_a = make_model("a");
        let model_b = make_model("b");
        let mut aggregate = AggregateBatchingPool::new();

        aggregate.enqueue_request(&model_a, request(&model_a, "hi there"));
        aggregate.enqueue_request(&model_b, request(&model_b, "yo"));

        let mut batch = Batch::new();
        let first = aggregate.generate_batch(&mut batch).unwrap();
        assert_eq!(first.name(), "a");

        let second = aggregate.generate_batch(&mut batch).unwrap();
        assert_eq!(second.name(), "b");

        assert!(aggregate.generate_batch(&mut batch).is_none());
    }

    /// Builds a request whose segments have exactly `lengths` tokens each
    /// (no text processor / wrapping involved), so the batching math is
    /// exact and the test controls precisely how many sentences fit in one
    /// batch.
    fn request_with_lengths(model: &TranslationModel, id: u64, lengths: &[usize]) -> Arc<Request> {
        let segments = lengths.iter().map(|&n| vec![1u32; n]).collect();
        Request::new(
            id,
            crate::domain::annotation::AnnotatedText::new(),
            segments,
            ResponseOptions::default(),
            model.target_tokenizer(),
            Box::new(|_response| {}),
        )
    }

    #[test]
    fn model_with_residual_sentences_stays_at_front_until_drained() {
        // mini_batch_words=10, three 5-token sentences: only 2 fit in one
        // batch ((2)*5=10 <= 10, (3)*5=15 > 10), so the model's pool still
        // holds a residual sentence after the first `generate_batch` call.
        let tokenizer = Arc::new(WhitespaceTokenizer::new());
        let processor = TextProcessor::new(
            Arc::new(LineSplitter),
            tokenizer.clone(),
            5,
            crate::domain::traits::SplitMode::WrappedText,
            10,
        )
        .unwrap();
        let model = Arc::new(
            TranslationModel::new(
                ModelConfig {
                    name: "a".to_string(),
                    mini_batch_words: 10,
                    max_length_break: 5,
                    replicas: 1,
                },
                processor,
                tokenizer,
                Arc::new(ShardedCache::new(8)),
            )
            .unwrap(),
        );
        let other = make_model("b");

        let mut aggregate = AggregateBatchingPool::new();
        aggregate.enqueue_request(&model, request_with_lengths(&model, 1, &[5, 5, 5]));
        aggregate.enqueue_request(&other, request(&other, "yo"));

        let mut batch = Batch::new();
        let first = aggregate.generate_batch(&mut batch).unwrap();
        assert_eq!(first.name(), "a");
        assert_eq!(batch.len(), 2);

        // Model "a" still has one residual sentence, so it must come back
        // around before "b" gets a turn, instead of being dropped from the
        // FIFO with un-batched work left behind.
        let second = aggregate.generate_batch(&mut batch).unwrap();
        assert_eq!(second.name(), "a");
        assert_eq!(batch.len(), 1);

        let third = aggregate.generate_batch(&mut batch).unwrap();
        assert_eq!(third.name(), "b");

        assert!(aggregate.generate_batch(&mut batch).is_none());
    }

    #[test]
    fn dropped_model_is_skipped_silently() {
        let model_a = make_model("a");
        let mut aggregate = AggregateBatchingPool::new();
        aggregate.enqueue_request(&model_a, request(&model_a, "hi"));
        drop(model_a);

        let mut batch = Batch::new();
        assert!(aggregate.generate_batch(&mut batch).is_none());
    }
}
