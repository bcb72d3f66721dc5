use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::errors::InferenceError;
use crate::domain::request::{Batch, Request, RequestSentence};

/// Bucketed priority queue: one sorted set per possible token length, drained
/// from short to long so a batch's rows share a length class and padding
/// never wastes tensor capacity. Not thread-safe by itself; concurrency is
/// layered on by `ThreadsafeBatchingPool`.
pub struct BatchingPool {
    mini_batch_words: usize,
    buckets: Vec<BTreeSet<RequestSentence>>,
}

impl BatchingPool {
    pub fn new(mini_batch_words: usize, max_length_break: usize) -> Result<Self, InferenceError> {
        if max_length_break > mini_batch_words {
            return Err(InferenceError::InvalidConfig {
                message: "max_length_break > mini_batch_words would let a sentence overflow a batch".to_string(),
            });
        }
        Ok(Self {
            mini_batch_words,
            buckets: (0..=max_length_break).map(|_| BTreeSet::new()).collect(),
        })
    }

    /// Inserts every not-yet-cached sentence of `request` into its
    /// length bucket. `prefilled` marks sentence indices already satisfied by
    /// a cache hit, which are skipped here. Returns the number enqueued.
    pub fn enqueue_request(&mut self, request: &Arc<Request>, prefilled: &[bool]) -> usize {
        let mut enqueued = 0;
        for i in 0..request.num_segments() {
            if prefilled.get(i).copied().unwrap_or(false) {
                continue;
            }
            let sentence = RequestSentence::new(i, request.clone());
            let bucket_id = sentence.num_tokens();
            debug_assert!(bucket_id < self.buckets.len());
            self.buckets[bucket_id].insert(sentence);
            enqueued += 1;
        }
        enqueued
    }

    /// Greedily fills `batch` ascending through buckets while
    /// `(batch.len() + 1) * bucket_length <= mini_batch_words`. Returns the
    /// number of sentences placed.
    pub fn generate_batch(&mut self, batch: &mut Batch) -> usize {
        batch.clear();

        for length in 0..self.buckets.len() {
            while let Some(sentence) = self.buckets[length].iter().next().cloned() {
                let padded = (batch.len() + 1) * length;
                if padded <= self.mini_batch_words {
                    self.buckets[length].remove(&sentence);
                    batch.add(sentence);
                } else {
                    debug_assert!(batch.len() > 0);
                    return batch.len();
                }
            }
        }

        batch.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::response::ResponseOptions;
    fn make_request(id: u64, lengths: &[usize]) -> Arc<Request> {
        let segments = lengths.iter().map(|&n| vec![1u32; n]).collect();
        Request::new(
            id,
            crate::domain::annotation::AnnotatedText::new(),
            segments,
            ResponseOptions::default(),
            Arc::new(crate::infrastructure::tokenizer::WhitespaceTokenizer::new()),
            Box::new(|_response| {}),
        )
    }

    #[test]
    fn batch_respects_token_budget() {
        let mut pool = BatchingPool::new(10, 8).unwrap();
        let request = make_request(1, &[4, 4, 4]);
        pool.enqueue_request(&request, &[]);

        let mut batch = Batch::new();
        let n = pool.generate_batch(&mut batch);
        // budget 10, length 4: (1)*4=4 ok, (2)*4=8 ok, (3)*4=12 > 10 -> stop at 2
        assert_eq!(n, 2);
    }

    #[test]
    fn shorter_buckets_drain_before_longer_ones() {
        let mut pool = BatchingPool::new(100, 8).unwrap();
        let long_request = make_request(1, &[8]);
        let short_request = make_request(2, &[2]);
        pool.enqueue_request(&long_request, &[]);
        pool.enqueue_request(&short_request, &[]);

        let mut batch = Batch::new();
        pool.generate_batch(&mut batch);
        assert_eq!(batch.sentences()[0].num_tokens(), 2);
    }

    #[test]
    fn prefilled_sentences_are_skipped() {
        let mut pool = BatchingPool::new(100, 8).unwrap();
        let request = make_request(1, &[3, 3]);
        let enqueued = pool.enqueue_request(&request, &[true, false]);
        assert_eq!(enqueued, 1);
    }

    #[test]
    fn rejects_inconsistent_budget() {
        assert!(BatchingPool::new(4, 8).is_err());
    }
}
