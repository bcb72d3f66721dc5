use std::sync::{Arc, Condvar, Mutex};

use crate::domain::request::{Batch, Request};
use crate::infrastructure::aggregate_pool::AggregateBatchingPool;
use crate::infrastructure::translation_model::TranslationModel;

struct Inner {
    pool: AggregateBatchingPool,
    enqueued: usize,
    shutdown: bool,
}

/// Monitor wrapping the (not-thread-safe) `AggregateBatchingPool`: a mutex
/// guards the inner pool and an `enqueued` counter, a condvar wakes workers
/// blocked in `generate_batch` on every enqueue or on shutdown.
pub struct ThreadsafeBatchingPool {
    inner: Mutex<Inner>,
    work: Condvar,
}

impl ThreadsafeBatchingPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pool: AggregateBatchingPool::new(),
                enqueued: 0,
                shutdown: false,
            }),
            work: Condvar::new(),
        }
    }

    pub fn enqueue_request(&self, model: &Arc<TranslationModel>, request: Arc<Request>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let n = inner.pool.enqueue_request(model, request);
        inner.enqueued += n;
        if n > 0 {
            self.work.notify_all();
        }
        n
    }

    /// Blocks until work is available or the pool is shut down. Returns
    /// `None` (an empty batch, the worker's poison signal) exactly when
    /// shutdown was requested and nothing remains queued.
    pub fn generate_batch(&self, batch: &mut Batch) -> Option<Arc<TranslationModel>> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.enqueued > 0 {
                if let Some(model) = inner.pool.generate_batch(batch) {
                    inner.enqueued -= batch.len();
                    return Some(model);
                }
                // FIFO momentarily has stale entries (models whose work was
                // already drained by a racing consumer); fall through to wait.
            }
            if inner.shutdown && inner.pool.is_empty() {
                batch.clear();
                return None;
            }
            inner = self.work.wait(inner).unwrap();
        }
    }

    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.shutdown = true;
        self.work.notify_all();
    }
}

impl Default for ThreadsafeBatchingPool {
    fn default() -> Self {
        Self::new()
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
    use crate::infrastructure::translation_model::ModelConfig;
    use std::thread;
    use std::time::Duration;

    fn make_model() -> Arc<TranslationModel> {
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
                    name: "t".to_string(),
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

    #[test]
    fn consumer_blocks_until_producer_enqueues() {
        let pool = Arc::new(ThreadsafeBatchingPool::new());
        let model = make_model();

        let consumer_pool = pool.clone();
        let handle = thread::spawn(move || {
            let mut batch = Batch::new();
            let model = consumer_pool.generate_batch(&mut batch);
            (model.is_some(), batch.len())
        });

        thread::sleep(Duration::from_millis(20));
        let (source, segments) = model.process("hi there");
        let request = Request::new(
            1,
            source,
            segments,
            ResponseOptions::default(),
            model.target_tokenizer(),
            Box::new(|_response| {}),
        );
        pool.enqueue_request(&model, request);

        let (got_model, n) = handle.join().unwrap();
        assert!(got_model);
        assert_eq!(n, 1);
    }

    #[test]
    fn shutdown_with_empty_pool_wakes_consumer_with_poison_batch() {
        let pool = Arc::new(ThreadsafeBatchingPool::new());
        let consumer_pool = pool.clone();
        let handle = thread::spawn(move || {
            let mut batch = Batch::new();
            let model = consumer_pool.generate_batch(&mut batch);
            (model.is_none(), batch.is_empty())
        });

        thread::sleep(Duration::from_millis(20));
        pool.shutdown();

        let (no_model, empty) = handle.join().unwrap();
        assert!(no_model);
        assert!(empty);
    }
}
