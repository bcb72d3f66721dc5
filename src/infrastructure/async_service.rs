use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;

use crate::domain::errors::InferenceError;
use crate::domain::request::{Batch, Callback, Request};
use crate::domain::response::{Response, ResponseOptions};
use crate::domain::traits::{HtmlProcessor, TranslationService};
use crate::infrastructure::cache::CacheStats;
use crate::infrastructure::threadsafe_pool::ThreadsafeBatchingPool;
use crate::infrastructure::translation_model::TranslationModel;

/// Owns the worker threadpool and the threadsafe aggregate batching pool,
/// fanning requests out across however many named models are registered.
/// `num_workers` OS threads each loop on `pool.generate_batch()`, translate
/// whatever batch comes back, and exit when handed the empty-batch poison
/// value.
pub struct AsyncService {
    models: HashMap<String, Arc<TranslationModel>>,
    pool: Arc<ThreadsafeBatchingPool>,
    html: Option<Arc<dyn HtmlProcessor>>,
    next_request_id: AtomicU64,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncService {
    pub fn new(
        models: HashMap<String, Arc<TranslationModel>>,
        num_workers: usize,
        html: Option<Arc<dyn HtmlProcessor>>,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            models,
            pool: Arc::new(ThreadsafeBatchingPool::new()),
            html,
            next_request_id: AtomicU64::new(1),
            workers: std::sync::Mutex::new(Vec::new()),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for worker_index in 0..num_workers.max(1) {
            let pool = service.pool.clone();
            workers.push(std::thread::spawn(move || worker_loop(worker_index, pool)));
        }
        *service.workers.lock().unwrap() = workers;

        service
    }

    fn model(&self, name: &str) -> Result<Arc<TranslationModel>, InferenceError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| InferenceError::ModelNotFound { model_id: name.to_string() })
    }

    /// Raw callback-based primitive. Builds a `Request`,
    /// pre-fills cache hits, enqueues the remainder, and returns immediately
    /// — the callback fires later, inline on whichever worker thread closes
    /// the request's last sentence.
    pub fn translate(
        &self,
        model_name: &str,
        text: String,
        options: ResponseOptions,
        callback: Callback,
    ) -> Result<(), InferenceError> {
        let model = self.model(model_name)?;

        let (plain_text, reinsertion) = if options.html {
            match &self.html {
                Some(html) => {
                    let (plain, record) = html.strip(&text);
                    (plain, Some(record))
                }
                None => (text, None),
            }
        } else {
            (text, None)
        };

        let (source, segments) = model.process(&plain_text);
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let wrapped_callback: Callback = if let (true, Some(html), Some(record)) = (options.html, self.html.clone(), reinsertion) {
            Box::new(move |mut response: Response| {
                html.restore(&mut response, &record);
                callback(response);
            })
        } else {
            callback
        };

        let request = Request::new(id, source, segments, options, model.target_tokenizer(), wrapped_callback);
        self.pool.enqueue_request(&model, request);
        Ok(())
    }

    /// Two-stage pivot translation: the second stage is
    /// enqueued from inside the first stage's completion callback, so it
    /// runs as a nested call on whatever worker thread closed stage one —
    /// per design notes, whether that inherits the same scheduling priority
    /// as a freshly-submitted request is left unspecified; this
    /// implementation gives it none, it is simply a normal `translate` call
    /// enqueued like any other (see DESIGN.md Open Question).
    pub fn pivot(
        &self,
        model_a: &str,
        model_b: &str,
        text: String,
        options: ResponseOptions,
        callback: Callback,
    ) -> Result<(), InferenceError> {
        let model_a = self.model(model_a)?;
        let model_b_name = model_b.to_string();

        let service_models = self.models.clone();
        let pool = self.pool.clone();
        let stage2_options = options.clone();

        let stage1_callback: Callback = Box::new(move |stage1: Response| {
            let Some(model_b) = service_models.get(&model_b_name).cloned() else {
                tracing::error!(model = %model_b_name, "pivot target model not found");
                return;
            };

            let (source_b, segments_b) = model_b.process(&stage1.target.text);
            let stage1_source = stage1.source.clone();

            let stitch: Callback = Box::new(move |stage2: Response| {
                callback(Response {
                    source: stage1_source,
                    target: stage2.target,
                    alignments: stage2.alignments,
                    qualities: stage2.qualities,
                });
            });

            let id = rand_request_id();
            let request = Request::new(id, source_b, segments_b, stage2_options, model_b.target_tokenizer(), stitch);
            pool.enqueue_request(&model_b, request);
        });

        self.translate(model_a.name(), text, options, stage1_callback)
    }

    pub fn cache_stats(&self) -> HashMap<String, CacheStats> {
        self.models
            .iter()
            .map(|(name, model)| (name.clone(), model.cache().stats()))
            .collect()
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

/// Monotonic ids are normally handed out by `next_request_id`, but the
/// second stage of a pivot is spawned from inside a callback that only
/// borrows `&self` transiently through captured clones, so it mints its own
/// id from a process-wide counter instead of threading `&self` through the
/// closure.
fn rand_request_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1 << 32);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

fn worker_loop(worker_index: usize, pool: Arc<ThreadsafeBatchingPool>) {
    loop {
        let mut batch = Batch::new();
        let Some(model) = pool.generate_batch(&mut batch) else {
            tracing::info!(worker_index, "worker exiting, pool shut down");
            return;
        };

        batch.log_stats();
        if let Err(err) = model.translate_batch(worker_index, &mut batch) {
            tracing::error!(worker_index, error = %err, "batch translation failed");
        }
    }
}

impl Drop for AsyncService {
    fn drop(&mut self) {
        self.pool.shutdown();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.join();
        }
    }
}

#[async_trait]
impl TranslationService for AsyncService {
    async fn translate(&self, model: &str, text: String, options: ResponseOptions) -> Result<Response, InferenceError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        AsyncService::translate(self, model, text, options, Box::new(move |response| {
            let _ = tx.send(response);
        }))?;
        rx.await.map_err(|_| InferenceError::ModelNotFound { model_id: model.to_string() })
    }

    async fn pivot(
        &self,
        model_a: &str,
        model_b: &str,
        text: String,
        options: ResponseOptions,
    ) -> Result<Response, InferenceError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        AsyncService::pivot(self, model_a, model_b, text, options, Box::new(move |response| {
            let _ = tx.send(response);
        }))?;
        rx.await.map_err(|_| InferenceError::ModelNotFound { model_id: model_a.to_string() })
    }

    fn cache_stats(&self) -> HashMap<String, CacheStats> {
        AsyncService::cache_stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::SplitMode;
    use crate::infrastructure::cache::ShardedCache;
    use crate::infrastructure::inference_backend::MockInferenceBackend;
    use crate::infrastructure::splitter::LineSplitter;
    use crate::infrastructure::text_processor::TextProcessor;
    use crate::infrastructure::tokenizer::WhitespaceTokenizer;
    use crate::infrastructure::translation_model::ModelConfig;
    use std::sync::atomic::AtomicBool;

    fn build_model(name: &str) -> Arc<TranslationModel> {
        let tokenizer = Arc::new(WhitespaceTokenizer::new());
        let processor = TextProcessor::new(Arc::new(LineSplitter), tokenizer.clone(), 16, SplitMode::WrappedText, 256).unwrap();
        Arc::new(
            TranslationModel::new(
                ModelConfig {
                    name: name.to_string(),
                    mini_batch_words: 256,
                    max_length_break: 16,
                    replicas: 1,
                },
                processor,
                tokenizer,
                Arc::new(ShardedCache::new(64)),
            )
            .unwrap()
            .with_replicas(vec![Arc::new(MockInferenceBackend::default())]),
        )
    }

    #[tokio::test]
    async fn translate_empty_text_yields_empty_response() {
        let mut models = HashMap::new();
        models.insert("m".to_string(), build_model("m"));
        let service = AsyncService::new(models, 1, None);

        let response = TranslationService::translate(service.as_ref(), "m", String::new(), ResponseOptions::default())
            .await
            .unwrap();
        assert_eq!(response.num_sentences(), 0);
        assert_eq!(response.target.text, "");
    }

    #[tokio::test]
    async fn translate_unknown_model_is_an_error() {
        let service = AsyncService::new(HashMap::new(), 1, None);
        let result = TranslationService::translate(service.as_ref(), "missing", "hi".to_string(), ResponseOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn callback_fires_exactly_once_per_request() {
        let mut models = HashMap::new();
        models.insert("m".to_string(), build_model("m"));
        let service = AsyncService::new(models, 2, None);

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let done_tx = std::sync::Mutex::new(Some(done_tx));

        service
            .translate(
                "m",
                "hello world".to_string(),
                ResponseOptions::default(),
                Box::new(move |_response| {
                    assert!(!fired_clone.swap(true, Ordering::SeqCst));
                    if let Some(tx) = done_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                }),
            )
            .unwrap();

        done_rx.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }
}
