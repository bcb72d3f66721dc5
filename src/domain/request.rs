use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use super::annotation::AnnotatedText;
use super::response::{PerSentenceArtifact, Response, ResponseOptions};
use super::traits::Tokenizer;

pub type TokenId = u32;
pub type Segment = Vec<TokenId>;

/// Boxed completion callback. Per the design notes' "completion via
/// std::future/std::promise" guidance, a `FnOnce` callback is the one
/// primitive the core needs; a `Future`-returning convenience (used by the
/// async/HTTP surface) is layered atop it rather than baked into `Request`
/// itself.
pub type Callback = Box<dyn FnOnce(Response) + Send>;

/// A single translation request: the original text, its sentence/token
/// annotation, the tokenized segments to translate, and a completion gate
/// that fires once every segment has a result.
///
/// Unlike the cyclic `shared_ptr` graph this is ported from (`Request` owning
/// a promise, `RequestSentence`s holding a back-reference into `Request`,
/// worker callbacks completing through that back-reference), this always
/// lives behind an `Arc`: there is no parent pointer to cycle against, and
/// completion is a plain atomic counter.
pub struct Request {
    id: u64,
    source: AnnotatedText,
    segments: Vec<Segment>,
    artifacts: Vec<std::sync::Mutex<Option<PerSentenceArtifact>>>,
    remaining: AtomicUsize,
    options: ResponseOptions,
    target_tokenizer: Arc<dyn Tokenizer>,
    callback: std::sync::Mutex<Option<Callback>>,
}

impl Request {
    pub fn new(
        id: u64,
        source: AnnotatedText,
        segments: Vec<Segment>,
        options: ResponseOptions,
        target_tokenizer: Arc<dyn Tokenizer>,
        callback: Callback,
    ) -> Arc<Self> {
        let n = segments.len();
        let request = Arc::new(Self {
            id,
            source,
            segments,
            artifacts: (0..n).map(|_| std::sync::Mutex::new(None)).collect(),
            remaining: AtomicUsize::new(n),
            options,
            target_tokenizer,
            callback: std::sync::Mutex::new(Some(callback)),
        });

        // Empty input is legal and produces an empty `Response`, but has no
        // sentences to count down, so nothing would otherwise trigger
        // completion.
        if n == 0 {
            request.complete();
        }

        request
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn segment_tokens(&self, index: usize) -> usize {
        self.segments[index].len()
    }

    pub fn segment(&self, index: usize) -> Segment {
        self.segments[index].clone()
    }

    pub fn source(&self) -> &AnnotatedText {
        &self.source
    }

    pub fn options(&self) -> &ResponseOptions {
        &self.options
    }

    pub fn target_tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.target_tokenizer
    }

    /// Called by a worker once `index`'s artifact is ready. If this was the
    /// last outstanding segment, builds and delivers the `Response`.
    pub fn process_artifact(self: &Arc<Self>, index: usize, artifact: PerSentenceArtifact) {
        *self.artifacts[index].lock().unwrap() = Some(artifact);
        if self.remaining.fetch_sub(1, AtomicOrdering::AcqRel) == 1 {
            self.complete();
        }
    }

    fn complete(self: &Arc<Self>) {
        let artifacts: Vec<PerSentenceArtifact> = self
            .artifacts
            .iter()
            .map(|slot| slot.lock().unwrap().take().expect("all segments completed"))
            .collect();

        let response = crate::infrastructure::response_builder::build(self, artifacts);

        if let Some(callback) = self.callback.lock().unwrap().take() {
            callback(response);
        }
    }
}

/// A view into one segment of a `Request`, used by the batching pool. Keeps
/// a reference to the whole request so completing the last sentence can
/// trigger the request's completion.
#[derive(Clone)]
pub struct RequestSentence {
    index: usize,
    request: Arc<Request>,
}

impl RequestSentence {
    pub fn new(index: usize, request: Arc<Request>) -> Self {
        Self { index, request }
    }

    pub fn num_tokens(&self) -> usize {
        self.request.segment_tokens(self.index)
    }

    pub fn segment(&self) -> Segment {
        self.request.segment(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn request_id(&self) -> u64 {
        self.request.id()
    }

    pub fn complete(&self, artifact: PerSentenceArtifact) {
        self.request.process_artifact(self.index, artifact);
    }
}

impl PartialEq for RequestSentence {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.request, &other.request) && self.index == other.index
    }
}
impl Eq for RequestSentence {}

impl PartialOrd for RequestSentence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RequestSentence {
    fn cmp(&self, other: &Self) -> Ordering {
        // Priority among sentences is purely request-id then in-request index,
        // mirroring the `operator<` used to order entries in the batching
        // pool's per-length sets.
        self.request
            .id()
            .cmp(&other.request.id())
            .then(self.index.cmp(&other.index))
    }
}

/// An ordered collection of sentences compiled from one or more requests,
/// ready to be handed to an inference backend. An empty batch is the poison
/// value workers use to recognize shutdown.
#[derive(Default)]
pub struct Batch {
    id: u64,
    sentences: Vec<RequestSentence>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.sentences.clear();
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn add(&mut self, sentence: RequestSentence) {
        self.sentences.push(sentence);
    }

    pub fn sentences(&self) -> &[RequestSentence] {
        &self.sentences
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Completes every sentence in the batch with its corresponding
    /// artifact, in order.
    pub fn complete(&self, artifacts: Vec<PerSentenceArtifact>) {
        debug_assert_eq!(artifacts.len(), self.sentences.len());
        for (sentence, artifact) in self.sentences.iter().zip(artifacts) {
            sentence.complete(artifact);
        }
    }

    pub fn log_stats(&self) {
        let num_tokens: usize = self.sentences.iter().map(|s| s.num_tokens()).sum();
        let max_length = self.sentences.iter().map(|s| s.num_tokens()).max().unwrap_or(0);
        tracing::debug!(
            tokens = num_tokens,
            max_length,
            sentences = self.sentences.len(),
            "batch compiled"
        );
    }
}
