use async_trait::async_trait;
use std::collections::HashMap;

use super::annotation::ByteRange;
use super::errors::InferenceError;
use super::request::{Batch, TokenId};
use super::response::{PerSentenceArtifact, Response, ResponseOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    OneSentencePerLine,
    OneParagraphPerLine,
    WrappedText,
}

/// Splits a blob of text into sentence substrings. Implementations must only
/// ever yield substrings of `text` (no copies, no reordering).
pub trait SentenceSplitter: Send + Sync {
    fn sentences<'a>(&self, text: &'a str, mode: SplitMode) -> Vec<&'a str>;
}

/// Subword vocabulary collaborator. Byte ranges returned by `encode_*` are
/// into the input `s`; byte ranges returned by `decode_*` are into the
/// returned `String`.
pub trait Tokenizer: Send + Sync {
    fn encode_with_byte_ranges(&self, s: &str, add_eos: bool) -> (Vec<TokenId>, Vec<ByteRange>);
    fn decode_with_byte_ranges(&self, ids: &[TokenId]) -> (String, Vec<ByteRange>);
    fn eos_id(&self) -> TokenId;
}

/// The neural inference kernel. Deliberately out of scope for this crate
/// beyond this contract: implementations compute one artifact per sentence
/// in `batch`, in order, and may assume `batch.len() > 0`. The caller (not
/// the backend) is responsible for delivering each artifact to its
/// sentence's slot via `Batch::complete`, since the caller also needs the
/// artifacts to populate the cache.
pub trait InferenceBackend: Send + Sync {
    fn translate_batch(&self, replica_id: usize, batch: &Batch) -> Vec<PerSentenceArtifact>;
}

/// Byte offsets (into the plain-text that was produced by `strip`) at which
/// an original tag must be reinserted, paired with the tag's literal text.
#[derive(Debug, Clone)]
pub struct TagInsertion {
    pub plain_text_offset: usize,
    pub tag: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReinsertionRecord {
    pub insertions: Vec<TagInsertion>,
}

/// Strips markup from a source string before translation and reinserts it
/// into the built `Response` afterward, via `AnnotatedText::apply`. This
/// fabric does not interpret tag semantics (nesting, attributes); it only
/// tracks where tags were and puts them back.
pub trait HtmlProcessor: Send + Sync {
    fn strip(&self, text: &str) -> (String, ReinsertionRecord);
    fn restore(&self, response: &mut Response, record: &ReinsertionRecord);
}

/// Layered configuration access, scoped to the translation fabric's
/// tunables.
pub trait ConfigurationService: Send + Sync {
    fn fabric_config(&self) -> crate::infrastructure::config::FabricConfig;
    fn server_config(&self) -> crate::infrastructure::config::ServerConfig;
    fn models(&self) -> Vec<crate::infrastructure::config::ModelEntry>;
}

/// Public surface of the fabric, as a `Future`-returning convenience layered
/// atop the raw callback `Request` primitive. The presentation layer depends
/// on this abstraction, not on the concrete worker-threadpool implementation.
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn translate(&self, model: &str, text: String, options: ResponseOptions) -> Result<Response, InferenceError>;

    async fn pivot(
        &self,
        model_a: &str,
        model_b: &str,
        text: String,
        options: ResponseOptions,
    ) -> Result<Response, InferenceError>;

    fn cache_stats(&self) -> HashMap<String, crate::infrastructure::cache::CacheStats>;
}
