use std::sync::Arc;

use crate::domain::annotation::{AnnotatedText, ByteRange};
use crate::domain::errors::InferenceError;
use crate::domain::request::Segment;
use crate::domain::traits::{SentenceSplitter, SplitMode, Tokenizer};

/// Converts a raw blob of text into an `AnnotatedText` covering the entire
/// input plus the `Segment`s to hand to the inference backend, wrapping
/// over-long sentences into several same-order segments.
pub struct TextProcessor {
    splitter: Arc<dyn SentenceSplitter>,
    tokenizer: Arc<dyn Tokenizer>,
    max_length_break: usize,
    ssplit_mode: SplitMode,
}

impl TextProcessor {
    pub fn new(
        splitter: Arc<dyn SentenceSplitter>,
        tokenizer: Arc<dyn Tokenizer>,
        max_length_break: usize,
        ssplit_mode: SplitMode,
        mini_batch_words: usize,
    ) -> Result<Self, InferenceError> {
        if max_length_break > mini_batch_words {
            return Err(InferenceError::InvalidConfig {
                message: format!(
                    "max_length_break ({}) must not exceed mini_batch_words ({})",
                    max_length_break, mini_batch_words
                ),
            });
        }
        Ok(Self {
            splitter,
            tokenizer,
            max_length_break,
            ssplit_mode,
        })
    }

    pub fn process(&self, blob: &str) -> (AnnotatedText, Vec<Segment>) {
        let mut source = AnnotatedText::new();
        let mut segments = Vec::new();

        let sentences = self.splitter.sentences(blob, self.ssplit_mode);

        let mut cursor = 0usize;
        let mut sentence_iter = sentences.into_iter().peekable();

        while let Some(sentence) = sentence_iter.next() {
            let sentence_start = offset_of(blob, sentence);
            let prefix = &blob[cursor..sentence_start];
            cursor = sentence_start + sentence.len();

            let (tokens, ranges) = self.tokenizer.encode_with_byte_ranges(sentence, false);
            if tokens.is_empty() {
                source.append_sentence(prefix, Vec::<&str>::new());
                continue;
            }

            self.wrap(sentence, &tokens, &ranges, prefix, &mut source, &mut segments);
        }

        source.append_ending_whitespace(&blob[cursor..]);

        (source, segments)
    }

    /// Splits an already-tokenized sentence into sequential windows of at
    /// most `max_length_break` tokens, appending EOS to each window's
    /// segment. Only the first window is prefixed with the inter-sentence
    /// gap; subsequent windows are recorded as zero-gap sentences so they
    /// stay adjacent in `source`.
    fn wrap(
        &self,
        sentence: &str,
        tokens: &[u32],
        ranges: &[ByteRange],
        prefix: &str,
        source: &mut AnnotatedText,
        segments: &mut Vec<Segment>,
    ) {
        let mut offset = 0usize;
        let mut first = true;
        while offset < tokens.len() {
            let end = (offset + self.max_length_break).min(tokens.len());

            let mut segment: Segment = tokens[offset..end].to_vec();
            segment.push(self.tokenizer.eos_id());
            segments.push(segment);

            let window_tokens: Vec<&str> = ranges[offset..end]
                .iter()
                .map(|r| &sentence[r.begin..r.end])
                .collect();
            let window_prefix = if first { prefix } else { "" };
            source.append_sentence(window_prefix, window_tokens);

            first = false;
            offset = end;
        }
    }
}

fn offset_of(haystack: &str, needle: &str) -> usize {
    (needle.as_ptr() as usize) - (haystack.as_ptr() as usize)
}
