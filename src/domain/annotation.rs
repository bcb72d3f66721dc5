use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A half-open `[begin, end)` span of byte offsets into some string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub begin: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

impl From<ByteRange> for Range<usize> {
    fn from(r: ByteRange) -> Self {
        r.begin..r.end
    }
}

/// Expresses sentence and token boundary information as ranges of bytes,
/// without owning the underlying string.
///
/// Text is divided into gaps (whitespace between sentences) and sentences:
/// `gap sentence gap sentence gap`. There is always one more gap than there
/// are sentences, since gaps bookend the text.
///
/// The text is an unbroken sequence of tokens: the end of one token is the
/// beginning of the next. A gap is exactly one token holding whatever
/// whitespace separates sentences; a sentence is a sequence of tokens. Both
/// gaps and sentences may be empty ranges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Annotation {
    /// token i occupies `[token_begin[i], token_begin[i+1])`. Padded with a
    /// trailing sentinel so these indices are always valid.
    token_begin: Vec<usize>,
    /// Indices into `token_begin` marking the gap tokens. `gap.len() ==
    /// num_sentences() + 1`.
    gap: Vec<usize>,
}

impl Annotation {
    pub fn new() -> Self {
        Self {
            token_begin: vec![0, 0],
            gap: vec![0],
        }
    }

    pub fn num_sentences(&self) -> usize {
        self.gap.len() - 1
    }

    pub fn num_words(&self, sentence_idx: usize) -> usize {
        self.gap[sentence_idx + 1] - self.gap[sentence_idx] - 1
    }

    pub fn word(&self, sentence_idx: usize, word_idx: usize) -> ByteRange {
        let token_idx = self.gap[sentence_idx] + 1 + word_idx;
        ByteRange::new(self.token_begin[token_idx], self.token_begin[token_idx + 1])
    }

    pub fn sentence(&self, sentence_idx: usize) -> ByteRange {
        ByteRange::new(
            self.token_begin[self.gap[sentence_idx] + 1],
            self.token_begin[self.gap[sentence_idx + 1]],
        )
    }

    pub fn gap(&self, gap_idx: usize) -> ByteRange {
        let token_idx = self.gap[gap_idx];
        ByteRange::new(self.token_begin[token_idx], self.token_begin[token_idx + 1])
    }
}

/// Owns a string along with the `Annotation` describing its sentence/token
/// structure. The text and its annotation move around together as a unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotatedText {
    pub text: String,
    pub annotation: Annotation,
}

impl AnnotatedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing string, treating all of it as one leading gap
    /// that `record_existing_sentence` will subsequently break up.
    pub fn from_string(text: String) -> Self {
        let len = text.len();
        let mut annotation = Annotation::new();
        *annotation.token_begin.last_mut().unwrap() = len;
        Self { text, annotation }
    }

    /// Appends a sentence built from `prefix` (the gap before it) and a
    /// sequence of contiguous token slices. The slices are expected to be
    /// adjacent substrings that get concatenated onto `text` in order.
    pub fn append_sentence<'a, I>(&mut self, prefix: &str, tokens: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        debug_assert_eq!(*self.annotation.token_begin.last().unwrap(), self.text.len());

        self.append_ending_whitespace(prefix);

        let mut offset = self.text.len();
        let mut count = 0usize;
        for token in tokens {
            self.text.push_str(token);
            offset += token.len();
            self.annotation.token_begin.push(offset);
            count += 1;
        }
        let _ = count;
        debug_assert_eq!(offset, self.text.len());

        self.annotation.gap.push(self.annotation.token_begin.len() - 1);
        self.annotation.token_begin.push(offset);
    }

    /// Appends the whitespace trailing the final sentence (or, for an empty
    /// text, the entirety of it).
    pub fn append_ending_whitespace(&mut self, whitespace: &str) {
        self.text.push_str(whitespace);
        *self.annotation.token_begin.last_mut().unwrap() = self.text.len();
    }

    /// Records a sentence already present in `text` as `[token_begin, ...)`
    /// byte ranges, given the contiguous token ranges and the byte offset at
    /// which the sentence begins (needed since the sentence may be empty).
    pub fn record_existing_sentence(&mut self, token_ranges: &[ByteRange], sentence_begin: usize) {
        debug_assert!(!self.annotation.token_begin.is_empty());
        debug_assert_eq!(*self.annotation.token_begin.last().unwrap(), self.text.len());
        self.annotation.token_begin.pop();

        for range in token_ranges {
            self.annotation.token_begin.push(range.begin);
        }

        self.annotation.gap.push(self.annotation.token_begin.len());
        if let Some(last) = token_ranges.last() {
            self.annotation.token_begin.push(last.end);
        } else {
            self.annotation.token_begin.push(sentence_begin);
        }
        self.annotation.token_begin.push(self.text.len());
    }

    pub fn num_sentences(&self) -> usize {
        self.annotation.num_sentences()
    }

    pub fn num_words(&self, sentence_idx: usize) -> usize {
        self.annotation.num_words(sentence_idx)
    }

    pub fn word(&self, sentence_idx: usize, word_idx: usize) -> &str {
        self.as_str(self.annotation.word(sentence_idx, word_idx))
    }

    pub fn sentence(&self, sentence_idx: usize) -> &str {
        self.as_str(self.annotation.sentence(sentence_idx))
    }

    pub fn gap(&self, gap_idx: usize) -> &str {
        self.as_str(self.annotation.gap(gap_idx))
    }

    pub fn word_as_byte_range(&self, sentence_idx: usize, word_idx: usize) -> ByteRange {
        self.annotation.word(sentence_idx, word_idx)
    }

    pub fn sentence_as_byte_range(&self, sentence_idx: usize) -> ByteRange {
        self.annotation.sentence(sentence_idx)
    }

    /// Calls `fun(byte_range, text, is_ending_whitespace)` on every word in
    /// order, including each inter-sentence gap, building a brand new
    /// `AnnotatedText` out of the (possibly transformed) pieces `fun`
    /// returns.
    pub fn apply<F>(&self, mut fun: F) -> AnnotatedText
    where
        F: FnMut(ByteRange, &str, bool) -> String,
    {
        let mut out = AnnotatedText::new();

        for sentence_idx in 0..self.num_sentences() {
            let prefix = fun(self.annotation.gap(sentence_idx), self.gap(sentence_idx), false);

            let mut sentence = String::new();
            let mut tokens: Vec<ByteRange> = Vec::with_capacity(self.num_words(sentence_idx));
            for word_idx in 0..self.num_words(sentence_idx) {
                let token = fun(
                    self.word_as_byte_range(sentence_idx, word_idx),
                    self.word(sentence_idx, word_idx),
                    false,
                );
                let begin = sentence.len();
                sentence.push_str(&token);
                tokens.push(ByteRange::new(begin, sentence.len()));
            }

            let views: Vec<&str> = tokens.iter().map(|r| &sentence[r.begin..r.end]).collect();
            out.append_sentence(&prefix, views);
        }

        let trailing = fun(
            self.annotation.gap(self.num_sentences()),
            self.gap(self.num_sentences()),
            true,
        );
        out.append_ending_whitespace(&trailing);

        out
    }

    fn as_str(&self, range: ByteRange) -> &str {
        &self.text[range.begin..range.end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_a_single_empty_gap() {
        let text = AnnotatedText::new();
        assert_eq!(text.num_sentences(), 0);
        assert_eq!(text.gap(0), "");
    }

    #[test]
    fn append_sentence_tracks_gap_and_tokens() {
        let mut text = AnnotatedText::new();
        text.append_sentence("", vec!["hi", " ", "there"]);
        text.append_ending_whitespace("\n");

        assert_eq!(text.num_sentences(), 1);
        assert_eq!(text.num_words(0), 3);
        assert_eq!(text.sentence(0), "hi there");
        assert_eq!(text.word(0, 0), "hi");
        assert_eq!(text.word(0, 2), "there");
        assert_eq!(text.gap(1), "\n");
        assert_eq!(text.text, "hi there\n");
    }

    #[test]
    fn record_existing_sentence_matches_append_sentence() {
        let mut built = AnnotatedText::from_string("  hi there  ".to_string());
        let sentence_begin = 2;
        let ranges = vec![ByteRange::new(2, 4), ByteRange::new(4, 5), ByteRange::new(5, 10)];
        built.record_existing_sentence(&ranges, sentence_begin);
        built.append_ending_whitespace("");

        assert_eq!(built.num_sentences(), 1);
        assert_eq!(built.sentence(0), "hi there");
        assert_eq!(built.gap(0), "  ");
        assert_eq!(built.gap(1), "  ");
    }

    #[test]
    fn apply_rebuilds_text_from_transformed_pieces() {
        let mut text = AnnotatedText::new();
        text.append_sentence("", vec!["hi", " ", "there"]);
        text.append_ending_whitespace("");

        let upper = text.apply(|_range, piece, _is_end| piece.to_uppercase());
        assert_eq!(upper.sentence(0), "HI THERE");
    }

    #[test]
    fn multiple_sentences_preserve_gaps() {
        let mut text = AnnotatedText::new();
        text.append_sentence("", vec!["A"]);
        text.append_sentence(" ", vec!["B"]);
        text.append_ending_whitespace("\n");

        assert_eq!(text.num_sentences(), 2);
        assert_eq!(text.gap(0), "");
        assert_eq!(text.gap(1), " ");
        assert_eq!(text.gap(2), "\n");
        assert_eq!(text.text, "A B\n");
    }
}
