use crate::domain::traits::{SentenceSplitter, SplitMode};

/// A sentence splitter grounded on simple heuristics rather than a true
/// moses-style sentence-boundary model: splits on sentence-ending
/// punctuation followed by whitespace for `WrappedText`, on newlines for
/// `OneSentencePerLine`, and on blank lines for `OneParagraphPerLine`. The
/// real splitter state machine is out of scope for this crate (see
/// `SentenceSplitter`); this stands in as the default, production-usable
/// collaborator.
pub struct HeuristicSplitter;

impl SentenceSplitter for HeuristicSplitter {
    fn sentences<'a>(&self, text: &'a str, mode: SplitMode) -> Vec<&'a str> {
        match mode {
            SplitMode::OneSentencePerLine => split_lines(text),
            SplitMode::OneParagraphPerLine => split_paragraphs(text),
            SplitMode::WrappedText => split_on_terminators(text),
        }
    }
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n')
        .map(|line| line.trim_end_matches(['\n', '\r']))
        .filter(|line| !line.trim().is_empty())
        .collect()
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'\n' && i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
            let candidate = text[start..i].trim();
            if !candidate.is_empty() {
                out.push(candidate);
            }
            start = i + 2;
            i += 2;
        } else {
            i += 1;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn split_on_terminators(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'.' || c == b'!' || c == b'?' {
            let mut end = i + 1;
            while end < bytes.len() && (bytes[end] as char).is_whitespace() {
                end += 1;
            }
            if end > i + 1 || end == bytes.len() {
                let candidate = text[start..i + 1].trim();
                if !candidate.is_empty() {
                    out.push(&text[start..i + 1]);
                }
                start = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }
    let tail = &text[start..];
    if !tail.trim().is_empty() {
        out.push(tail.trim_end());
    }
    out
}

/// Deterministic splitter used in tests: every line that is not blank is one
/// sentence.
pub struct LineSplitter;

impl SentenceSplitter for LineSplitter {
    fn sentences<'a>(&self, text: &'a str, _mode: SplitMode) -> Vec<&'a str> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        vec![text.trim_end_matches(['\n', '\r'])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_text_splits_on_sentence_terminators() {
        let splitter = HeuristicSplitter;
        let sentences = splitter.sentences("A. B.\n", SplitMode::WrappedText);
        assert_eq!(sentences, vec!["A.", "B."]);
    }

    #[test]
    fn empty_input_has_no_sentences() {
        let splitter = HeuristicSplitter;
        assert!(splitter.sentences("   ", SplitMode::WrappedText).is_empty());
        assert!(splitter.sentences("", SplitMode::OneSentencePerLine).is_empty());
    }

    #[test]
    fn paragraph_mode_splits_on_blank_lines() {
        let splitter = HeuristicSplitter;
        let paragraphs = splitter.sentences("first\n\nsecond", SplitMode::OneParagraphPerLine);
        assert_eq!(paragraphs, vec!["first", "second"]);
    }
}
