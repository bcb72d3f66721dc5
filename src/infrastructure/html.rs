use regex::Regex;

use crate::domain::response::Response;
use crate::domain::traits::{HtmlProcessor, ReinsertionRecord, TagInsertion};

/// Tag-stripping `HtmlProcessor`, deliberately simplified: no nesting
/// resolution, no attribute-aware reflow, just "find every `<...>` run,
/// remember its plain-text offset, cut it out." This crate does not
/// understand markup semantics; it only calls `strip` before
/// translation and `restore` after, via `AnnotatedText::apply`.
pub struct RegexHtmlProcessor {
    tag_pattern: Regex,
}

impl RegexHtmlProcessor {
    pub fn new() -> Self {
        Self {
            tag_pattern: Regex::new(r"</?[a-zA-Z][^<>]*>").unwrap(),
        }
    }
}

impl Default for RegexHtmlProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlProcessor for RegexHtmlProcessor {
    fn strip(&self, text: &str) -> (String, ReinsertionRecord) {
        let mut plain = String::with_capacity(text.len());
        let mut insertions = Vec::new();
        let mut cursor = 0usize;

        for m in self.tag_pattern.find_iter(text) {
            plain.push_str(&text[cursor..m.start()]);
            insertions.push(TagInsertion {
                plain_text_offset: plain.len(),
                tag: m.as_str().to_string(),
            });
            cursor = m.end();
        }
        plain.push_str(&text[cursor..]);

        (plain, ReinsertionRecord { insertions })
    }

    /// Reinserts tags into both `source` and `target` via `apply`: each tag
    /// was recorded at a plain-text byte offset, so it is spliced back in at
    /// the start of whichever gap or word range contains that offset. Tags
    /// recorded past the end of the plain text (trailing closing tags) land
    /// in the final trailing gap.
    fn restore(&self, response: &mut Response, record: &ReinsertionRecord) {
        response.source = reinsert(&response.source, record);
        response.target = reinsert(&response.target, record);
    }
}

fn reinsert(text: &crate::domain::annotation::AnnotatedText, record: &ReinsertionRecord) -> crate::domain::annotation::AnnotatedText {
    if record.insertions.is_empty() {
        return text.clone();
    }
    text.apply(|range, piece, is_trailing_gap| {
        let mut out = String::new();
        for insertion in &record.insertions {
            let lands_here = insertion.plain_text_offset == range.begin
                || (is_trailing_gap && insertion.plain_text_offset >= range.begin);
            if lands_here {
                out.push_str(&insertion.tag);
            }
        }
        out.push_str(piece);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_removes_tags_and_records_offsets() {
        let processor = RegexHtmlProcessor::new();
        let (plain, record) = processor.strip("<b>hello</b> world");
        assert_eq!(plain, "hello world");
        assert_eq!(record.insertions.len(), 2);
        assert_eq!(record.insertions[0].plain_text_offset, 0);
        assert_eq!(record.insertions[0].tag, "<b>");
        assert_eq!(record.insertions[1].plain_text_offset, 5);
        assert_eq!(record.insertions[1].tag, "</b>");
    }

    #[test]
    fn strip_passes_through_plain_text_unchanged() {
        let processor = RegexHtmlProcessor::new();
        let (plain, record) = processor.strip("no markup here");
        assert_eq!(plain, "no markup here");
        assert!(record.insertions.is_empty());
    }
}
