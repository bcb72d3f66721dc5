use std::sync::Arc;

use crate::domain::annotation::AnnotatedText;
use crate::domain::request::Request;
use crate::domain::response::{AlignmentPoint, ConcatStrategy, PerSentenceArtifact, Response, SentenceQuality};

/// Assembles the final `Response` once every segment of `request` has its
/// `PerSentenceArtifact`. Decoding, concatenation, alignment thresholding
/// and quality-score attachment happen here rather than as a long-lived
/// object because `Request` already carries everything needed (options,
/// source text, target vocab) — there is no separate object to keep alive
/// between request creation and completion.
pub fn build(request: &Arc<Request>, artifacts: Vec<PerSentenceArtifact>) -> Response {
    let options = request.options();
    let source = request.source();
    let tokenizer = request.target_tokenizer();

    let mut target = AnnotatedText::new();
    let mut alignments = Vec::new();
    let mut qualities = Vec::new();

    for (sentence_idx, artifact) in artifacts.iter().enumerate() {
        let (decoded, word_ranges) = tokenizer.decode_with_byte_ranges(&artifact.target_tokens);
        let words: Vec<&str> = word_ranges.iter().map(|r| &decoded[r.begin..r.end]).collect();

        match options.concat_strategy {
            // Reproduce the source's inter-sentence whitespace byte-for-byte,
            // including the trailing gap after the last sentence.
            ConcatStrategy::Faithful => {
                let prefix = source.gap(sentence_idx);
                target.append_sentence(prefix, words);
                if sentence_idx + 1 == artifacts.len() {
                    target.append_ending_whitespace(source.gap(sentence_idx + 1));
                }
            }
            ConcatStrategy::Space => {
                let prefix = if sentence_idx == 0 { "" } else { " " };
                target.append_sentence(prefix, words);
                if sentence_idx + 1 == artifacts.len() {
                    target.append_ending_whitespace("");
                }
            }
        }

        if options.quality_scores {
            qualities.push(SentenceQuality {
                sequence_score: artifact.sentence_score,
                word_scores: artifact.word_scores.clone(),
                word_byte_ranges: word_ranges,
            });
        }

        if options.alignment {
            alignments.push(hard_alignment(&artifact.alignment, options.alignment_threshold));
        }
    }

    if artifacts.is_empty() {
        target.append_ending_whitespace("");
    }

    Response {
        source: source.clone(),
        target,
        alignments,
        qualities,
    }
}

/// Thresholds a row-stochastic soft-alignment matrix into discrete
/// `(src, tgt, prob)` points, ported from
/// `data::ConvertSoftAlignToHardAlign`: every cell at or above `threshold`
/// survives, plus (when none do) the row's single highest-probability cell,
/// so every target token keeps at least one aligned source token.
fn hard_alignment(matrix: &crate::domain::response::FlatMatrix, threshold: f32) -> Vec<AlignmentPoint> {
    let mut points = Vec::new();
    for t in 0..matrix.rows {
        let row = matrix.row(t);
        let mut kept = false;
        for (s, &prob) in row.iter().enumerate() {
            if prob >= threshold {
                points.push(AlignmentPoint { src: s, tgt: t, prob });
                kept = true;
            }
        }
        if !kept && !row.is_empty() {
            let (best_s, &best_prob) = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .unwrap();
            points.push(AlignmentPoint {
                src: best_s,
                tgt: t,
                prob: best_prob,
            });
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::response::{FlatMatrix, ResponseOptions};
    use crate::infrastructure::tokenizer::WhitespaceTokenizer;

    fn request_with(
        source_text: &str,
        segments: Vec<Vec<u32>>,
        options: ResponseOptions,
        tokenizer: Arc<WhitespaceTokenizer>,
    ) -> Arc<Request> {
        let mut source = AnnotatedText::new();
        let mut cursor = 0usize;
        for (i, _) in segments.iter().enumerate() {
            let word = source_text.split_whitespace().nth(i).unwrap();
            let begin = source_text[cursor..].find(word).unwrap() + cursor;
            cursor = begin + word.len();
            let prefix = " ".repeat(if i == 0 { 0 } else { 1 });
            source.append_sentence(&prefix, vec![word]);
        }
        source.append_ending_whitespace(&source_text[cursor..]);

        Request::new(1, source, segments, options, tokenizer, Box::new(|_response| {}))
    }

    #[test]
    fn faithful_concatenation_preserves_trailing_whitespace() {
        let tokenizer = Arc::new(WhitespaceTokenizer::new());
        let (ids_a, _) = tokenizer.encode_with_byte_ranges("A", false);
        let (ids_b, _) = tokenizer.encode_with_byte_ranges("B", false);

        let options = ResponseOptions {
            concat_strategy: ConcatStrategy::Faithful,
            ..Default::default()
        };
        let request = request_with("A. B.\n", vec![ids_a.clone(), ids_b.clone()], options, tokenizer);

        let artifacts = vec![
            PerSentenceArtifact {
                target_tokens: ids_a,
                ..Default::default()
            },
            PerSentenceArtifact {
                target_tokens: ids_b,
                ..Default::default()
            },
        ];

        let response = build(&request, artifacts);
        assert!(response.target.text.ends_with('\n'));
        assert_eq!(response.num_sentences(), 2);
    }

    #[test]
    fn alignment_keeps_best_cell_when_none_clear_threshold() {
        let matrix = FlatMatrix::new(vec![0.1, 0.05], 1, 2);
        let points = hard_alignment(&matrix, 0.5);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].src, 0);
    }

    #[test]
    fn alignment_keeps_every_cell_above_threshold() {
        let matrix = FlatMatrix::new(vec![0.9, 0.6, 0.1], 1, 3);
        let points = hard_alignment(&matrix, 0.5);
        assert_eq!(points.len(), 2);
    }
}
