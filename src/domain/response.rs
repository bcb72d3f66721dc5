use serde::{Deserialize, Serialize};

use super::annotation::{AnnotatedText, ByteRange};
use super::request::TokenId;

/// A target-length × source-length soft alignment matrix, row-stochastic,
/// stored flat rather than as nested vectors so it can be handed across the
/// cache/wire boundary without per-row allocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlatMatrix {
    pub values: Vec<f32>,
    pub rows: usize,
    pub cols: usize,
}

impl FlatMatrix {
    pub fn new(values: Vec<f32>, rows: usize, cols: usize) -> Self {
        debug_assert_eq!(values.len(), rows * cols);
        Self { values, rows, cols }
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.values[r * self.cols..(r + 1) * self.cols]
    }
}

/// A single point in a hard (thresholded) alignment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AlignmentPoint {
    pub src: usize,
    pub tgt: usize,
    pub prob: f32,
}

/// Output of the inference collaborator for one sentence: target tokens,
/// per-word log-probabilities, a soft alignment matrix, and the overall
/// sequence score. This is the unit stored in the translation cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerSentenceArtifact {
    pub target_tokens: Vec<TokenId>,
    pub word_scores: Vec<f32>,
    pub alignment: FlatMatrix,
    pub sentence_score: f32,
}

impl PerSentenceArtifact {
    /// Serializes to `[words | soft_alignment | sentence_score | word_scores]`,
    /// each vector length-prefixed with a little-endian `u64`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_u32_vec(&mut buf, &self.target_tokens);
        write_f32_vec(&mut buf, &self.alignment.values);
        buf.extend_from_slice(&(self.alignment.rows as u64).to_le_bytes());
        buf.extend_from_slice(&(self.alignment.cols as u64).to_le_bytes());
        buf.extend_from_slice(&self.sentence_score.to_le_bytes());
        write_f32_vec(&mut buf, &self.word_scores);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut cursor = 0usize;
        let target_tokens = read_u32_vec(bytes, &mut cursor)?;
        let values = read_f32_vec(bytes, &mut cursor)?;
        let rows = read_u64(bytes, &mut cursor)? as usize;
        let cols = read_u64(bytes, &mut cursor)? as usize;
        if values.len() != rows * cols {
            return None;
        }
        let sentence_score = read_f32(bytes, &mut cursor)?;
        let word_scores = read_f32_vec(bytes, &mut cursor)?;
        Some(Self {
            target_tokens,
            word_scores,
            alignment: FlatMatrix { values, rows, cols },
            sentence_score,
        })
    }
}

fn write_u32_vec(buf: &mut Vec<u8>, v: &[u32]) {
    buf.extend_from_slice(&(v.len() as u64).to_le_bytes());
    for x in v {
        buf.extend_from_slice(&x.to_le_bytes());
    }
}

fn write_f32_vec(buf: &mut Vec<u8>, v: &[f32]) {
    buf.extend_from_slice(&(v.len() as u64).to_le_bytes());
    for x in v {
        buf.extend_from_slice(&x.to_le_bytes());
    }
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> Option<u64> {
    let slice = bytes.get(*cursor..*cursor + 8)?;
    *cursor += 8;
    Some(u64::from_le_bytes(slice.try_into().ok()?))
}

fn read_f32(bytes: &[u8], cursor: &mut usize) -> Option<f32> {
    let slice = bytes.get(*cursor..*cursor + 4)?;
    *cursor += 4;
    Some(f32::from_le_bytes(slice.try_into().ok()?))
}

fn read_u32_vec(bytes: &[u8], cursor: &mut usize) -> Option<Vec<u32>> {
    let len = read_u64(bytes, cursor)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        let slice = bytes.get(*cursor..*cursor + 4)?;
        *cursor += 4;
        out.push(u32::from_le_bytes(slice.try_into().ok()?));
    }
    Some(out)
}

fn read_f32_vec(bytes: &[u8], cursor: &mut usize) -> Option<Vec<f32>> {
    let len = read_u64(bytes, cursor)? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_f32(bytes, cursor)?);
    }
    Some(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcatStrategy {
    Faithful,
    Space,
}

impl Default for ConcatStrategy {
    fn default() -> Self {
        ConcatStrategy::Faithful
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseOptions {
    pub quality_scores: bool,
    pub alignment: bool,
    pub alignment_threshold: f32,
    pub html: bool,
    pub sentence_mappings: bool,
    pub concat_strategy: ConcatStrategy,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            quality_scores: false,
            alignment: false,
            alignment_threshold: 0.2,
            html: false,
            sentence_mappings: false,
            concat_strategy: ConcatStrategy::Faithful,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceQuality {
    pub sequence_score: f32,
    pub word_scores: Vec<f32>,
    pub word_byte_ranges: Vec<ByteRange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub source: AnnotatedText,
    pub target: AnnotatedText,
    pub alignments: Vec<Vec<AlignmentPoint>>,
    pub qualities: Vec<SentenceQuality>,
}

impl Response {
    pub fn num_sentences(&self) -> usize {
        self.source.num_sentences()
    }
}
