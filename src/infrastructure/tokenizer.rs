use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::domain::annotation::ByteRange;
use crate::domain::request::TokenId;
use crate::domain::traits::Tokenizer;

pub const EOS_ID: TokenId = u32::MAX;

/// Loads a Hugging Face `tokenizers` vocabulary off the hub and exposes it
/// through the byte-range-preserving `Tokenizer` contract.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    eos_id: TokenId,
}

impl HfTokenizer {
    pub fn from_file(path: &std::path::Path, eos_id: TokenId) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| anyhow!("failed to load tokenizer: {e}"))?;
        Ok(Self { inner, eos_id })
    }

    /// Downloads `tokenizer.json` off the hub, the same
    /// `hf_hub::api::sync::Api` pattern `CandleMarianBackend::load` uses for
    /// its weights, so model and vocabulary come from the same repo/revision.
    pub fn from_hub(repo: &str, revision: &str, eos_id: TokenId) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new()?;
        let repo = api.repo(hf_hub::Repo::with_revision(
            repo.to_string(),
            hf_hub::RepoType::Model,
            revision.to_string(),
        ));
        let tokenizer_file = repo.get("tokenizer.json")?;
        Self::from_file(&tokenizer_file, eos_id)
    }
}

impl Tokenizer for HfTokenizer {
    fn encode_with_byte_ranges(&self, s: &str, add_eos: bool) -> (Vec<TokenId>, Vec<ByteRange>) {
        let encoding = match self.inner.encode(s, false) {
            Ok(e) => e,
            Err(_) => return (Vec::new(), Vec::new()),
        };

        let mut ids: Vec<TokenId> = encoding.get_ids().to_vec();
        let mut ranges: Vec<ByteRange> = encoding
            .get_offsets()
            .iter()
            .map(|&(begin, end)| ByteRange::new(begin, end))
            .collect();

        if add_eos {
            ids.push(self.eos_id);
            let end = s.len();
            ranges.push(ByteRange::new(end, end));
        }

        (ids, ranges)
    }

    fn decode_with_byte_ranges(&self, ids: &[TokenId]) -> (String, Vec<ByteRange>) {
        let filtered: Vec<u32> = ids.iter().copied().filter(|&id| id != self.eos_id).collect();
        let pieces: Vec<String> = filtered
            .iter()
            .map(|&id| self.inner.id_to_token(id).unwrap_or_default())
            .collect();

        let mut text = String::new();
        let mut ranges = Vec::with_capacity(pieces.len());
        for (i, piece) in pieces.iter().enumerate() {
            let rendered = self.inner.decode(&[filtered[i]], true).unwrap_or_else(|_| piece.clone());
            let begin = text.len();
            text.push_str(&rendered);
            ranges.push(ByteRange::new(begin, text.len()));
        }

        (text, ranges)
    }

    fn eos_id(&self) -> TokenId {
        self.eos_id
    }
}

/// A deterministic, dependency-free tokenizer used by tests and as a
/// fallback when no real vocabulary is configured: splits on whitespace and
/// interns each distinct word to a stable id.
pub struct WhitespaceTokenizer {
    forward: Mutex<HashMap<String, TokenId>>,
    backward: Mutex<HashMap<TokenId, String>>,
    next_id: AtomicU32,
}

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self {
            forward: Mutex::new(HashMap::new()),
            backward: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    fn intern(&self, word: &str) -> TokenId {
        if let Some(&id) = self.forward.lock().unwrap().get(word) {
            return id;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.forward.lock().unwrap().insert(word.to_string(), id);
        self.backward.lock().unwrap().insert(id, word.to_string());
        id
    }
}

impl Default for WhitespaceTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn encode_with_byte_ranges(&self, s: &str, add_eos: bool) -> (Vec<TokenId>, Vec<ByteRange>) {
        let mut ids = Vec::new();
        let mut ranges = Vec::new();

        let mut idx = 0usize;
        for word in s.split_whitespace() {
            let begin = s[idx..].find(word).map(|p| idx + p).unwrap_or(idx);
            let end = begin + word.len();
            idx = end;
            ids.push(self.intern(word));
            ranges.push(ByteRange::new(begin, end));
        }

        if add_eos {
            ids.push(EOS_ID);
            ranges.push(ByteRange::new(s.len(), s.len()));
        }

        (ids, ranges)
    }

    fn decode_with_byte_ranges(&self, ids: &[TokenId]) -> (String, Vec<ByteRange>) {
        let backward = self.backward.lock().unwrap();
        let mut text = String::new();
        let mut ranges = Vec::new();

        let mut first = true;
        for &id in ids {
            if id == EOS_ID {
                continue;
            }
            let word = backward.get(&id).cloned().unwrap_or_default();
            if !first {
                text.push(' ');
            }
            let begin = text.len();
            text.push_str(&word);
            ranges.push(ByteRange::new(begin, text.len()));
            first = false;
        }

        (text, ranges)
    }

    fn eos_id(&self) -> TokenId {
        EOS_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let tokenizer = WhitespaceTokenizer::new();
        let (ids, ranges) = tokenizer.encode_with_byte_ranges("hello world", true);
        assert_eq!(ids.len(), 3); // hello, world, eos
        assert_eq!(ranges[0], ByteRange::new(0, 5));
        assert_eq!(ranges[1], ByteRange::new(6, 11));

        let (decoded, _) = tokenizer.decode_with_byte_ranges(&ids);
        assert_eq!(decoded, "hello world");
    }

    #[test]
    fn same_word_interns_to_same_id() {
        let tokenizer = WhitespaceTokenizer::new();
        let (a, _) = tokenizer.encode_with_byte_ranges("cat dog cat", false);
        assert_eq!(a[0], a[2]);
        assert_ne!(a[0], a[1]);
    }
}
