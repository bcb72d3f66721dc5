use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, RwLock};

use crate::domain::request::Segment;
use crate::domain::response::PerSentenceArtifact;

/// `{hits, misses, evicted_records, active_records, total_size}`, so the two
/// cache implementations below can be compared apples-to-apples through one
/// stats struct.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evicted_records: u64,
    pub active_records: u64,
    pub total_size: u64,
}

/// Capability set shared by both cache implementations, so either can be
/// swapped in at a call site behind a trait object.
pub trait SentenceCache: Send + Sync {
    fn fetch(&self, key: &Segment) -> Option<PerSentenceArtifact>;
    fn insert(&self, key: &Segment, value: &PerSentenceArtifact);
    fn stats(&self) -> CacheStats;
}

fn hash_segment(key: &Segment) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Lock-free-ish clock/replace cache: `N` slots, one record per
/// `hash(key) mod N`, no chaining. A `RwLock<Option<_>>` per slot gives each
/// slot its own short-lived lock rather than a single global one; on
/// collision the existing record is simply overwritten, with no probing.
pub struct ShardedCache {
    slots: Vec<RwLock<Option<(Segment, Vec<u8>)>>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    evicted: std::sync::atomic::AtomicU64,
}

impl ShardedCache {
    pub fn new(shards: usize) -> Self {
        Self {
            slots: (0..shards.max(1)).map(|_| RwLock::new(None)).collect(),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
            evicted: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn slot_for(&self, key: &Segment) -> usize {
        (hash_segment(key) as usize) % self.slots.len()
    }
}

impl SentenceCache for ShardedCache {
    fn fetch(&self, key: &Segment) -> Option<PerSentenceArtifact> {
        let slot = self.slots[self.slot_for(key)].read().unwrap();
        match slot.as_ref() {
            Some((stored_key, bytes)) if stored_key == key => {
                match PerSentenceArtifact::from_bytes(bytes) {
                    Some(artifact) => {
                        self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        Some(artifact)
                    }
                    // Corrupt serialized bytes: treated as a miss, never
                    // surfaced as an error.
                    None => {
                        self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        None
                    }
                }
            }
            _ => {
                self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                None
            }
        }
    }

    fn insert(&self, key: &Segment, value: &PerSentenceArtifact) {
        let index = self.slot_for(key);
        let mut slot = self.slots[index].write().unwrap();
        if slot.is_some() {
            self.evicted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        *slot = Some((key.clone(), value.to_bytes()));
    }

    fn stats(&self) -> CacheStats {
        let active = self
            .slots
            .iter()
            .filter(|s| s.read().unwrap().is_some())
            .count() as u64;
        CacheStats {
            hits: self.hits.load(std::sync::atomic::Ordering::Relaxed),
            misses: self.misses.load(std::sync::atomic::Ordering::Relaxed),
            evicted_records: self.evicted.load(std::sync::atomic::Ordering::Relaxed),
            active_records: active,
            total_size: self
                .slots
                .iter()
                .filter_map(|s| s.read().unwrap().as_ref().map(|(_, v)| v.len() as u64))
                .sum(),
        }
    }
}

struct LruEntry {
    value: Vec<u8>,
    prev: Option<Segment>,
    next: Option<Segment>,
}

/// Size-bounded LRU, single-threaded only: its correct deployment is behind
/// a single service-side dispatcher. A doubly-linked list keyed by the
/// segment itself (rather than raw pointers, which Rust's ownership model
/// does not allow without unsafe) tracks recency; eviction walks from the
/// head until the new entry fits under `size_limit_bytes`.
pub struct LruCache {
    inner: Mutex<LruInner>,
    size_limit_bytes: usize,
}

struct LruInner {
    entries: HashMap<Segment, LruEntry>,
    head: Option<Segment>,
    tail: Option<Segment>,
    total_size: usize,
    hits: u64,
    misses: u64,
    evicted: u64,
}

impl LruCache {
    pub fn new(size_limit_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                entries: HashMap::new(),
                head: None,
                tail: None,
                total_size: 0,
                hits: 0,
                misses: 0,
                evicted: 0,
            }),
            size_limit_bytes,
        }
    }

    fn detach(inner: &mut LruInner, key: &Segment) {
        let (prev, next) = {
            let entry = inner.entries.get(key).expect("key present");
            (entry.prev.clone(), entry.next.clone())
        };
        match &prev {
            Some(p) => inner.entries.get_mut(p).unwrap().next = next.clone(),
            None => inner.head = next.clone(),
        }
        match &next {
            Some(n) => inner.entries.get_mut(n).unwrap().prev = prev.clone(),
            None => inner.tail = prev.clone(),
        }
    }

    fn push_tail(inner: &mut LruInner, key: Segment) {
        let old_tail = inner.tail.clone();
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.prev = old_tail.clone();
            entry.next = None;
        }
        if let Some(t) = &old_tail {
            inner.entries.get_mut(t).unwrap().next = Some(key.clone());
        } else {
            inner.head = Some(key.clone());
        }
        inner.tail = Some(key);
    }

    fn touch(inner: &mut LruInner, key: &Segment) {
        if inner.tail.as_ref() == Some(key) {
            return;
        }
        Self::detach(inner, key);
        Self::push_tail(inner, key.clone());
    }
}

impl SentenceCache for LruCache {
    fn fetch(&self, key: &Segment) -> Option<PerSentenceArtifact> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.entries.contains_key(key) {
            inner.misses += 1;
            return None;
        }
        let bytes = inner.entries.get(key).unwrap().value.clone();
        match PerSentenceArtifact::from_bytes(&bytes) {
            Some(artifact) => {
                inner.hits += 1;
                Self::touch(&mut inner, key);
                Some(artifact)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    fn insert(&self, key: &Segment, value: &PerSentenceArtifact) {
        let bytes = value.to_bytes();
        let new_size = bytes.len();
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner.entries.get(key) {
            inner.total_size -= existing.value.len();
            Self::detach(&mut inner, key);
        }

        while inner.total_size + new_size > self.size_limit_bytes {
            let Some(head) = inner.head.clone() else { break };
            let removed = inner.entries.remove(&head).expect("head entry present");
            inner.total_size -= removed.value.len();
            inner.head = removed.next.clone();
            match &inner.head {
                Some(h) => inner.entries.get_mut(h).unwrap().prev = None,
                None => inner.tail = None,
            }
            inner.evicted += 1;
        }

        inner.entries.insert(
            key.clone(),
            LruEntry {
                value: bytes,
                prev: None,
                next: None,
            },
        );
        inner.total_size += new_size;
        Self::push_tail(&mut inner, key.clone());
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evicted_records: inner.evicted,
            active_records: inner.entries.len() as u64,
            total_size: inner.total_size as u64,
        }
    }
}

/// Fan-in point used by `TranslationModel`/`AsyncService`: several named
/// models may each own their own cache, or (more commonly) share one process-
/// wide cache whose stats are reported through `AsyncService::cache_stats`.
pub fn build_cache(settings: &crate::infrastructure::config::CacheSettings) -> Arc<dyn SentenceCache> {
    match settings.kind {
        crate::infrastructure::config::CacheKind::Sharded => Arc::new(ShardedCache::new(settings.shards)),
        crate::infrastructure::config::CacheKind::Lru => Arc::new(LruCache::new(settings.size_limit_bytes)),
    }
}
