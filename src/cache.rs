//! Bounded generation cache shared by every generator.
//!
//! Keys are canonical strings built from the generator name and its sorted
//! parameters, so two identical requests always collide. When an insert
//! pushes the cache past capacity, the entry with the oldest insertion tick
//! is evicted. Reads do not refresh an entry, so this is insertion-order
//! eviction, not LRU.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::biomes::BiomeGrid;
use crate::error::{ensure_positive, Result};
use crate::heightmap::HeightGrid;
use crate::structures::scatter::GeneratedStructure;
use crate::structures::types::GeneratedComplex;

/// Default number of entries kept before eviction
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

// =============================================================================
// CACHE KEYS
// =============================================================================

/// Canonical cache key: `generator:name=value:name=value` with names sorted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key for the given generator identity.
    pub fn builder(generator: &'static str) -> CacheKeyBuilder {
        CacheKeyBuilder { generator, params: BTreeMap::new() }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects parameters in any order; `build` sorts them by name.
pub struct CacheKeyBuilder {
    generator: &'static str,
    params: BTreeMap<&'static str, String>,
}

impl CacheKeyBuilder {
    pub fn param(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        self.params.insert(name, value.to_string());
        self
    }

    pub fn build(self) -> CacheKey {
        let mut key = String::from(self.generator);
        for (name, value) in &self.params {
            key.push(':');
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        CacheKey(key)
    }
}

// =============================================================================
// SHARED ARTIFACTS
// =============================================================================

/// Everything the generators store in the shared cache. Values are `Arc`s of
/// immutable results, so a reader never sees a half-built value.
#[derive(Clone, Debug)]
pub enum Artifact {
    Height(Arc<HeightGrid>),
    Biome(Arc<BiomeGrid>),
    Complex(Arc<GeneratedComplex>),
    Structures(Arc<Vec<GeneratedStructure>>),
}

impl Artifact {
    pub fn as_height(&self) -> Option<&Arc<HeightGrid>> {
        match self {
            Artifact::Height(grid) => Some(grid),
            _ => None,
        }
    }

    pub fn as_biome(&self) -> Option<&Arc<BiomeGrid>> {
        match self {
            Artifact::Biome(grid) => Some(grid),
            _ => None,
        }
    }

    pub fn as_complex(&self) -> Option<&Arc<GeneratedComplex>> {
        match self {
            Artifact::Complex(complex) => Some(complex),
            _ => None,
        }
    }

    pub fn as_structures(&self) -> Option<&Arc<Vec<GeneratedStructure>>> {
        match self {
            Artifact::Structures(list) => Some(list),
            _ => None,
        }
    }
}

// =============================================================================
// CACHE
// =============================================================================

/// A cached value with its insertion metadata
struct CacheEntry<V> {
    value: V,
    /// Logical insertion time; strictly increasing per cache
    inserted_tick: u64,
    inserted_at: Instant,
}

struct CacheState<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    next_tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Cache statistics for monitoring
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }

    /// Format as human-readable string
    pub fn summary(&self) -> String {
        format!(
            "Hits: {} | Misses: {} | Rate: {:.1}% | Entries: {}/{} | Evicted: {}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.size,
            self.capacity,
            self.evictions
        )
    }
}

/// Thread-safe bounded key/value store.
pub struct GenerationCache<V> {
    state: Mutex<CacheState<V>>,
    capacity: usize,
}

impl<V: Clone> GenerationCache<V> {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        ensure_positive("cache.max_entries", capacity)?;
        Ok(Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity.min(4096)),
                next_tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a value, counting the hit or miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut state = self.state.lock();
        match state.entries.get(key).map(|entry| entry.value.clone()) {
            Some(value) => {
                state.hits += 1;
                Some(value)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Insert a value. Returns the key that was evicted to make room, if any.
    pub fn put(&self, key: CacheKey, value: V) -> Option<CacheKey> {
        let mut state = self.state.lock();
        let tick = state.next_tick;
        state.next_tick += 1;

        let replacing = state.entries.contains_key(&key);
        state.entries.insert(key, CacheEntry { value, inserted_tick: tick, inserted_at: Instant::now() });

        if replacing || state.entries.len() <= self.capacity {
            return None;
        }

        let oldest = state
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_tick)
            .map(|(key, _)| key.clone())?;
        state.entries.remove(&oldest);
        state.evictions += 1;
        Some(oldest)
    }

    /// Return the cached value, or build and insert it.
    ///
    /// The lock is not held while `build` runs, so two threads racing on the
    /// same key may both build; generation is deterministic, so the second
    /// insert stores an identical value.
    pub fn get_or_insert_with<F>(&self, key: CacheKey, build: F) -> Result<(V, Option<CacheKey>)>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(&key) {
            return Ok((value, None));
        }
        let value = build()?;
        let evicted = self.put(key, value.clone());
        Ok((value, evicted))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Age of an entry since insertion.
    pub fn age_of(&self, key: &CacheKey) -> Option<std::time::Duration> {
        self.state.lock().entries.get(key).map(|entry| entry.inserted_at.elapsed())
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries. Counters are kept.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            size: state.entries.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> CacheKey {
        CacheKey::builder("test").param("i", i).build()
    }

    #[test]
    fn test_key_params_are_sorted() {
        let a = CacheKey::builder("height_map").param("size", 8).param("chunk_x", 0).param("chunk_y", 1).build();
        let b = CacheKey::builder("height_map").param("chunk_y", 1).param("chunk_x", 0).param("size", 8).build();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "height_map:chunk_x=0:chunk_y=1:size=8");
    }

    #[test]
    fn test_hits_and_misses_are_counted() {
        let cache = GenerationCache::with_capacity(4).unwrap();
        assert_eq!(cache.get(&key(1)), None);
        cache.put(key(1), 10u32);
        assert_eq!(cache.get(&key(1)), Some(10));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[test]
    fn test_overflow_evicts_exactly_the_oldest() {
        let capacity = 5;
        let cache = GenerationCache::with_capacity(capacity).unwrap();
        for i in 0..capacity {
            assert_eq!(cache.put(key(i), i), None);
        }
        // Reading the oldest entry must not save it
        assert_eq!(cache.get(&key(0)), Some(0));

        let evicted = cache.put(key(capacity), capacity);
        assert_eq!(evicted, Some(key(0)));
        assert_eq!(cache.len(), capacity);
        assert!(!cache.contains(&key(0)));
        assert!(cache.contains(&key(1)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let cache = GenerationCache::with_capacity(3).unwrap();
        for i in 0..50 {
            cache.put(key(i % 7), i);
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn test_replacing_a_key_does_not_evict() {
        let cache = GenerationCache::with_capacity(2).unwrap();
        cache.put(key(1), 1);
        cache.put(key(2), 2);
        assert_eq!(cache.put(key(1), 11), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(1)), Some(11));
        // key(2) is now the oldest insertion
        assert_eq!(cache.put(key(3), 3), Some(key(2)));
    }

    #[test]
    fn test_get_or_insert_with_builds_once() {
        let cache = GenerationCache::with_capacity(2).unwrap();
        let mut builds = 0;
        for _ in 0..3 {
            let (value, _) = cache
                .get_or_insert_with(key(9), || {
                    builds += 1;
                    Ok(99)
                })
                .unwrap();
            assert_eq!(value, 99);
        }
        assert_eq!(builds, 1);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(GenerationCache::<u8>::with_capacity(0).is_err());
    }
}
