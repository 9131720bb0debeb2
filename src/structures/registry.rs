//! Result table for generated complexes
//!
//! Layouts are shared immutably; exploration state lives in an overlay next
//! to each layout so collaborators can mark progress without cloning it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::{ComplexId, GeneratedComplex, RegionId};
use crate::cache::CacheKey;

/// Mutable exploration state of one complex.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexOverlay {
    pub explored: BTreeSet<RegionId>,
    pub cleared: BTreeSet<RegionId>,
}

#[derive(Clone, Debug)]
struct Entry {
    complex: Arc<GeneratedComplex>,
    overlay: ComplexOverlay,
}

/// Registry of complexes produced by one generator, one per request key
#[derive(Clone, Debug, Default)]
pub struct ComplexRegistry {
    entries: BTreeMap<ComplexId, Entry>,
    by_key: BTreeMap<CacheKey, ComplexId>,
}

impl ComplexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `complex` under `key` unless the key is already taken.
    /// Returns the registered complex and whether it was newly added.
    pub fn add(&mut self, key: CacheKey, complex: Arc<GeneratedComplex>) -> (Arc<GeneratedComplex>, bool) {
        if let Some(existing) = self.find(&key) {
            return (existing, false);
        }
        self.by_key.insert(key, complex.id);
        self.entries.insert(complex.id, Entry { complex: complex.clone(), overlay: ComplexOverlay::default() });
        (complex, true)
    }

    pub fn find(&self, key: &CacheKey) -> Option<Arc<GeneratedComplex>> {
        self.by_key.get(key).and_then(|id| self.get(*id))
    }

    pub fn get(&self, id: ComplexId) -> Option<Arc<GeneratedComplex>> {
        self.entries.get(&id).map(|e| e.complex.clone())
    }

    pub fn overlay(&self, id: ComplexId) -> Option<&ComplexOverlay> {
        self.entries.get(&id).map(|e| &e.overlay)
    }

    /// Returns false if the complex or region is unknown.
    pub fn mark_explored(&mut self, id: ComplexId, region: RegionId) -> bool {
        self.update(id, region, |overlay| {
            overlay.explored.insert(region);
        })
    }

    /// Clearing a region also marks it explored.
    pub fn mark_cleared(&mut self, id: ComplexId, region: RegionId) -> bool {
        self.update(id, region, |overlay| {
            overlay.explored.insert(region);
            overlay.cleared.insert(region);
        })
    }

    fn update(&mut self, id: ComplexId, region: RegionId, f: impl FnOnce(&mut ComplexOverlay)) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.complex.regions.contains_key(&region) => {
                f(&mut entry.overlay);
                true
            }
            _ => false,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = ComplexId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_key.clear();
    }
}
