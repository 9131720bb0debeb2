//! Standalone structures scattered over world chunks
//!
//! Each chunk gets its own ChaCha stream, so chunks can be scattered in any
//! order or in parallel. Spacing holds across chunk borders: a chunk yields to
//! the sites of neighbours that precede it in row order, which it recomputes
//! from their streams.

use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::loot::{LootContainer, LootRoll, RarityBias};
use super::types::LootId;
use crate::cache::{Artifact, CacheKey, GenerationCache};
use crate::error::{ensure_unit, GenerationError, Result};
use crate::events::{GenerationEvent, GenerationObserver};
use crate::heightmap::{validate_chunk_size, ChunkCoord};
use crate::seeds::hash_words;

/// Furthest neighbour ring consulted for spacing.
const MAX_SPACING_RINGS: i64 = 8;

// =============================================================================
// TEMPLATES
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StructureKind {
    Ruins,
    City,
    Dungeon,
    Tower,
    Temple,
}

impl StructureKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            StructureKind::Ruins => "ruins",
            StructureKind::City => "abandoned city",
            StructureKind::Dungeon => "dungeon",
            StructureKind::Tower => "tower",
            StructureKind::Temple => "temple",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StructureTemplate {
    pub id: &'static str,
    pub kind: StructureKind,
    pub levels: (u32, u32),
    /// Relative pick weight when a slot fires
    pub spawn_chance: f64,
    pub loot_tables: &'static [&'static str],
    /// Enemy kinds with roster weights
    pub enemies: &'static [(&'static str, u32)],
    pub traps: &'static [&'static str],
    pub boss: Option<&'static str>,
}

pub static TEMPLATES: [StructureTemplate; 5] = [
    StructureTemplate {
        id: "ancient_ruins",
        kind: StructureKind::Ruins,
        levels: (5, 30),
        spawn_chance: 0.15,
        loot_tables: &["ancient_relics", "magical_items"],
        enemies: &[("ancient_guardian", 1), ("corrupted_spirit", 2)],
        traps: &["poison_dart", "falling_ceiling"],
        boss: None,
    },
    StructureTemplate {
        id: "abandoned_city",
        kind: StructureKind::City,
        levels: (20, 80),
        spawn_chance: 0.05,
        loot_tables: &["city_treasures", "historical_artifacts"],
        enemies: &[("city_scavenger", 3), ("fallen_noble", 1)],
        traps: &["explosive_barrel", "electrified_floor"],
        boss: Some("usurper_king"),
    },
    StructureTemplate {
        id: "underground_dungeon",
        kind: StructureKind::Dungeon,
        levels: (10, 50),
        spawn_chance: 0.12,
        loot_tables: &["dungeon_loot", "dark_artifacts"],
        enemies: &[("undead_warrior", 2), ("shadow_creature", 1)],
        traps: &["spike_pit", "poison_gas"],
        boss: Some("dungeon_lord"),
    },
    StructureTemplate {
        id: "mage_tower",
        kind: StructureKind::Tower,
        levels: (25, 60),
        spawn_chance: 0.08,
        loot_tables: &["magical_tomes", "enchanted_items"],
        enemies: &[("rogue_mage", 2), ("magical_construct", 1)],
        traps: &["magical_barrier", "teleport_trap"],
        boss: Some("archmage"),
    },
    StructureTemplate {
        id: "ancient_temple",
        kind: StructureKind::Temple,
        levels: (15, 70),
        spawn_chance: 0.06,
        loot_tables: &["divine_relics", "sacred_items"],
        enemies: &[("temple_guardian", 2), ("corrupted_priest", 1)],
        traps: &["holy_fire", "curse_trap"],
        boss: None,
    },
];

pub fn template(id: &str) -> Option<&'static StructureTemplate> {
    TEMPLATES.iter().find(|t| t.id == id)
}

// =============================================================================
// SETTINGS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureSettings {
    /// Candidate slots per square cell of chunk area
    pub spawn_density: f32,
    /// Minimum planar distance between any two structures
    pub min_distance: f64,
    /// Chance that a candidate slot produces a structure
    pub slot_chance: f32,
}

impl Default for StructureSettings {
    fn default() -> Self {
        Self { spawn_density: 0.01, min_distance: 100.0, slot_chance: 0.3 }
    }
}

impl StructureSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_unit("structures.spawn_density", self.spawn_density)?;
        ensure_unit("structures.slot_chance", self.slot_chance)?;
        if !(self.min_distance >= 0.0 && self.min_distance.is_finite()) {
            return Err(GenerationError::invalid(
                "structures.min_distance",
                format!("{} is not a finite non-negative distance", self.min_distance),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// STRUCTURES
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureId(pub u64);

impl std::fmt::Display for StructureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{:016x}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedStructure {
    pub id: StructureId,
    pub template_id: String,
    pub kind: StructureKind,
    pub chunk: ChunkCoord,
    /// World-space position
    pub position: (f64, f64),
    pub rotation: f64,
    pub scale: f64,
    pub level: u32,
    pub loot: Vec<LootContainer>,
    pub enemies: Vec<String>,
    pub traps: Vec<String>,
    pub boss: Option<String>,
}

impl GeneratedStructure {
    pub fn distance_to(&self, point: (f64, f64)) -> f64 {
        distance(self.position, point)
    }
}

/// Discovery state of one structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureOverlay {
    pub discovered: bool,
    pub explored: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureGenerationStats {
    pub chunks_scattered: u64,
    pub structures_generated: u64,
    pub candidates_rejected: u64,
    pub loot_containers: u64,
    pub by_template: BTreeMap<String, u64>,
}

// =============================================================================
// GENERATOR
// =============================================================================

pub struct StructureGenerator {
    settings: StructureSettings,
    weights: WeightedIndex<f64>,
    cache: Arc<GenerationCache<Artifact>>,
    observer: Arc<dyn GenerationObserver>,
    table: RwLock<BTreeMap<StructureId, (GeneratedStructure, StructureOverlay)>>,
    stats: Mutex<StructureGenerationStats>,
}

impl StructureGenerator {
    pub fn new(
        settings: StructureSettings,
        cache: Arc<GenerationCache<Artifact>>,
        observer: Arc<dyn GenerationObserver>,
    ) -> Result<Self> {
        settings.validate()?;
        let weights = WeightedIndex::new(TEMPLATES.iter().map(|t| t.spawn_chance))
            .map_err(|e| GenerationError::invalid("structures.templates", e.to_string()))?;
        Ok(Self {
            settings,
            weights,
            cache,
            observer,
            table: RwLock::new(BTreeMap::new()),
            stats: Mutex::new(StructureGenerationStats::default()),
        })
    }

    pub fn settings(&self) -> &StructureSettings {
        &self.settings
    }

    pub fn cache_key(&self, chunk: ChunkCoord, chunk_size: usize, world_seed: u64) -> CacheKey {
        CacheKey::builder("structures")
            .param("chunk_x", chunk.x)
            .param("chunk_y", chunk.y)
            .param("size", chunk_size)
            .param("seed", world_seed)
            .param("density", self.settings.spawn_density)
            .param("min_distance", self.settings.min_distance)
            .param("slot_chance", self.settings.slot_chance)
            .build()
    }

    /// Structures of one chunk, cached and registered for lookup.
    pub fn generate_for_chunk(
        &self,
        chunk: ChunkCoord,
        chunk_size: usize,
        world_seed: u64,
    ) -> Result<Arc<Vec<GeneratedStructure>>> {
        validate_chunk_size(chunk_size)?;
        let key = self.cache_key(chunk, chunk_size, world_seed);
        let (artifact, evicted) = self.cache.get_or_insert_with(key, || {
            let structures = Arc::new(self.scatter(chunk, chunk_size, world_seed)?);
            let mut table = self.table.write();
            for s in structures.iter() {
                table.entry(s.id).or_insert_with(|| (s.clone(), StructureOverlay::default()));
            }
            Ok(Artifact::Structures(structures))
        })?;
        if let Some(key) = evicted {
            self.observer.on_event(&GenerationEvent::CacheEvicted { key });
        }
        match artifact {
            Artifact::Structures(structures) => Ok(structures),
            _ => Err(GenerationError::invalid("cache", "structure key holds a different artifact")),
        }
    }

    /// Roll the structures of one chunk without caching them.
    ///
    /// A candidate is dropped when it lies within `min_distance` of a site
    /// accepted earlier in the same chunk, or of any site of a chunk that
    /// precedes this one in row order. Every pair of structures in the world
    /// therefore keeps its spacing, whichever order chunks are requested in.
    pub fn scatter(&self, chunk: ChunkCoord, chunk_size: usize, world_seed: u64) -> Result<Vec<GeneratedStructure>> {
        validate_chunk_size(chunk_size)?;
        let rings = spacing_rings(self.settings.min_distance, chunk_size)?;
        let (sites, mut rejected) = self.candidate_sites(chunk, chunk_size, world_seed);

        let earlier: Vec<(f64, f64)> = preceding_neighbours(chunk, rings)
            .flat_map(|n| self.candidate_sites(n, chunk_size, world_seed).0)
            .map(|site| site.position)
            .collect();

        let mut accepted = Vec::with_capacity(sites.len());
        for site in sites {
            if earlier.iter().any(|&p| distance(p, site.position) < self.settings.min_distance) {
                rejected += 1;
                continue;
            }
            let id = StructureId(hash_words(
                world_seed,
                &[chunk.x as i64 as u64, chunk.y as i64 as u64, site.slot as u64],
            ));
            let mut rng = ChaCha8Rng::seed_from_u64(id.0);
            accepted.push(roll_structure(id, &TEMPLATES[site.template], chunk, site.position, &mut rng));
        }

        self.record(&accepted, rejected);
        debug!(%chunk, rings, accepted = accepted.len(), rejected, "scattered structures");
        self.observer.on_event(&GenerationEvent::StructuresScattered {
            chunk,
            accepted: accepted.len(),
            rejected,
        });
        Ok(accepted)
    }

    /// Positions and templates of one chunk, spaced within the chunk only.
    fn candidate_sites(&self, chunk: ChunkCoord, chunk_size: usize, world_seed: u64) -> (Vec<Site>, usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(hash_words(
            world_seed,
            &[chunk.x as i64 as u64, chunk.y as i64 as u64, chunk_size as u64],
        ));
        let slots = (chunk_size as f64 * chunk_size as f64 * self.settings.spawn_density as f64) as usize;
        let origin = (chunk.x as f64 * chunk_size as f64, chunk.y as f64 * chunk_size as f64);

        let mut sites: Vec<Site> = Vec::new();
        let mut rejected = 0;
        for slot in 0..slots {
            if !rng.gen_bool(self.settings.slot_chance as f64) {
                continue;
            }
            let template = self.weights.sample(&mut rng);
            let position = (
                origin.0 + rng.gen_range(0.0..chunk_size as f64),
                origin.1 + rng.gen_range(0.0..chunk_size as f64),
            );
            if sites.iter().any(|s| distance(s.position, position) < self.settings.min_distance) {
                rejected += 1;
                continue;
            }
            sites.push(Site { slot, template, position });
        }
        (sites, rejected)
    }

    fn record(&self, accepted: &[GeneratedStructure], rejected: usize) {
        let mut stats = self.stats.lock();
        stats.chunks_scattered += 1;
        stats.structures_generated += accepted.len() as u64;
        stats.candidates_rejected += rejected as u64;
        for s in accepted {
            stats.loot_containers += s.loot.len() as u64;
            *stats.by_template.entry(s.template_id.clone()).or_default() += 1;
        }
    }

    pub fn get_structure(&self, id: StructureId) -> Option<GeneratedStructure> {
        self.table.read().get(&id).map(|(s, _)| s.clone())
    }

    pub fn overlay(&self, id: StructureId) -> Option<StructureOverlay> {
        self.table.read().get(&id).map(|(_, o)| *o)
    }

    /// Returns false for unknown ids.
    pub fn discover(&self, id: StructureId) -> bool {
        match self.table.write().get_mut(&id) {
            Some((_, overlay)) => {
                overlay.discovered = true;
                true
            }
            None => false,
        }
    }

    /// Exploring a structure also discovers it.
    pub fn explore(&self, id: StructureId) -> bool {
        match self.table.write().get_mut(&id) {
            Some((_, overlay)) => {
                overlay.discovered = true;
                overlay.explored = true;
                true
            }
            None => false,
        }
    }

    /// Registered structures within `radius` of `center`, nearest first.
    pub fn structures_in_area(&self, center: (f64, f64), radius: f64) -> Vec<GeneratedStructure> {
        let mut found: Vec<GeneratedStructure> = self
            .table
            .read()
            .values()
            .filter(|(s, _)| s.distance_to(center) <= radius)
            .map(|(s, _)| s.clone())
            .collect();
        found.sort_by(|a, b| a.distance_to(center).total_cmp(&b.distance_to(center)));
        found
    }

    pub fn registered(&self) -> usize {
        self.table.read().len()
    }

    pub fn stats(&self) -> StructureGenerationStats {
        self.stats.lock().clone()
    }

    pub fn clear(&self) {
        self.table.write().clear();
    }
}

struct Site {
    slot: usize,
    template: usize,
    position: (f64, f64),
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (a.0 - b.0, a.1 - b.1);
    (dx * dx + dy * dy).sqrt()
}

/// Chunk rings that can hold a site closer than `min_distance`.
fn spacing_rings(min_distance: f64, chunk_size: usize) -> Result<i64> {
    let rings = (min_distance / chunk_size as f64).ceil() as i64;
    if rings > MAX_SPACING_RINGS {
        return Err(GenerationError::invalid(
            "structures.min_distance",
            format!("{min_distance} spans {rings} chunks of size {chunk_size}, at most {MAX_SPACING_RINGS} allowed"),
        ));
    }
    Ok(rings)
}

/// Chunks within `rings` of `chunk` that come before it in row order.
fn preceding_neighbours(chunk: ChunkCoord, rings: i64) -> impl Iterator<Item = ChunkCoord> {
    (-rings..=rings)
        .flat_map(move |dy| (-rings..=rings).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| (dy, dx) < (0, 0))
        .filter_map(move |(dx, dy)| {
            let x = i32::try_from(chunk.x as i64 + dx).ok()?;
            let y = i32::try_from(chunk.y as i64 + dy).ok()?;
            Some(ChunkCoord::new(x, y))
        })
}

fn roll_structure<R: Rng>(
    id: StructureId,
    template: &StructureTemplate,
    chunk: ChunkCoord,
    position: (f64, f64),
    rng: &mut R,
) -> GeneratedStructure {
    let level = rng.gen_range(template.levels.0..=template.levels.1);

    let containers = rng.gen_range(2..=8u32);
    let loot = (0..containers)
        .map(|i| {
            let roll = LootRoll {
                level,
                bias: RarityBias::Standard,
                signature_items: &[],
                tables: template.loot_tables,
                trap_chance: 0.2,
            };
            LootContainer::roll(LootId(i), format!("chest {}", i + 1), roll, &mut *rng)
        })
        .collect();

    let mut enemies = Vec::new();
    if let Ok(roster) = WeightedIndex::new(template.enemies.iter().map(|(_, w)| *w)) {
        for _ in 0..rng.gen_range(1..=6) {
            enemies.push(template.enemies[roster.sample(rng)].0.to_string());
        }
    }
    let traps = template.traps.iter().filter(|_| rng.gen_bool(0.3)).map(|t| t.to_string()).collect();

    GeneratedStructure {
        id,
        template_id: template.id.to_string(),
        kind: template.kind,
        chunk,
        position,
        rotation: rng.gen_range(0.0..TAU),
        scale: rng.gen_range(0.8..=1.2),
        level,
        loot,
        enemies,
        traps,
        boss: template.boss.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightmap::MAX_CHUNK_SIZE;
    use crate::events::{ChannelObserver, NullObserver};

    fn generator(settings: StructureSettings) -> StructureGenerator {
        let cache = Arc::new(GenerationCache::with_capacity(16).unwrap());
        StructureGenerator::new(settings, cache, Arc::new(NullObserver)).unwrap()
    }

    #[test]
    fn test_zero_density_is_empty() {
        let gen = generator(StructureSettings { spawn_density: 0.0, ..Default::default() });
        let structures = gen.generate_for_chunk(ChunkCoord::new(3, -2), 512, 42).unwrap();
        assert!(structures.is_empty());
        assert_eq!(gen.stats().chunks_scattered, 1);
    }

    #[test]
    fn test_min_distance_respected() {
        let gen = generator(StructureSettings { spawn_density: 0.01, min_distance: 100.0, slot_chance: 0.3 });
        let structures = gen.scatter(ChunkCoord::new(0, 0), 1000, 7).unwrap();
        assert!(structures.len() > 1);
        for (i, a) in structures.iter().enumerate() {
            for b in &structures[i + 1..] {
                assert!(a.distance_to(b.position) >= 100.0);
            }
        }
        assert!(gen.stats().candidates_rejected > 0);
    }

    #[test]
    fn test_spacing_holds_across_chunk_borders() {
        let gen = generator(StructureSettings { spawn_density: 0.01, min_distance: 100.0, slot_chance: 0.3 });
        let mut all = Vec::new();
        for y in -1..=1 {
            for x in -1..=1 {
                all.extend(gen.scatter(ChunkCoord::new(x, y), 200, 7).unwrap());
            }
        }
        assert!(all.len() > 9);
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(a.distance_to(b.position) >= 100.0, "{} and {} too close", a.id, b.id);
            }
        }
    }

    #[test]
    fn test_chunk_order_does_not_change_results() {
        let gen = generator(StructureSettings::default());
        let forward: Vec<_> = (0..3).map(|x| gen.scatter(ChunkCoord::new(x, 0), 300, 5).unwrap()).collect();
        let backward: Vec<_> = (0..3).rev().map(|x| gen.scatter(ChunkCoord::new(x, 0), 300, 5).unwrap()).collect();
        assert_eq!(forward[0], backward[2]);
        assert_eq!(forward[2], backward[0]);
    }

    #[test]
    fn test_chunk_size_and_reach_limits() {
        let gen = generator(StructureSettings::default());
        assert!(gen.generate_for_chunk(ChunkCoord::new(0, 0), MAX_CHUNK_SIZE + 1, 1).is_err());
        assert!(gen.scatter(ChunkCoord::new(0, 0), 10, 1).is_err());
        assert!(gen.scatter(ChunkCoord::new(0, 0), 20, 1).is_ok());
    }

    #[test]
    fn test_rolls_follow_templates() {
        let gen = generator(StructureSettings { min_distance: 0.0, ..Default::default() });
        let structures = gen.scatter(ChunkCoord::new(1, 1), 400, 99).unwrap();
        assert!(!structures.is_empty());
        for s in &structures {
            let t = template(&s.template_id).unwrap();
            assert!((t.levels.0..=t.levels.1).contains(&s.level));
            assert!((2..=8).contains(&s.loot.len()));
            assert!((1..=6).contains(&s.enemies.len()));
            assert!(s.enemies.iter().all(|e| t.enemies.iter().any(|(name, _)| name == e)));
            assert_eq!(s.boss.is_some(), t.boss.is_some());
            assert!((400.0..800.0).contains(&s.position.0));
            assert!((400.0..800.0).contains(&s.position.1));
            assert!((0.8..=1.2).contains(&s.scale));
        }
    }

    #[test]
    fn test_scatter_is_deterministic_per_chunk() {
        let gen = generator(StructureSettings::default());
        let a = gen.scatter(ChunkCoord::new(5, 5), 600, 1).unwrap();
        let b = gen.scatter(ChunkCoord::new(5, 5), 600, 1).unwrap();
        assert_eq!(a, b);
        let c = gen.scatter(ChunkCoord::new(5, 6), 600, 1).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_discover_explore_and_area_query() {
        let (observer, rx) = ChannelObserver::bounded(4);
        let cache = Arc::new(GenerationCache::with_capacity(4).unwrap());
        let gen = StructureGenerator::new(StructureSettings::default(), cache, Arc::new(observer)).unwrap();
        let structures = gen.generate_for_chunk(ChunkCoord::new(0, 0), 800, 3).unwrap();
        assert!(!structures.is_empty());
        assert!(rx.try_iter().any(|e| matches!(e, GenerationEvent::StructuresScattered { .. })));

        let first = &structures[0];
        assert!(!gen.overlay(first.id).unwrap().discovered);
        assert!(gen.explore(first.id));
        let overlay = gen.overlay(first.id).unwrap();
        assert!(overlay.discovered && overlay.explored);
        assert!(!gen.discover(StructureId(0)));

        let nearby = gen.structures_in_area(first.position, 1.0);
        assert_eq!(nearby.first().map(|s| s.id), Some(first.id));
        assert_eq!(gen.structures_in_area((0.0, 0.0), 1e9).len(), gen.registered());
    }

    #[test]
    fn test_cached_chunk_is_shared() {
        let gen = generator(StructureSettings::default());
        let a = gen.generate_for_chunk(ChunkCoord::new(2, 0), 600, 11).unwrap();
        let b = gen.generate_for_chunk(ChunkCoord::new(2, 0), 600, 11).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(gen.stats().chunks_scattered, 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let cache = Arc::new(GenerationCache::with_capacity(4).unwrap());
        let bad = StructureSettings { min_distance: -1.0, ..Default::default() };
        assert!(StructureGenerator::new(bad, cache.clone(), Arc::new(NullObserver)).is_err());
        let gen = generator(StructureSettings::default());
        assert!(gen.generate_for_chunk(ChunkCoord::new(0, 0), 0, 1).is_err());
    }
}
