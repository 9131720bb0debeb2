//! World generation facade
//!
//! [`WorldGenEngine`] owns the shared cache, the observer and one instance of
//! every generator. All methods take `&self`, so one engine can be shared
//! across threads behind an `Arc`.

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::biomes::BiomeGrid;
use crate::cache::{Artifact, CacheStats, GenerationCache};
use crate::config::EngineConfig;
use crate::error::{ConfigError, Result};
use crate::events::{GenerationObserver, LogObserver};
use crate::heightmap::{ChunkCoord, HeightGrid, HeightMapGenerator, HeightMapStats};
use crate::seeds::GenerationSeeds;
use crate::structures::dungeon::DungeonGenerationStats;
use crate::structures::scatter::{StructureGenerationStats, StructureOverlay};
use crate::structures::settlement::SettlementGenerationStats;
use crate::structures::{
    ComplexId, ComplexOverlay, DungeonGenerator, DungeonSettings, DungeonTheme, GeneratedComplex,
    GeneratedStructure, RegionId, SettlementGenerator, SettlementSettings, SettlementTier, SpatialPlacementPlanner,
    StructureGenerator, StructureId,
};

/// Counters from every generator plus the shared cache.
#[derive(Clone, Debug, Serialize)]
pub struct EngineStats {
    pub cache: CacheStats,
    pub terrain: HeightMapStats,
    pub dungeons: DungeonGenerationStats,
    pub settlements: SettlementGenerationStats,
    pub structures: StructureGenerationStats,
}

impl EngineStats {
    pub fn summary(&self) -> String {
        format!(
            "{}\nterrain: {} height maps, {} biome maps, {} restored\n\
             dungeons: {} ({} rooms, {} corridors)\n\
             settlements: {} ({} buildings, {} roads)\n\
             structures: {} over {} chunks",
            self.cache.summary(),
            self.terrain.height_maps_generated,
            self.terrain.biome_maps_generated,
            self.terrain.restored,
            self.dungeons.dungeons_generated,
            self.dungeons.rooms_created,
            self.dungeons.corridors_created,
            self.settlements.settlements_generated,
            self.settlements.buildings_created,
            self.settlements.roads_created,
            self.structures.structures_generated,
            self.structures.chunks_scattered,
        )
    }
}

pub struct WorldGenEngine {
    config: EngineConfig,
    seeds: GenerationSeeds,
    cache: Arc<GenerationCache<Artifact>>,
    terrain: HeightMapGenerator,
    dungeons: DungeonGenerator,
    settlements: SettlementGenerator,
    structures: StructureGenerator,
}

impl WorldGenEngine {
    /// Engine that reports events through `tracing`.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_observer(config, Arc::new(LogObserver))
    }

    pub fn with_observer(config: EngineConfig, observer: Arc<dyn GenerationObserver>) -> Result<Self, ConfigError> {
        config.validate()?;
        let seeds = GenerationSeeds::from_master(config.seed);
        let cache = Arc::new(GenerationCache::with_capacity(config.cache_capacity)?);
        let planner = SpatialPlacementPlanner::new(config.max_placement_attempts)?;

        let terrain = HeightMapGenerator::new(
            seeds,
            config.height_map.clone(),
            config.biomes.clone(),
            config.erosion_settings(),
            cache.clone(),
            observer.clone(),
        )?;
        let dungeons = DungeonGenerator::new(seeds.dungeons, planner, cache.clone(), observer.clone());
        let settlements = SettlementGenerator::new(seeds.settlements, planner, cache.clone(), observer.clone());
        let structures = StructureGenerator::new(config.structures.clone(), cache.clone(), observer)?;

        info!(
            seed = config.seed,
            quality = %config.quality,
            cache_capacity = config.cache_capacity,
            "world generation engine ready"
        );
        Ok(Self { config, seeds, cache, terrain, dungeons, settlements, structures })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn seeds(&self) -> &GenerationSeeds {
        &self.seeds
    }

    pub fn terrain(&self) -> &HeightMapGenerator {
        &self.terrain
    }

    // =========================================================================
    // TERRAIN
    // =========================================================================

    pub fn generate_height_map(&self, chunk_x: i32, chunk_y: i32, size: usize) -> Result<Arc<HeightGrid>> {
        self.terrain.generate_height_map(ChunkCoord::new(chunk_x, chunk_y), size)
    }

    pub fn generate_biome_map(&self, heights: &HeightGrid, chunk_x: i32, chunk_y: i32) -> Result<Arc<BiomeGrid>> {
        self.terrain.generate_biome_map(heights, ChunkCoord::new(chunk_x, chunk_y))
    }

    /// Decode a stored grid; anything unreadable is regenerated instead.
    pub fn restore_height_map(&self, chunk_x: i32, chunk_y: i32, size: usize, json: &str) -> Result<Arc<HeightGrid>> {
        self.terrain.restore_height_map(ChunkCoord::new(chunk_x, chunk_y), size, json)
    }

    /// Generate many chunks on the rayon pool. Output order matches `chunks`.
    pub fn generate_height_maps_parallel(&self, chunks: &[ChunkCoord], size: usize) -> Result<Vec<Arc<HeightGrid>>> {
        chunks
            .par_iter()
            .map(|chunk| self.terrain.generate_height_map(*chunk, size))
            .collect()
    }

    // =========================================================================
    // COMPLEXES
    // =========================================================================

    pub fn generate_dungeon(&self, theme: DungeonTheme, settings: &DungeonSettings) -> Result<Arc<GeneratedComplex>> {
        self.dungeons.generate(theme, settings)
    }

    pub fn generate_settlement(
        &self,
        tier: SettlementTier,
        settings: &SettlementSettings,
    ) -> Result<Arc<GeneratedComplex>> {
        self.settlements.generate(tier, settings)
    }

    pub fn get_dungeon(&self, id: ComplexId) -> Option<Arc<GeneratedComplex>> {
        self.dungeons.get_dungeon(id)
    }

    pub fn get_settlement(&self, id: ComplexId) -> Option<Arc<GeneratedComplex>> {
        self.settlements.get_settlement(id)
    }

    pub fn mark_room_explored(&self, dungeon: ComplexId, room: RegionId) -> bool {
        self.dungeons.mark_explored(dungeon, room)
    }

    pub fn mark_room_cleared(&self, dungeon: ComplexId, room: RegionId) -> bool {
        self.dungeons.mark_cleared(dungeon, room)
    }

    pub fn dungeon_overlay(&self, dungeon: ComplexId) -> Option<ComplexOverlay> {
        self.dungeons.overlay(dungeon)
    }

    pub fn mark_building_explored(&self, settlement: ComplexId, building: RegionId) -> bool {
        self.settlements.mark_explored(settlement, building)
    }

    pub fn settlement_overlay(&self, settlement: ComplexId) -> Option<ComplexOverlay> {
        self.settlements.overlay(settlement)
    }

    // =========================================================================
    // STRUCTURES
    // =========================================================================

    pub fn generate_structures_for_chunk(
        &self,
        chunk_x: i32,
        chunk_y: i32,
        chunk_size: usize,
        world_seed: u64,
    ) -> Result<Arc<Vec<GeneratedStructure>>> {
        self.structures.generate_for_chunk(ChunkCoord::new(chunk_x, chunk_y), chunk_size, world_seed)
    }

    pub fn get_structure(&self, id: StructureId) -> Option<GeneratedStructure> {
        self.structures.get_structure(id)
    }

    pub fn structure_overlay(&self, id: StructureId) -> Option<StructureOverlay> {
        self.structures.overlay(id)
    }

    pub fn discover_structure(&self, id: StructureId) -> bool {
        self.structures.discover(id)
    }

    pub fn explore_structure(&self, id: StructureId) -> bool {
        self.structures.explore(id)
    }

    pub fn structures_in_area(&self, center: (f64, f64), radius: f64) -> Vec<GeneratedStructure> {
        self.structures.structures_in_area(center, radius)
    }

    // =========================================================================
    // CACHE & STATS
    // =========================================================================

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached artifact. Result tables and overlays are kept.
    pub fn clear_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        info!(dropped, "generation cache cleared");
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cache: self.cache.stats(),
            terrain: self.terrain.stats(),
            dungeons: self.dungeons.stats(),
            settlements: self.settlements.stats(),
            structures: self.structures.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelObserver, GenerationEvent, NullObserver};
    use crate::structures::{BuildingType, RoomType, StructureSettings};

    fn engine(config: EngineConfig) -> WorldGenEngine {
        WorldGenEngine::with_observer(config, Arc::new(NullObserver)).unwrap()
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WorldGenEngine>();
    }

    #[test]
    fn test_height_map_is_deterministic() {
        let a = engine(EngineConfig::with_seed(42)).generate_height_map(0, 0, 8).unwrap();
        let b = engine(EngineConfig::with_seed(42)).generate_height_map(0, 0, 8).unwrap();
        assert_eq!(a.size, 8);
        assert_eq!(a.cells, b.cells);

        let c = engine(EngineConfig::with_seed(43)).generate_height_map(0, 0, 8).unwrap();
        assert_ne!(a.cells, c.cells);
    }

    #[test]
    fn test_cave_dungeon_scenario() {
        let engine = engine(EngineConfig::default());
        let settings = DungeonSettings { min_rooms: 5, max_rooms: 5, width: 40, height: 40, ..Default::default() };
        let dungeon = engine.generate_dungeon(DungeonTheme::Cave, &settings).unwrap();
        assert_eq!(dungeon.rooms_of(RoomType::Entrance).count(), 1);
        assert_eq!(dungeon.rooms_of(RoomType::Exit).count(), 1);
        assert!(dungeon.regions.len() <= 5);
        assert_eq!(dungeon.reachable().len(), dungeon.regions.len());
        assert!(dungeon.regions_disjoint());

        assert!(engine.get_dungeon(dungeon.id).is_some());
        assert!(engine.mark_room_explored(dungeon.id, dungeon.entrance));
        assert!(engine.dungeon_overlay(dungeon.id).unwrap().explored.contains(&dungeon.entrance));
    }

    #[test]
    fn test_village_scenario() {
        let engine = engine(EngineConfig::default());
        let settings = SettlementSettings { population: 100, ..Default::default() };
        let village = engine.generate_settlement(SettlementTier::Village, &settings).unwrap();
        let capacity: usize = village.buildings_of(BuildingType::House).map(|h| 4 * h.level as usize).sum();
        let housed: usize = village.buildings_of(BuildingType::House).map(|h| h.resident_count()).sum();
        assert_eq!(housed, 100.min(capacity));

        let stats = village.settlement_stats().unwrap();
        assert!((0.0..=5.0).contains(&stats.wealth));
        assert!(village.is_fully_connected());
        assert!(engine.get_settlement(village.id).is_some());
    }

    #[test]
    fn test_cache_evicts_oldest_at_capacity() {
        let (observer, rx) = ChannelObserver::bounded(64);
        let config = EngineConfig { cache_capacity: 3, ..Default::default() };
        let engine = WorldGenEngine::with_observer(config, Arc::new(observer)).unwrap();

        let first_key = engine.terrain().height_key(ChunkCoord::new(0, 0), 4);
        for x in 0..4 {
            engine.generate_height_map(x, 0, 4).unwrap();
        }
        let stats = engine.cache_stats();
        assert_eq!(stats.size, 3);
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.evictions, 1);

        let evicted: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                GenerationEvent::CacheEvicted { key } => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(evicted, vec![first_key]);
    }

    #[test]
    fn test_zero_density_yields_no_structures() {
        let config = EngineConfig {
            structures: StructureSettings { spawn_density: 0.0, ..Default::default() },
            ..Default::default()
        };
        let structures = engine(config).generate_structures_for_chunk(0, 0, 256, 42).unwrap();
        assert!(structures.is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let chunks: Vec<ChunkCoord> = (0..4).flat_map(|y| (0..4).map(move |x| ChunkCoord::new(x, y))).collect();
        let parallel = engine(EngineConfig::default()).generate_height_maps_parallel(&chunks, 16).unwrap();
        let sequential = engine(EngineConfig::default());
        for (chunk, grid) in chunks.iter().zip(&parallel) {
            let expected = sequential.generate_height_map(chunk.x, chunk.y, 16).unwrap();
            assert_eq!(grid.chunk, *chunk);
            assert_eq!(grid.cells, expected.cells);
        }
    }

    #[test]
    fn test_biome_map_matches_height_grid() {
        let engine = engine(EngineConfig::default());
        let heights = engine.generate_height_map(2, -1, 12).unwrap();
        let biomes = engine.generate_biome_map(&heights, 2, -1).unwrap();
        assert_eq!(biomes.size(), 12);
        assert_eq!(biomes.histogram().values().sum::<usize>(), 144);
    }

    #[test]
    fn test_restore_garbage_regenerates() {
        let engine = engine(EngineConfig::default());
        let restored = engine.restore_height_map(1, 1, 8, "not json").unwrap();
        let generated = engine.generate_height_map(1, 1, 8).unwrap();
        assert_eq!(restored.cells, generated.cells);
        assert_eq!(engine.stats().terrain.restore_failures, 1);
    }

    #[test]
    fn test_clear_cache_keeps_result_tables() {
        let engine = engine(EngineConfig::default());
        let dungeon = engine.generate_dungeon(DungeonTheme::Tower, &DungeonSettings::default()).unwrap();
        engine.generate_height_map(0, 0, 8).unwrap();
        assert!(engine.cache_stats().size >= 2);

        engine.clear_cache();
        assert_eq!(engine.cache_stats().size, 0);
        assert!(engine.get_dungeon(dungeon.id).is_some());
    }

    #[test]
    fn test_structure_overlay_through_engine() {
        let engine = engine(EngineConfig::default());
        let structures = engine.generate_structures_for_chunk(0, 0, 800, 5).unwrap();
        let first = structures.first().unwrap();
        assert!(engine.discover_structure(first.id));
        assert!(engine.structure_overlay(first.id).unwrap().discovered);
        assert!(!engine.structure_overlay(first.id).unwrap().explored);
        assert!(engine.get_structure(first.id).is_some());
        assert!(!engine.structures_in_area(first.position, 0.5).is_empty());
    }
}
