//! Settlement layouts
//!
//! A settlement is built in a fixed order: main road, optional fortifications,
//! buildings from the tier catalog (civic ones first), then the road network
//! that ties every building to the entrance.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::connectivity::{connect_cells, nearest_tagged, ConnectivityGraphBuilder, PathStyle};
use super::placement::SpatialPlacementPlanner;
use super::registry::{ComplexOverlay, ComplexRegistry};
use super::types::{
    BuildingType, CellTag, ComplexId, ComplexKind, Content, Endpoint, GeneratedComplex, OccupancyGrid, PathKind,
    Rect, Region, RegionId, RegionKind, ResidentId, RoadKind, SizeRange,
};
use crate::cache::{Artifact, CacheKey, GenerationCache};
use crate::error::{ensure_positive, ensure_unit, GenerationError, Result};
use crate::events::{ComplexKindTag, GenerationEvent, GenerationObserver};
use crate::seeds::hash_words;

pub const MAIN_ROAD_WIDTH: usize = 5;
pub const CIVIC_ROAD_WIDTH: usize = 3;
pub const SPUR_ROAD_WIDTH: usize = 2;
/// Distance of the wall ring from the grid edge.
pub const WALL_MARGIN: usize = 5;
/// Fortifications are raised above this defense level.
pub const FORTIFY_THRESHOLD: f32 = 0.7;
/// Residents per house level.
pub const RESIDENTS_PER_LEVEL: usize = 4;

const TOWER_SIZE: usize = 3;
const TOWER_LEVEL: u32 = 3;

// =============================================================================
// TIERS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SettlementTier {
    Hamlet,
    Village,
    Town,
    City,
    Capital,
}

impl SettlementTier {
    pub fn all() -> &'static [SettlementTier] {
        &[
            SettlementTier::Hamlet,
            SettlementTier::Village,
            SettlementTier::Town,
            SettlementTier::City,
            SettlementTier::Capital,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SettlementTier::Hamlet => "hamlet",
            SettlementTier::Village => "village",
            SettlementTier::Town => "town",
            SettlementTier::City => "city",
            SettlementTier::Capital => "capital",
        }
    }

    /// Building catalog, civic buildings first.
    pub fn catalog(&self) -> &'static [BuildingTemplate] {
        match self {
            SettlementTier::Hamlet => HAMLET_CATALOG,
            SettlementTier::Village => VILLAGE_CATALOG,
            SettlementTier::Town => TOWN_CATALOG,
            SettlementTier::City => CITY_CATALOG,
            SettlementTier::Capital => CAPITAL_CATALOG,
        }
    }
}

impl std::fmt::Display for SettlementTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SettlementTier {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        SettlementTier::all()
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            .ok_or_else(|| GenerationError::invalid("tier", format!("unknown settlement tier '{s}'")))
    }
}

/// How many of one building type a tier gets, and how big and developed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildingTemplate {
    pub kind: BuildingType,
    pub count: (usize, usize),
    pub size: SizeRange,
    pub levels: (u32, u32),
}

const fn bt(kind: BuildingType, count: (usize, usize), size: (usize, usize), levels: (u32, u32)) -> BuildingTemplate {
    BuildingTemplate { kind, count, size: SizeRange { min: size.0, max: size.1 }, levels }
}

const HAMLET_CATALOG: &[BuildingTemplate] = &[
    bt(BuildingType::House, (2, 4), (3, 5), (1, 2)),
    bt(BuildingType::Farm, (1, 2), (4, 6), (1, 2)),
    bt(BuildingType::Stable, (1, 1), (3, 4), (1, 1)),
];

const VILLAGE_CATALOG: &[BuildingTemplate] = &[
    bt(BuildingType::Temple, (1, 1), (4, 6), (1, 2)),
    bt(BuildingType::Tavern, (1, 1), (4, 5), (1, 2)),
    bt(BuildingType::House, (5, 12), (3, 6), (1, 3)),
    bt(BuildingType::Shop, (1, 2), (3, 4), (1, 2)),
    bt(BuildingType::Farm, (2, 4), (4, 7), (1, 2)),
];

const TOWN_CATALOG: &[BuildingTemplate] = &[
    bt(BuildingType::TownHall, (1, 1), (5, 7), (2, 3)),
    bt(BuildingType::Temple, (1, 2), (5, 7), (2, 3)),
    bt(BuildingType::Tavern, (2, 3), (4, 6), (1, 3)),
    bt(BuildingType::House, (15, 30), (4, 7), (1, 4)),
    bt(BuildingType::Shop, (3, 6), (3, 5), (1, 3)),
    bt(BuildingType::Blacksmith, (1, 2), (4, 5), (1, 3)),
    bt(BuildingType::Warehouse, (1, 2), (4, 6), (1, 2)),
    bt(BuildingType::Stable, (1, 2), (3, 5), (1, 2)),
];

const CITY_CATALOG: &[BuildingTemplate] = &[
    bt(BuildingType::TownHall, (1, 1), (6, 8), (3, 4)),
    bt(BuildingType::Temple, (2, 4), (6, 9), (2, 4)),
    bt(BuildingType::Tavern, (5, 10), (4, 7), (1, 4)),
    bt(BuildingType::House, (40, 80), (4, 8), (1, 5)),
    bt(BuildingType::Shop, (8, 15), (3, 6), (1, 4)),
    bt(BuildingType::Blacksmith, (3, 6), (4, 6), (1, 4)),
    bt(BuildingType::Warehouse, (3, 6), (5, 7), (1, 3)),
    bt(BuildingType::Stable, (2, 4), (4, 6), (1, 3)),
    bt(BuildingType::Library, (1, 2), (4, 6), (2, 3)),
    bt(BuildingType::Academy, (1, 1), (5, 7), (2, 3)),
    bt(BuildingType::Barracks, (1, 2), (5, 7), (2, 3)),
];

const CAPITAL_CATALOG: &[BuildingTemplate] = &[
    bt(BuildingType::TownHall, (1, 1), (8, 12), (4, 5)),
    bt(BuildingType::Temple, (3, 6), (7, 12), (3, 5)),
    bt(BuildingType::Tavern, (10, 20), (5, 8), (2, 5)),
    bt(BuildingType::House, (80, 150), (5, 10), (2, 6)),
    bt(BuildingType::Shop, (15, 25), (4, 7), (2, 5)),
    bt(BuildingType::Blacksmith, (6, 10), (5, 7), (2, 5)),
    bt(BuildingType::Warehouse, (5, 10), (6, 8), (2, 4)),
    bt(BuildingType::Stable, (3, 6), (5, 7), (2, 4)),
    bt(BuildingType::Library, (2, 3), (5, 7), (3, 4)),
    bt(BuildingType::Academy, (1, 2), (6, 8), (3, 4)),
    bt(BuildingType::Barracks, (2, 3), (6, 8), (3, 4)),
];

// =============================================================================
// SETTINGS & STATS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementSettings {
    pub width: usize,
    pub height: usize,
    pub population: u32,
    /// 0.0 = poor, 1.0 = rich. Picks road surfaces.
    pub wealth_level: f32,
    /// Walls, towers and gates are raised above 0.7
    pub defense_level: f32,
    pub trade_level: f32,
    pub seed: u64,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
            population: 100,
            wealth_level: 0.5,
            defense_level: 0.3,
            trade_level: 0.4,
            seed: 0,
        }
    }
}

impl SettlementSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("settlement.width", self.width)?;
        ensure_positive("settlement.height", self.height)?;
        ensure_unit("settlement.wealth_level", self.wealth_level)?;
        ensure_unit("settlement.defense_level", self.defense_level)?;
        ensure_unit("settlement.trade_level", self.trade_level)?;
        let min_fortified = 2 * WALL_MARGIN + TOWER_SIZE + 3;
        if self.fortified() && (self.width < min_fortified || self.height < min_fortified) {
            return Err(GenerationError::invalid(
                "settlement.defense_level",
                format!("a walled settlement needs at least {min_fortified}x{min_fortified} cells"),
            ));
        }
        Ok(())
    }

    pub fn fortified(&self) -> bool {
        self.defense_level > FORTIFY_THRESHOLD
    }
}

/// Derived figures of one settlement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementStats {
    pub population: u32,
    /// Mean of level x condition over all buildings
    pub wealth: f32,
    /// Share of towers and barracks
    pub defense: f32,
    /// Share of shops, warehouses and taverns
    pub trade: f32,
}

impl SettlementStats {
    fn compute(regions: &[Region]) -> Self {
        let total = regions.len().max(1) as f32;
        let share = |pred: fn(&BuildingType) -> bool| {
            regions.iter().filter(|r| r.kind.building().is_some_and(|b| pred(&b))).count() as f32 / total
        };
        Self {
            population: regions.iter().map(|r| r.resident_count() as u32).sum(),
            wealth: regions.iter().map(|r| r.level as f32 * r.condition).sum::<f32>() / total,
            defense: share(BuildingType::is_defense),
            trade: share(BuildingType::is_trade),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementGenerationStats {
    pub settlements_generated: u64,
    pub buildings_requested: u64,
    pub buildings_created: u64,
    pub roads_created: u64,
    pub residents_housed: u64,
    pub shortfalls: u64,
}

// =============================================================================
// GENERATOR
// =============================================================================

#[derive(Clone, Debug)]
pub struct SettlementLayout {
    pub complex: GeneratedComplex,
    pub requested_buildings: usize,
}

pub struct SettlementGenerator {
    seed: u64,
    planner: SpatialPlacementPlanner,
    cache: Arc<GenerationCache<Artifact>>,
    observer: Arc<dyn GenerationObserver>,
    registry: RwLock<ComplexRegistry>,
    stats: Mutex<SettlementGenerationStats>,
}

impl SettlementGenerator {
    pub fn new(
        seed: u64,
        planner: SpatialPlacementPlanner,
        cache: Arc<GenerationCache<Artifact>>,
        observer: Arc<dyn GenerationObserver>,
    ) -> Self {
        Self {
            seed,
            planner,
            cache,
            observer,
            registry: RwLock::new(ComplexRegistry::new()),
            stats: Mutex::new(SettlementGenerationStats::default()),
        }
    }

    pub fn cache_key(&self, tier: SettlementTier, s: &SettlementSettings) -> CacheKey {
        CacheKey::builder("settlement")
            .param("world", self.seed)
            .param("tier", tier)
            .param("seed", s.seed)
            .param("width", s.width)
            .param("height", s.height)
            .param("population", s.population)
            .param("wealth", s.wealth_level)
            .param("defense", s.defense_level)
            .param("trade", s.trade_level)
            .build()
    }

    pub fn generate(&self, tier: SettlementTier, settings: &SettlementSettings) -> Result<Arc<GeneratedComplex>> {
        settings.validate()?;
        let key = self.cache_key(tier, settings);
        let registry_key = key.clone();
        let (artifact, evicted) = self.cache.get_or_insert_with(key, || {
            if let Some(existing) = self.registry.read().find(&registry_key) {
                return Ok(Artifact::Complex(existing));
            }
            let layout = self.build(tier, settings)?;
            let (complex, added) = self.registry.write().add(registry_key, Arc::new(layout.complex));
            if added {
                self.record(&complex, layout.requested_buildings);
            }
            Ok(Artifact::Complex(complex))
        })?;
        if let Some(key) = evicted {
            self.observer.on_event(&GenerationEvent::CacheEvicted { key });
        }
        match artifact {
            Artifact::Complex(complex) => Ok(complex),
            _ => Err(GenerationError::invalid("cache", "settlement key holds a different artifact")),
        }
    }

    fn record(&self, complex: &GeneratedComplex, requested: usize) {
        let placed = complex.regions.values().filter(|r| r.kind != RegionKind::Building(BuildingType::Tower)).count();
        let residents: usize = complex.regions.values().map(Region::resident_count).sum();
        {
            let mut stats = self.stats.lock();
            stats.settlements_generated += 1;
            stats.buildings_requested += requested as u64;
            stats.buildings_created += placed as u64;
            stats.roads_created += complex.paths.len() as u64;
            stats.residents_housed += residents as u64;
            if placed < requested {
                stats.shortfalls += 1;
            }
        }
        if placed < requested {
            warn!(label = %complex.label(), requested, placed, "settlement placed fewer buildings than planned");
            self.observer.on_event(&GenerationEvent::PlacementShortfall {
                kind: ComplexKindTag::Settlement,
                requested,
                placed,
            });
        }
        info!(label = %complex.label(), buildings = complex.regions.len(), roads = complex.paths.len(), residents, "generated settlement");
        self.observer.on_event(&GenerationEvent::ComplexGenerated {
            kind: ComplexKindTag::Settlement,
            label: complex.label(),
            regions: complex.regions.len(),
            paths: complex.paths.len(),
        });
    }

    /// Build a layout without caching or registering it.
    pub fn build(&self, tier: SettlementTier, settings: &SettlementSettings) -> Result<SettlementLayout> {
        settings.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(hash_words(self.seed, &[tier as u64, settings.seed]));
        let mut grid = OccupancyGrid::new(settings.width, settings.height);
        let mut paths = BTreeMap::new();

        // 1. main road down the centre column
        let center_x = settings.width / 2;
        let main_style = PathStyle::new(MAIN_ROAD_WIDTH, PathKind::Road(RoadKind::main_road(settings.wealth_level)))?;
        connect_cells(
            &mut grid,
            &mut paths,
            (Endpoint::Cell { x: center_x, y: 0 }, (center_x, 0)),
            (Endpoint::Cell { x: center_x, y: settings.height - 1 }, (center_x, settings.height - 1)),
            main_style,
        );

        // 2. fortifications
        let mut towers = Vec::new();
        let mut walls = Vec::new();
        let mut gates = Vec::new();
        if settings.fortified() {
            towers = self.raise_towers(&mut grid, settings);
            walls = build_wall_ring(&mut grid, settings);
            gates = place_gates(&mut grid, settings, center_x);
        }

        // 3. buildings
        let mut placed: Vec<(Rect, BuildingType, u32)> = Vec::new();
        let mut requested = 0;
        for template in tier.catalog() {
            let count = rng.gen_range(template.count.0..=template.count.1);
            requested += count;
            for slot in self.planner.place(&mut grid, count, template.size, &mut rng)?.into_iter().flatten() {
                let level = rng.gen_range(template.levels.0..=template.levels.1);
                placed.push((slot, template.kind, level));
            }
        }
        if placed.is_empty() {
            return Err(GenerationError::EmptyLayout {
                what: "settlement",
                width: settings.width,
                height: settings.height,
            });
        }

        let mut regions: Vec<Region> = placed
            .iter()
            .enumerate()
            .map(|(i, (rect, kind, level))| {
                let mut region = Region::new(RegionId(i as u32), *rect, RegionKind::Building(*kind));
                region.level = *level;
                region.condition = rng.gen_range(0.7..=1.0);
                region
            })
            .collect();
        let building_count = regions.len();
        for (i, rect) in towers.into_iter().enumerate() {
            let mut tower = Region::new(
                RegionId((building_count + i) as u32),
                rect,
                RegionKind::Building(BuildingType::Tower),
            );
            tower.level = TOWER_LEVEL;
            regions.push(tower);
        }

        // 4. roads
        let civic_kind = PathKind::Road(RoadKind::civic_road(settings.wealth_level));
        let streets = ConnectivityGraphBuilder::new(PathStyle::new(CIVIC_ROAD_WIDTH, civic_kind)?)?;
        streets.connect(&mut regions, &mut grid, 0.0, &mut paths, &mut rng);

        let civic: Vec<usize> = (0..building_count)
            .filter(|i| regions[*i].kind.building().is_some_and(|b| b.is_civic()))
            .collect();
        for pair in civic.windows(2) {
            streets.join(&mut regions, pair[0], pair[1], &mut grid, &mut paths, streets.style());
        }

        let spur_style = PathStyle::new(SPUR_ROAD_WIDTH, PathKind::Road(RoadKind::Dirt))?;
        let houses: Vec<usize> = (0..building_count)
            .filter(|i| regions[*i].kind == RegionKind::Building(BuildingType::House))
            .collect();
        for &i in houses.iter().take(houses.len() / 3) {
            let center = regions[i].center();
            if let Some((x, y)) = nearest_tagged(&grid, center, CellTag::Path) {
                connect_cells(
                    &mut grid,
                    &mut paths,
                    (Endpoint::Region(regions[i].id), center),
                    (Endpoint::Cell { x, y }, (x, y)),
                    spur_style,
                );
            }
        }

        let housed = distribute_residents(&mut regions, &houses, settings.population);
        debug!(tier = %tier, housed, population = settings.population, "residents distributed");

        let stats = SettlementStats::compute(&regions);
        let entrance = regions[0].id;
        let exit = regions[building_count - 1].id;
        let complex = GeneratedComplex {
            id: ComplexId::next(),
            kind: ComplexKind::Settlement { tier, settings: settings.clone(), stats, walls, gates },
            regions: regions.into_iter().map(|r| (r.id, r)).collect(),
            paths,
            loot: BTreeMap::new(),
            entrance,
            exit,
            boss: None,
            occupancy: grid,
        };
        debug_assert!(complex.is_fully_connected());
        Ok(SettlementLayout { complex, requested_buildings: requested })
    }

    /// Claim the four 3x3 corner towers centred on the wall ring corners.
    fn raise_towers(&self, grid: &mut OccupancyGrid, s: &SettlementSettings) -> Vec<Rect> {
        let (left, top) = (WALL_MARGIN, WALL_MARGIN);
        let (right, bottom) = (s.width - WALL_MARGIN - 1, s.height - WALL_MARGIN - 1);
        [(left, top), (right, top), (left, bottom), (right, bottom)]
            .into_iter()
            .map(|(x, y)| Rect::new(x - 1, y - 1, TOWER_SIZE, TOWER_SIZE))
            .filter(|rect| self.planner.reserve(grid, *rect, CellTag::Region))
            .collect()
    }

    pub fn get_settlement(&self, id: ComplexId) -> Option<Arc<GeneratedComplex>> {
        self.registry.read().get(id)
    }

    pub fn overlay(&self, id: ComplexId) -> Option<ComplexOverlay> {
        self.registry.read().overlay(id).cloned()
    }

    pub fn mark_explored(&self, id: ComplexId, building: RegionId) -> bool {
        self.registry.write().mark_explored(id, building)
    }

    pub fn stats(&self) -> SettlementGenerationStats {
        self.stats.lock().clone()
    }

    pub fn registered(&self) -> usize {
        self.registry.read().len()
    }

    pub fn clear(&self) {
        self.registry.write().clear();
    }
}

/// Wall ring on the free cells at the margin.
fn build_wall_ring(grid: &mut OccupancyGrid, s: &SettlementSettings) -> Vec<(usize, usize)> {
    let (right, bottom) = (s.width - WALL_MARGIN - 1, s.height - WALL_MARGIN - 1);
    let ring = (WALL_MARGIN..=right)
        .flat_map(|x| [(x, WALL_MARGIN), (x, bottom)])
        .chain((WALL_MARGIN + 1..bottom).flat_map(|y| [(WALL_MARGIN, y), (right, y)]));

    let mut walls = Vec::new();
    for (x, y) in ring {
        if grid.get(x, y) == CellTag::Free {
            grid.set(x, y, CellTag::Wall);
            walls.push((x, y));
        }
    }
    walls
}

/// Gates where the main road crosses the north and south walls.
fn place_gates(grid: &mut OccupancyGrid, s: &SettlementSettings, center_x: usize) -> Vec<(usize, usize)> {
    let gates = vec![(center_x, WALL_MARGIN), (center_x, s.height - WALL_MARGIN - 1)];
    for &(x, y) in &gates {
        grid.set(x, y, CellTag::Gate);
    }
    gates
}

/// Round-robin residents over houses up to `4 x level` each. Returns the
/// number housed.
fn distribute_residents(regions: &mut [Region], houses: &[usize], population: u32) -> usize {
    let capacity: Vec<usize> = houses.iter().map(|&i| RESIDENTS_PER_LEVEL * regions[i].level as usize).collect();
    let total = (population as usize).min(capacity.iter().sum());

    let mut load = vec![0usize; houses.len()];
    let mut assigned = 0;
    while assigned < total {
        for (slot, cap) in load.iter_mut().zip(&capacity) {
            if assigned == total {
                break;
            }
            if *slot < *cap {
                *slot += 1;
                assigned += 1;
            }
        }
    }

    let mut next = 0u32;
    for (&i, &count) in houses.iter().zip(&load) {
        for _ in 0..count {
            regions[i].contents.push(Content::Resident(ResidentId(next)));
            next += 1;
        }
    }
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelObserver, NullObserver};
    use crate::structures::types::PathId;

    fn generator() -> SettlementGenerator {
        let cache = Arc::new(GenerationCache::with_capacity(16).unwrap());
        SettlementGenerator::new(42, SpatialPlacementPlanner::default(), cache, Arc::new(NullObserver))
    }

    fn house_capacity(complex: &GeneratedComplex) -> usize {
        complex
            .buildings_of(BuildingType::House)
            .map(|h| RESIDENTS_PER_LEVEL * h.level as usize)
            .sum()
    }

    #[test]
    fn test_village_residents_and_wealth() {
        let settings = SettlementSettings { population: 100, ..Default::default() };
        let complex = generator().build(SettlementTier::Village, &settings).unwrap().complex;
        let housed: usize = complex.buildings_of(BuildingType::House).map(|h| h.resident_count()).sum();
        assert_eq!(housed, 100.min(house_capacity(&complex)));

        let stats = complex.settlement_stats().unwrap();
        assert_eq!(stats.population as usize, housed);
        assert!((0.0..=5.0).contains(&stats.wealth));
        assert!(complex.is_fully_connected());
        assert!(complex.regions_disjoint());
    }

    #[test]
    fn test_residents_round_robin() {
        let rect = Rect::new(0, 0, 3, 3);
        let mut regions: Vec<Region> = (0..3)
            .map(|i| Region::new(RegionId(i), rect, RegionKind::Building(BuildingType::House)))
            .collect();
        // capacities 4, 8, 4
        regions[1].level = 2;
        let housed = distribute_residents(&mut regions, &[0, 1, 2], 14);
        assert_eq!(housed, 14);
        let counts: Vec<usize> = regions.iter().map(Region::resident_count).collect();
        assert_eq!(counts, vec![4, 6, 4]);

        assert_eq!(distribute_residents(&mut regions, &[], 50), 0);
    }

    #[test]
    fn test_stats_from_building_mix() {
        let rect = Rect::new(0, 0, 3, 3);
        let mix = [
            (BuildingType::Tower, 3, 1.0),
            (BuildingType::Barracks, 2, 0.5),
            (BuildingType::Shop, 1, 1.0),
            (BuildingType::Tavern, 2, 0.75),
            (BuildingType::House, 1, 1.0),
        ];
        let mut regions: Vec<Region> = mix
            .iter()
            .enumerate()
            .map(|(i, &(kind, level, condition))| {
                let mut region = Region::new(RegionId(i as u32), rect, RegionKind::Building(kind));
                region.level = level;
                region.condition = condition;
                region
            })
            .collect();
        assert_eq!(distribute_residents(&mut regions, &[4], 3), 3);

        let stats = SettlementStats::compute(&regions);
        assert_eq!(stats.population, 3);
        // (3 + 1 + 1 + 1.5 + 1) / 5
        assert!((stats.wealth - 1.5).abs() < 1e-6);
        assert!((stats.defense - 0.4).abs() < 1e-6);
        assert!((stats.trade - 0.4).abs() < 1e-6);

        assert_eq!(SettlementStats::compute(&[]), SettlementStats::default());
    }

    #[test]
    fn test_evicted_requests_reuse_registered_layout() {
        let cache = Arc::new(GenerationCache::with_capacity(1).unwrap());
        let gen = SettlementGenerator::new(42, SpatialPlacementPlanner::default(), cache.clone(), Arc::new(NullObserver));
        let a = SettlementSettings::default();
        let b = SettlementSettings { seed: 3, ..Default::default() };
        for _ in 0..20 {
            gen.generate(SettlementTier::Hamlet, &a).unwrap();
            gen.generate(SettlementTier::Hamlet, &b).unwrap();
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(gen.registered(), 2);
        assert_eq!(gen.stats().settlements_generated, 2);
    }

    #[test]
    fn test_catalogs_are_well_formed() {
        for tier in SettlementTier::all() {
            let catalog = tier.catalog();
            assert!(!catalog.is_empty());
            for t in catalog {
                assert!(t.count.0 <= t.count.1);
                assert!(t.size.validate().is_ok());
                assert!(t.levels.0 >= 1 && t.levels.0 <= t.levels.1);
            }
        }
        assert!(SettlementTier::Hamlet.catalog().iter().any(|t| t.kind == BuildingType::House));
    }

    #[test]
    fn test_fortified_settlement_has_towers_walls_and_gates() {
        let settings = SettlementSettings { defense_level: 0.9, ..Default::default() };
        let complex = generator().build(SettlementTier::Town, &settings).unwrap().complex;
        assert_eq!(complex.buildings_of(BuildingType::Tower).count(), 4);
        for tower in complex.buildings_of(BuildingType::Tower) {
            assert_eq!(tower.level, 3);
            assert_eq!(tower.condition, 1.0);
        }
        match &complex.kind {
            ComplexKind::Settlement { walls, gates, stats, .. } => {
                assert_eq!(gates.len(), 2);
                for &(x, y) in gates {
                    assert_eq!(complex.occupancy.get(x, y), CellTag::Gate);
                }
                assert!(!walls.is_empty());
                assert!(walls.iter().all(|&(x, y)| complex.occupancy.get(x, y) == CellTag::Wall));
                assert!(stats.defense > 0.0);
            }
            ComplexKind::Dungeon { .. } => panic!("expected a settlement"),
        }
        assert!(complex.is_fully_connected());
    }

    #[test]
    fn test_unfortified_settlement_has_no_walls() {
        let complex = generator().build(SettlementTier::Village, &SettlementSettings::default()).unwrap().complex;
        assert_eq!(complex.buildings_of(BuildingType::Tower).count(), 0);
        assert_eq!(complex.occupancy.count(CellTag::Wall), 0);
    }

    #[test]
    fn test_main_road_runs_through_centre() {
        let complex = generator().build(SettlementTier::Hamlet, &SettlementSettings::default()).unwrap().complex;
        let main = &complex.paths[&PathId(0)];
        assert_eq!(main.width, MAIN_ROAD_WIDTH);
        assert_eq!(main.cells.first(), Some(&(50, 0)));
        assert_eq!(main.cells.last(), Some(&(50, 99)));
        assert_eq!(main.kind, PathKind::Road(RoadKind::Cobblestone));
    }

    #[test]
    fn test_rich_settlement_paves_main_road() {
        let settings = SettlementSettings { wealth_level: 0.9, ..Default::default() };
        let complex = generator().build(SettlementTier::Hamlet, &settings).unwrap().complex;
        assert!(complex.paths.values().any(|p| p.kind == PathKind::Road(RoadKind::Paved)));
    }

    #[test]
    fn test_tiny_grid_is_empty_layout() {
        let settings = SettlementSettings { width: 2, height: 2, ..Default::default() };
        let result = generator().build(SettlementTier::Hamlet, &settings);
        assert!(matches!(result, Err(GenerationError::EmptyLayout { .. })));
    }

    #[test]
    fn test_small_fortified_grid_rejected() {
        let settings = SettlementSettings { width: 12, height: 12, defense_level: 0.8, ..Default::default() };
        assert!(matches!(
            generator().generate(SettlementTier::Hamlet, &settings),
            Err(GenerationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_capital_reports_shortfall() {
        let (observer, rx) = ChannelObserver::bounded(8);
        let cache = Arc::new(GenerationCache::with_capacity(4).unwrap());
        let gen = SettlementGenerator::new(7, SpatialPlacementPlanner::default(), cache, Arc::new(observer));
        let complex = gen.generate(SettlementTier::Capital, &SettlementSettings::default()).unwrap();
        assert!(complex.is_fully_connected());
        assert_eq!(gen.stats().shortfalls, 1);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, GenerationEvent::PlacementShortfall { kind: ComplexKindTag::Settlement, .. })));
        assert!(gen.get_settlement(complex.id).is_some());
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("CITY".parse::<SettlementTier>().unwrap(), SettlementTier::City);
        assert!("metropolis".parse::<SettlementTier>().is_err());
    }
}
