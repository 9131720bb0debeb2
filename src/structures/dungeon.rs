//! Themed dungeon layouts
//!
//! Rooms are packed by the placement planner and chained by corridors. Room
//! roles are fixed by index (entrance first, exit last, boss in the middle)
//! and the anchors are placed before the filler so they claim space first.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::connectivity::{ConnectivityGraphBuilder, PathStyle};
use super::loot::{LootContainer, LootRoll, RarityBias, MAX_LEVEL};
use super::placement::SpatialPlacementPlanner;
use super::registry::{ComplexOverlay, ComplexRegistry};
use super::types::{
    ComplexId, ComplexKind, Content, GeneratedComplex, LootId, OccupancyGrid, PathKind, Rect, Region, RegionId,
    RegionKind, RoomType, SizeRange, SpecialFeature, TrapKind,
};
use crate::cache::{Artifact, CacheKey, GenerationCache};
use crate::error::{ensure_positive, ensure_unit, GenerationError, Result};
use crate::events::{ComplexKindTag, GenerationEvent, GenerationObserver};
use crate::seeds::hash_words;

// =============================================================================
// THEMES
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DungeonTheme {
    Cave,
    Crypt,
    Mine,
    Laboratory,
    Temple,
    Fortress,
    Maze,
    Tower,
}

impl DungeonTheme {
    pub fn all() -> &'static [DungeonTheme] {
        &[
            DungeonTheme::Cave,
            DungeonTheme::Crypt,
            DungeonTheme::Mine,
            DungeonTheme::Laboratory,
            DungeonTheme::Temple,
            DungeonTheme::Fortress,
            DungeonTheme::Maze,
            DungeonTheme::Tower,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            DungeonTheme::Cave => "cave",
            DungeonTheme::Crypt => "crypt",
            DungeonTheme::Mine => "mine",
            DungeonTheme::Laboratory => "laboratory",
            DungeonTheme::Temple => "temple",
            DungeonTheme::Fortress => "fortress",
            DungeonTheme::Maze => "maze",
            DungeonTheme::Tower => "tower",
        }
    }

    /// Regular enemies roaming this theme.
    pub fn enemy_table(&self) -> &'static [&'static str] {
        match self {
            DungeonTheme::Cave => &["cave_troll", "bat_swarm", "rock_golem"],
            DungeonTheme::Crypt => &["skeleton_warrior", "ghost", "zombie"],
            DungeonTheme::Mine => &["tunnel_crawler", "cave_spider", "undead_miner"],
            DungeonTheme::Laboratory => &["failed_experiment", "mad_scientist", "mutated_creature"],
            DungeonTheme::Temple => &["temple_guardian", "corrupted_priest", "holy_warrior"],
            DungeonTheme::Fortress => &["fortress_soldier", "siege_engine", "commander"],
            DungeonTheme::Maze => &["maze_creature", "lost_wanderer", "minotaur"],
            DungeonTheme::Tower => &["tower_mage", "magical_construct", "apprentice"],
        }
    }

    /// Candidates for the boss room.
    pub fn boss_table(&self) -> &'static [&'static str] {
        match self {
            DungeonTheme::Cave => &["cave_lord"],
            DungeonTheme::Crypt => &["ancient_lich"],
            DungeonTheme::Mine => &["mine_overseer"],
            DungeonTheme::Laboratory => &["master_experimenter"],
            DungeonTheme::Temple => &["high_priest"],
            DungeonTheme::Fortress => &["fortress_commander"],
            DungeonTheme::Maze => &["maze_master"],
            DungeonTheme::Tower => &["archmage"],
        }
    }

    /// Traps armed in rooms and corridors of this theme.
    pub fn trap_pool(&self) -> &'static [TrapKind] {
        use TrapKind::*;
        match self {
            DungeonTheme::Cave => &[SpikePit, FallingCeiling],
            DungeonTheme::Crypt => &[PoisonDart, CurseTrap, FallingCeiling],
            DungeonTheme::Mine => &[FallingCeiling, SpikePit, FireTrap],
            DungeonTheme::Laboratory => &[ElectricTrap, FireTrap, IceTrap, TeleportTrap],
            DungeonTheme::Temple => &[CurseTrap, FireTrap, PoisonDart],
            DungeonTheme::Fortress => &[SpikePit, PoisonDart, FireTrap],
            DungeonTheme::Maze => &[TeleportTrap, SpikePit, PoisonDart],
            DungeonTheme::Tower => &[ElectricTrap, IceTrap, TeleportTrap, CurseTrap],
        }
    }

    fn pick_trap<R: Rng>(&self, rng: &mut R) -> TrapKind {
        self.trap_pool().choose(rng).copied().unwrap_or_else(|| TrapKind::random(rng))
    }

    fn index(&self) -> u64 {
        *self as u64
    }
}

impl std::fmt::Display for DungeonTheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DungeonTheme {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        DungeonTheme::all()
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            .ok_or_else(|| GenerationError::invalid("theme", format!("unknown dungeon theme '{s}'")))
    }
}

// =============================================================================
// ROOM CATALOG
// =============================================================================

/// Size and spawn odds for one room type in one theme.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoomTemplate {
    pub size: SizeRange,
    pub enemy_chance: f32,
    pub trap_chance: f32,
}

const fn tpl(min: usize, max: usize, enemy_chance: f32, trap_chance: f32) -> Option<RoomTemplate> {
    Some(RoomTemplate { size: SizeRange { min, max }, enemy_chance, trap_chance })
}

/// Catalog entry, or `None` when the theme uses the generic settings range.
fn catalog_entry(theme: DungeonTheme, room: RoomType) -> Option<RoomTemplate> {
    use RoomType::*;
    match (theme, room) {
        (DungeonTheme::Cave, Entrance) => tpl(4, 6, 0.1, 0.2),
        (DungeonTheme::Cave, Chamber) => tpl(5, 10, 0.6, 0.3),
        (DungeonTheme::Cave, Treasure) => tpl(3, 5, 0.8, 0.7),
        (DungeonTheme::Cave, Boss) => tpl(8, 12, 1.0, 0.5),
        (DungeonTheme::Cave, Exit) => tpl(4, 6, 0.2, 0.4),

        (DungeonTheme::Crypt, Entrance) => tpl(3, 5, 0.3, 0.4),
        (DungeonTheme::Crypt, Chamber) => tpl(4, 8, 0.7, 0.5),
        (DungeonTheme::Crypt, Treasure) => tpl(3, 4, 0.9, 0.8),
        (DungeonTheme::Crypt, Boss) => tpl(6, 10, 1.0, 0.6),
        (DungeonTheme::Crypt, Exit) => tpl(3, 5, 0.4, 0.5),

        (DungeonTheme::Laboratory, Entrance) => tpl(4, 6, 0.2, 0.3),
        (DungeonTheme::Laboratory, Chamber) => tpl(5, 9, 0.5, 0.6),
        (DungeonTheme::Laboratory, Treasure) => tpl(3, 5, 0.7, 0.8),
        (DungeonTheme::Laboratory, Boss) => tpl(7, 11, 1.0, 0.7),
        (DungeonTheme::Laboratory, Exit) => tpl(4, 6, 0.3, 0.4),

        (DungeonTheme::Temple, Entrance) => tpl(5, 7, 0.1, 0.2),
        (DungeonTheme::Temple, Chamber) => tpl(6, 12, 0.4, 0.4),
        (DungeonTheme::Temple, Treasure) => tpl(4, 6, 0.6, 0.6),
        (DungeonTheme::Temple, Boss) => tpl(10, 15, 1.0, 0.5),
        (DungeonTheme::Temple, Exit) => tpl(5, 7, 0.2, 0.3),

        _ => None,
    }
}

/// Template for a room, falling back to the settings size range.
pub fn room_template(theme: DungeonTheme, room: RoomType, settings: &DungeonSettings) -> RoomTemplate {
    catalog_entry(theme, room).unwrap_or(RoomTemplate {
        size: SizeRange { min: settings.room_min_size, max: settings.room_max_size },
        enemy_chance: match room {
            RoomType::Boss => 1.0,
            _ => 0.5,
        },
        trap_chance: match room {
            RoomType::Trap => 1.0,
            _ => 0.3,
        },
    })
}

/// Signature items for loot found in a room.
fn treasure_items(room: RoomType) -> &'static [&'static str] {
    match room {
        RoomType::Treasure => &["gold_chest", "magical_weapon", "precious_gem"],
        RoomType::Boss => &["boss_loot", "legendary_item", "ancient_relic"],
        RoomType::Chamber => &["silver_coins", "basic_weapon", "health_potion"],
        RoomType::Entrance => &["starting_gear", "map_fragment", "weak_potion"],
        RoomType::Exit => &["escape_reward", "completion_bonus", "final_treasure"],
        RoomType::Trap => &["misc_item"],
    }
}

/// Enemy count for a room before spawn rolls.
pub fn enemy_count(room: RoomType, complexity: f32) -> usize {
    let base: usize = match room {
        RoomType::Entrance => 1,
        RoomType::Chamber => 2,
        RoomType::Treasure => 3,
        RoomType::Boss => 1,
        RoomType::Trap => 1,
        RoomType::Exit => 1,
    };
    if complexity > 0.7 {
        (base as f32 * 1.5) as usize
    } else if complexity < 0.3 {
        base.saturating_sub(1)
    } else {
        base
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DungeonSettings {
    pub width: usize,
    pub height: usize,
    pub min_rooms: usize,
    pub max_rooms: usize,
    pub room_min_size: usize,
    pub room_max_size: usize,
    pub corridor_width: usize,
    pub trap_density: f32,
    pub treasure_density: f32,
    pub enemy_density: f32,
    /// 0.0 = linear, 1.0 = many loops and crowded rooms
    pub complexity: f32,
    /// Scales loot value and rarity
    pub level: u32,
    pub seed: u64,
}

impl Default for DungeonSettings {
    fn default() -> Self {
        Self {
            width: 50,
            height: 50,
            min_rooms: 10,
            max_rooms: 25,
            room_min_size: 3,
            room_max_size: 8,
            corridor_width: 2,
            trap_density: 0.3,
            treasure_density: 0.2,
            enemy_density: 0.4,
            complexity: 0.5,
            level: 1,
            seed: 0,
        }
    }
}

impl DungeonSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("dungeon.width", self.width)?;
        ensure_positive("dungeon.height", self.height)?;
        if self.min_rooms < 2 {
            return Err(GenerationError::invalid("dungeon.min_rooms", "need at least an entrance and an exit"));
        }
        if self.min_rooms > self.max_rooms {
            return Err(GenerationError::invalid(
                "dungeon.max_rooms",
                format!("empty range {}..={}", self.min_rooms, self.max_rooms),
            ));
        }
        SizeRange::new(self.room_min_size, self.room_max_size)?;
        if self.room_max_size > self.width.min(self.height) {
            return Err(GenerationError::invalid(
                "dungeon.room_max_size",
                format!("{} does not fit a {}x{} grid", self.room_max_size, self.width, self.height),
            ));
        }
        ensure_positive("dungeon.corridor_width", self.corridor_width)?;
        ensure_unit("dungeon.trap_density", self.trap_density)?;
        ensure_unit("dungeon.treasure_density", self.treasure_density)?;
        ensure_unit("dungeon.enemy_density", self.enemy_density)?;
        ensure_unit("dungeon.complexity", self.complexity)?;
        if self.level > MAX_LEVEL {
            return Err(GenerationError::invalid(
                "dungeon.level",
                format!("{} exceeds {MAX_LEVEL}", self.level),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DungeonGenerationStats {
    pub dungeons_generated: u64,
    pub rooms_requested: u64,
    pub rooms_created: u64,
    pub corridors_created: u64,
    pub shortfalls: u64,
}

/// A finished layout plus the room count it was aiming for.
#[derive(Clone, Debug)]
pub struct DungeonLayout {
    pub complex: GeneratedComplex,
    pub requested_rooms: usize,
}

pub struct DungeonGenerator {
    seed: u64,
    planner: SpatialPlacementPlanner,
    cache: Arc<GenerationCache<Artifact>>,
    observer: Arc<dyn GenerationObserver>,
    registry: RwLock<ComplexRegistry>,
    stats: Mutex<DungeonGenerationStats>,
}

impl DungeonGenerator {
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
            stats: Mutex::new(DungeonGenerationStats::default()),
        }
    }

    pub fn cache_key(&self, theme: DungeonTheme, s: &DungeonSettings) -> CacheKey {
        CacheKey::builder("dungeon")
            .param("world", self.seed)
            .param("theme", theme)
            .param("seed", s.seed)
            .param("width", s.width)
            .param("height", s.height)
            .param("min_rooms", s.min_rooms)
            .param("max_rooms", s.max_rooms)
            .param("room_min", s.room_min_size)
            .param("room_max", s.room_max_size)
            .param("corridor", s.corridor_width)
            .param("traps", s.trap_density)
            .param("treasure", s.treasure_density)
            .param("enemies", s.enemy_density)
            .param("complexity", s.complexity)
            .param("level", s.level)
            .build()
    }

    /// Cached generation. A fresh layout is also registered in the result
    /// table; a request it already holds reuses that layout after eviction.
    pub fn generate(&self, theme: DungeonTheme, settings: &DungeonSettings) -> Result<Arc<GeneratedComplex>> {
        settings.validate()?;
        let key = self.cache_key(theme, settings);
        let registry_key = key.clone();
        let (artifact, evicted) = self.cache.get_or_insert_with(key, || {
            if let Some(existing) = self.registry.read().find(&registry_key) {
                return Ok(Artifact::Complex(existing));
            }
            let layout = self.build(theme, settings)?;
            let (complex, added) = self.registry.write().add(registry_key, Arc::new(layout.complex));
            if added {
                self.record(&complex, layout.requested_rooms);
            }
            Ok(Artifact::Complex(complex))
        })?;
        if let Some(key) = evicted {
            self.observer.on_event(&GenerationEvent::CacheEvicted { key });
        }
        match artifact {
            Artifact::Complex(complex) => Ok(complex),
            _ => Err(GenerationError::invalid("cache", "dungeon key holds a different artifact")),
        }
    }

    fn record(&self, complex: &GeneratedComplex, requested: usize) {
        let placed = complex.regions.len();
        {
            let mut stats = self.stats.lock();
            stats.dungeons_generated += 1;
            stats.rooms_requested += requested as u64;
            stats.rooms_created += placed as u64;
            stats.corridors_created += complex.paths.len() as u64;
            if placed < requested {
                stats.shortfalls += 1;
            }
        }
        if placed < requested {
            warn!(label = %complex.label(), requested, placed, "dungeon placed fewer rooms than planned");
            self.observer.on_event(&GenerationEvent::PlacementShortfall {
                kind: ComplexKindTag::Dungeon,
                requested,
                placed,
            });
        }
        info!(label = %complex.label(), rooms = placed, corridors = complex.paths.len(), "generated dungeon");
        self.observer.on_event(&GenerationEvent::ComplexGenerated {
            kind: ComplexKindTag::Dungeon,
            label: complex.label(),
            regions: placed,
            paths: complex.paths.len(),
        });
    }

    /// Build a layout without caching or registering it.
    pub fn build(&self, theme: DungeonTheme, settings: &DungeonSettings) -> Result<DungeonLayout> {
        settings.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(hash_words(self.seed, &[theme.index(), settings.seed]));

        let planned = rng.gen_range(settings.min_rooms..=settings.max_rooms);
        let roles: Vec<RoomType> = (0..planned).map(|i| select_room_type(i, planned, &mut rng)).collect();

        // anchors first so they claim space before the filler
        let mut order = vec![0, planned - 1];
        if roles[planned / 2] == RoomType::Boss {
            order.push(planned / 2);
        }
        order.extend((1..planned - 1).filter(|i| roles[*i] != RoomType::Boss));

        let mut grid = OccupancyGrid::new(settings.width, settings.height);
        let mut slots: Vec<Option<Rect>> = vec![None; planned];
        for idx in order {
            let template = room_template(theme, roles[idx], settings);
            slots[idx] = self.planner.place_one(&mut grid, template.size, &mut rng)?;
        }

        let mut placed: Vec<(Rect, RoomType)> = slots
            .iter()
            .zip(&roles)
            .filter_map(|(slot, role)| slot.map(|rect| (rect, *role)))
            .collect();
        if placed.is_empty() {
            return Err(GenerationError::EmptyLayout {
                what: "dungeon",
                width: settings.width,
                height: settings.height,
            });
        }
        promote_anchors(&mut placed);

        let mut regions: Vec<Region> = placed
            .iter()
            .enumerate()
            .map(|(i, (rect, role))| {
                let mut region = Region::new(RegionId(i as u32), *rect, RegionKind::Room(*role));
                region.level = settings.level;
                region
            })
            .collect();

        let corridors = ConnectivityGraphBuilder::new(PathStyle::new(settings.corridor_width, PathKind::Corridor)?)?;
        let mut paths = BTreeMap::new();
        corridors.connect(&mut regions, &mut grid, settings.complexity, &mut paths, &mut rng);

        let mut loot = BTreeMap::new();
        for region in regions.iter_mut() {
            let role = region.kind.room().unwrap_or(RoomType::Chamber);
            let template = room_template(theme, role, settings);
            add_features(region, role);
            roll_traps(region, role, theme, &template, settings, &mut rng);
            roll_loot(region, role, settings, &mut loot, &mut rng);
            roll_enemies(region, role, theme, &template, settings, &mut rng);

            for path in paths.values_mut() {
                if path.touches(region.id) && rng.gen_bool((settings.trap_density * 0.5) as f64) {
                    path.traps.push(theme.pick_trap(&mut rng));
                }
            }
        }

        let find = |role: RoomType| regions.iter().find(|r| r.kind == RegionKind::Room(role)).map(|r| r.id);
        let entrance = find(RoomType::Entrance).unwrap_or(RegionId(0));
        let exit = find(RoomType::Exit).unwrap_or(entrance);
        let boss = find(RoomType::Boss);

        let complex = GeneratedComplex {
            id: ComplexId::next(),
            kind: ComplexKind::Dungeon { theme, settings: settings.clone() },
            regions: regions.into_iter().map(|r| (r.id, r)).collect(),
            paths,
            loot,
            entrance,
            exit,
            boss,
            occupancy: grid,
        };
        debug_assert!(complex.is_fully_connected());
        Ok(DungeonLayout { complex, requested_rooms: planned })
    }

    pub fn get_dungeon(&self, id: ComplexId) -> Option<Arc<GeneratedComplex>> {
        self.registry.read().get(id)
    }

    pub fn overlay(&self, id: ComplexId) -> Option<ComplexOverlay> {
        self.registry.read().overlay(id).cloned()
    }

    pub fn mark_explored(&self, id: ComplexId, room: RegionId) -> bool {
        self.registry.write().mark_explored(id, room)
    }

    pub fn mark_cleared(&self, id: ComplexId, room: RegionId) -> bool {
        self.registry.write().mark_cleared(id, room)
    }

    pub fn stats(&self) -> DungeonGenerationStats {
        self.stats.lock().clone()
    }

    pub fn registered(&self) -> usize {
        self.registry.read().len()
    }

    pub fn clear(&self) {
        self.registry.write().clear();
    }
}

fn select_room_type<R: Rng>(index: usize, total: usize, rng: &mut R) -> RoomType {
    if index == 0 {
        RoomType::Entrance
    } else if index == total - 1 {
        RoomType::Exit
    } else if index == total / 2 {
        RoomType::Boss
    } else if rng.gen_bool(0.2) {
        RoomType::Treasure
    } else if rng.gen_bool(0.3) {
        RoomType::Trap
    } else {
        RoomType::Chamber
    }
}

/// Make sure the first placed room is the entrance and, when there is more
/// than one room, the last placed one is the exit.
fn promote_anchors(placed: &mut [(Rect, RoomType)]) {
    if let Some(first) = placed.first_mut() {
        first.1 = RoomType::Entrance;
    }
    let has_exit = placed.iter().any(|(_, role)| *role == RoomType::Exit);
    if !has_exit && placed.len() > 1 {
        if let Some(last) = placed.last_mut() {
            last.1 = RoomType::Exit;
        }
    }
}

fn add_features(region: &mut Region, role: RoomType) {
    let features: &[SpecialFeature] = match role {
        RoomType::Boss => &[SpecialFeature::BossAltar, SpecialFeature::DarkAura],
        RoomType::Treasure => &[SpecialFeature::TreasureChest, SpecialFeature::MagicalGlow],
        RoomType::Trap => &[SpecialFeature::TrapMechanism, SpecialFeature::WarningSigns],
        _ => &[],
    };
    region.contents.extend(features.iter().map(|f| Content::Feature(*f)));
}

fn roll_traps<R: Rng>(
    region: &mut Region,
    role: RoomType,
    theme: DungeonTheme,
    template: &RoomTemplate,
    s: &DungeonSettings,
    rng: &mut R,
) {
    let armed = role == RoomType::Trap
        || (rng.gen_bool(s.trap_density as f64) && rng.gen_bool(template.trap_chance.clamp(0.0, 1.0) as f64));
    if armed {
        region.contents.push(Content::Trap(theme.pick_trap(rng)));
    }
}

fn roll_loot<R: Rng>(
    region: &mut Region,
    role: RoomType,
    s: &DungeonSettings,
    loot: &mut BTreeMap<LootId, LootContainer>,
    rng: &mut R,
) {
    let guaranteed = matches!(role, RoomType::Treasure | RoomType::Boss);
    if !guaranteed && !rng.gen_bool(s.treasure_density as f64) {
        return;
    }
    let trapped_room = region.traps().next().is_some();
    let roll = LootRoll {
        level: s.level,
        bias: if role == RoomType::Boss { RarityBias::Boss } else { RarityBias::Standard },
        signature_items: treasure_items(role),
        tables: &[],
        trap_chance: if trapped_room { 1.0 } else { 0.2 },
    };
    let id = LootId(loot.len() as u32);
    let container = LootContainer::roll(id, format!("{} cache", role.display_name()), roll, rng);
    loot.insert(id, container);
    region.contents.push(Content::Loot(id));
}

fn roll_enemies<R: Rng>(
    region: &mut Region,
    role: RoomType,
    theme: DungeonTheme,
    template: &RoomTemplate,
    s: &DungeonSettings,
    rng: &mut R,
) {
    let count = enemy_count(role, s.complexity);
    if role == RoomType::Boss {
        for _ in 0..count.max(1) {
            if let Some(kind) = theme.boss_table().choose(rng) {
                region.contents.push(Content::Enemy { kind: kind.to_string(), boss: true });
            }
        }
        return;
    }

    let mut spawn = |rng: &mut R| {
        if let Some(kind) = theme.enemy_table().choose(rng) {
            region.contents.push(Content::Enemy { kind: kind.to_string(), boss: false });
        }
    };
    for _ in 0..count {
        if rng.gen_bool(template.enemy_chance.clamp(0.0, 1.0) as f64) {
            spawn(&mut *rng);
        }
    }
    if role == RoomType::Chamber && rng.gen_bool(s.enemy_density as f64) {
        spawn(&mut *rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelObserver, NullObserver};

    fn generator() -> DungeonGenerator {
        let cache = Arc::new(GenerationCache::with_capacity(32).unwrap());
        DungeonGenerator::new(42, SpatialPlacementPlanner::default(), cache, Arc::new(NullObserver))
    }

    fn small() -> DungeonSettings {
        DungeonSettings { min_rooms: 5, max_rooms: 5, width: 40, height: 40, ..Default::default() }
    }

    #[test]
    fn test_room_type_policy() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(select_room_type(0, 7, &mut rng), RoomType::Entrance);
        assert_eq!(select_room_type(6, 7, &mut rng), RoomType::Exit);
        assert_eq!(select_room_type(3, 7, &mut rng), RoomType::Boss);
        let filler = select_room_type(2, 7, &mut rng);
        assert!(matches!(filler, RoomType::Treasure | RoomType::Trap | RoomType::Chamber));
    }

    #[test]
    fn test_enemy_count_scales_with_complexity() {
        assert_eq!(enemy_count(RoomType::Treasure, 0.5), 3);
        assert_eq!(enemy_count(RoomType::Treasure, 0.9), 4);
        assert_eq!(enemy_count(RoomType::Chamber, 0.1), 1);
        assert_eq!(enemy_count(RoomType::Boss, 0.1), 0);
    }

    #[test]
    fn test_cave_layout_anchors_and_reachability() {
        let layout = generator().build(DungeonTheme::Cave, &small()).unwrap();
        let complex = &layout.complex;
        assert!(complex.regions.len() <= 5);
        assert_eq!(complex.rooms_of(RoomType::Entrance).count(), 1);
        assert_eq!(complex.rooms_of(RoomType::Exit).count(), 1);
        assert!(complex.is_fully_connected());
        assert!(complex.regions_disjoint());
    }

    #[test]
    fn test_all_themes_produce_valid_layouts() {
        let gen = generator();
        for (i, theme) in DungeonTheme::all().iter().enumerate() {
            let settings = DungeonSettings { seed: i as u64, ..Default::default() };
            let complex = gen.build(*theme, &settings).unwrap().complex;
            assert!(complex.is_fully_connected(), "{theme}");
            assert!(complex.regions_disjoint(), "{theme}");
            if let Some(boss) = complex.boss {
                let region = complex.region(boss).unwrap();
                assert!(region.contents.iter().any(|c| matches!(c, Content::Enemy { boss: true, .. })));
                assert!(region.loot().next().is_some());
                assert!(region.has_feature(SpecialFeature::BossAltar));
            }
        }
    }

    #[test]
    fn test_same_seed_same_layout() {
        let a = generator().build(DungeonTheme::Crypt, &small()).unwrap().complex;
        let b = generator().build(DungeonTheme::Crypt, &small()).unwrap().complex;
        assert_eq!(a.regions, b.regions);
        assert_eq!(a.paths, b.paths);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_treasure_rooms_always_hold_loot() {
        let gen = generator();
        for seed in 0..5 {
            let settings = DungeonSettings { seed, treasure_density: 0.0, ..Default::default() };
            let complex = gen.build(DungeonTheme::Temple, &settings).unwrap().complex;
            for room in complex.rooms_of(RoomType::Treasure) {
                assert!(room.loot().next().is_some());
            }
        }
    }

    #[test]
    fn test_crowded_grid_reports_shortfall() {
        let (observer, rx) = ChannelObserver::bounded(8);
        let cache = Arc::new(GenerationCache::with_capacity(8).unwrap());
        let gen = DungeonGenerator::new(1, SpatialPlacementPlanner::new(5).unwrap(), cache, Arc::new(observer));
        let settings = DungeonSettings {
            width: 12,
            height: 12,
            min_rooms: 20,
            max_rooms: 20,
            room_min_size: 3,
            room_max_size: 4,
            ..Default::default()
        };
        let complex = gen.generate(DungeonTheme::Maze, &settings).unwrap();
        assert!(complex.regions.len() < 20);
        assert!(complex.is_fully_connected());
        assert_eq!(gen.stats().shortfalls, 1);
        assert!(rx.try_iter().any(|e| matches!(e, GenerationEvent::PlacementShortfall { requested: 20, .. })));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let gen = generator();
        let bad = DungeonSettings { min_rooms: 6, max_rooms: 3, ..Default::default() };
        assert!(matches!(gen.generate(DungeonTheme::Cave, &bad), Err(GenerationError::InvalidParameter { .. })));
        let bad = DungeonSettings { trap_density: 2.0, ..Default::default() };
        assert!(gen.generate(DungeonTheme::Cave, &bad).is_err());
        let bad = DungeonSettings { room_max_size: 80, ..Default::default() };
        assert!(gen.generate(DungeonTheme::Cave, &bad).is_err());
        let bad = DungeonSettings { level: 100_000_000, ..small() };
        assert!(matches!(gen.generate(DungeonTheme::Cave, &bad), Err(GenerationError::InvalidParameter { .. })));
        let top = DungeonSettings { level: MAX_LEVEL, ..small() };
        assert!(gen.generate(DungeonTheme::Cave, &top).is_ok());
    }

    #[test]
    fn test_generate_registers_and_tracks_overlay() {
        let gen = generator();
        let complex = gen.generate(DungeonTheme::Cave, &small()).unwrap();
        let again = gen.generate(DungeonTheme::Cave, &small()).unwrap();
        assert!(Arc::ptr_eq(&complex, &again));
        assert_eq!(gen.registered(), 1);

        assert!(gen.mark_cleared(complex.id, complex.entrance));
        assert!(!gen.mark_explored(complex.id, RegionId(999)));
        let overlay = gen.overlay(complex.id).unwrap();
        assert!(overlay.explored.contains(&complex.entrance));
        assert!(overlay.cleared.contains(&complex.entrance));
        assert!(gen.get_dungeon(complex.id).is_some());
    }

    #[test]
    fn test_evicted_requests_reuse_registered_layout() {
        let cache = Arc::new(GenerationCache::with_capacity(1).unwrap());
        let gen = DungeonGenerator::new(42, SpatialPlacementPlanner::default(), cache.clone(), Arc::new(NullObserver));
        let a = small();
        let b = DungeonSettings { seed: 9, ..small() };
        let first = gen.generate(DungeonTheme::Cave, &a).unwrap();
        for _ in 0..50 {
            gen.generate(DungeonTheme::Cave, &a).unwrap();
            gen.generate(DungeonTheme::Cave, &b).unwrap();
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(gen.registered(), 2);
        assert_eq!(gen.stats().dungeons_generated, 2);
        assert_eq!(gen.generate(DungeonTheme::Cave, &a).unwrap().id, first.id);
    }

    #[test]
    fn test_traps_come_from_theme_pool() {
        let gen = generator();
        let settings = DungeonSettings { trap_density: 1.0, ..small() };
        let complex = gen.build(DungeonTheme::Laboratory, &settings).unwrap().complex;
        let pool = DungeonTheme::Laboratory.trap_pool();
        let room_traps = complex.regions.values().flat_map(|r| r.traps());
        let corridor_traps = complex.paths.values().flat_map(|p| p.traps.iter().copied());
        let all: Vec<TrapKind> = room_traps.chain(corridor_traps).collect();
        assert!(!all.is_empty());
        assert!(all.iter().all(|t| pool.contains(t)));
    }

    #[test]
    fn test_theme_parse() {
        assert_eq!("Crypt".parse::<DungeonTheme>().unwrap(), DungeonTheme::Crypt);
        assert!("swamp".parse::<DungeonTheme>().is_err());
    }
}
