//! Layout types shared by the complex generators
//!
//! Regions (rooms, buildings, towers) are axis-aligned rectangles on an
//! occupancy grid, joined by orthogonal paths. A finished layout is a
//! [`GeneratedComplex`]; it never changes after generation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::dungeon::{DungeonSettings, DungeonTheme};
use super::loot::LootContainer;
use super::settlement::{SettlementSettings, SettlementStats, SettlementTier};
use crate::error::{GenerationError, Result};
use crate::tilemap::Tilemap;

// =============================================================================
// GEOMETRY
// =============================================================================

/// Axis-aligned rectangle in grid cells (top-left origin).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    /// One past the last column.
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    /// One past the last row.
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    pub fn center(&self) -> (usize, usize) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }

    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.y..self.bottom()).flat_map(move |y| (self.x..self.right()).map(move |x| (x, y)))
    }
}

/// Inclusive range of rectangle edge lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: usize,
    pub max: usize,
}

impl SizeRange {
    pub fn new(min: usize, max: usize) -> Result<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    pub const fn fixed(size: usize) -> Self {
        Self { min: size, max: size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min == 0 {
            return Err(GenerationError::invalid("size_range", "sizes must be positive"));
        }
        if self.min > self.max {
            return Err(GenerationError::invalid(
                "size_range",
                format!("empty range {}..={}", self.min, self.max),
            ));
        }
        Ok(())
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        rng.gen_range(self.min..=self.max)
    }
}

// =============================================================================
// OCCUPANCY
// =============================================================================

/// What occupies a grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellTag {
    #[default]
    Free,
    Region,
    Path,
    Wall,
    Gate,
}

/// Bounded grid of cell tags for one complex.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    cells: Tilemap<CellTag>,
}

impl OccupancyGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self { cells: Tilemap::new(width, height) }
    }

    pub fn width(&self) -> usize {
        self.cells.width
    }

    pub fn height(&self) -> usize {
        self.cells.height
    }

    pub fn get(&self, x: usize, y: usize) -> CellTag {
        *self.cells.get(x, y)
    }

    pub fn set(&mut self, x: usize, y: usize, tag: CellTag) {
        self.cells.set(x, y, tag);
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        self.cells.in_bounds(x, y)
    }

    /// Whether the rect lies entirely inside the grid.
    pub fn fits(&self, rect: &Rect) -> bool {
        rect.width > 0 && rect.height > 0 && rect.right() <= self.width() && rect.bottom() <= self.height()
    }

    /// Whether the rect lies inside the grid and every cell is `Free`.
    pub fn is_free(&self, rect: &Rect) -> bool {
        self.fits(rect) && rect.cells().all(|(x, y)| self.get(x, y) == CellTag::Free)
    }

    pub fn fill(&mut self, rect: &Rect, tag: CellTag) {
        for (x, y) in rect.cells() {
            self.set(x, y, tag);
        }
    }

    pub fn count(&self, tag: CellTag) -> usize {
        self.cells.as_slice().iter().filter(|t| **t == tag).count()
    }

    pub fn tiles(&self) -> &Tilemap<CellTag> {
        &self.cells
    }
}

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Region index inside one complex
    RegionId, "R"
);
id_type!(
    /// Path index inside one complex
    PathId, "P"
);
id_type!(
    /// Loot container index inside one complex or structure
    LootId, "L"
);
id_type!(ResidentId, "res");

static NEXT_COMPLEX_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a generated complex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComplexId(pub u64);

impl ComplexId {
    pub fn next() -> Self {
        Self(NEXT_COMPLEX_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ComplexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// REGIONS
// =============================================================================

/// Role of a dungeon room
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoomType {
    Entrance,
    Chamber,
    Treasure,
    Trap,
    Boss,
    Exit,
}

impl RoomType {
    pub fn display_name(&self) -> &'static str {
        match self {
            RoomType::Entrance => "entrance",
            RoomType::Chamber => "chamber",
            RoomType::Treasure => "treasure",
            RoomType::Trap => "trap",
            RoomType::Boss => "boss",
            RoomType::Exit => "exit",
        }
    }
}

/// Settlement building kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildingType {
    House,
    Shop,
    Blacksmith,
    Tavern,
    Temple,
    TownHall,
    Warehouse,
    Stable,
    Farm,
    Library,
    Academy,
    Barracks,
    Tower,
}

impl BuildingType {
    /// Buildings joined by the civic road network.
    pub fn is_civic(&self) -> bool {
        matches!(self, BuildingType::TownHall | BuildingType::Temple | BuildingType::Tavern)
    }

    pub fn is_defense(&self) -> bool {
        matches!(self, BuildingType::Tower | BuildingType::Barracks)
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, BuildingType::Shop | BuildingType::Warehouse | BuildingType::Tavern)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BuildingType::House => "house",
            BuildingType::Shop => "shop",
            BuildingType::Blacksmith => "blacksmith",
            BuildingType::Tavern => "tavern",
            BuildingType::Temple => "temple",
            BuildingType::TownHall => "town hall",
            BuildingType::Warehouse => "warehouse",
            BuildingType::Stable => "stable",
            BuildingType::Farm => "farm",
            BuildingType::Library => "library",
            BuildingType::Academy => "academy",
            BuildingType::Barracks => "barracks",
            BuildingType::Tower => "tower",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    Room(RoomType),
    Building(BuildingType),
}

impl RegionKind {
    pub fn room(&self) -> Option<RoomType> {
        match self {
            RegionKind::Room(room) => Some(*room),
            RegionKind::Building(_) => None,
        }
    }

    pub fn building(&self) -> Option<BuildingType> {
        match self {
            RegionKind::Building(building) => Some(*building),
            RegionKind::Room(_) => None,
        }
    }
}

impl std::fmt::Display for RegionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionKind::Room(room) => f.write_str(room.display_name()),
            RegionKind::Building(building) => f.write_str(building.display_name()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrapKind {
    SpikePit,
    PoisonDart,
    FallingCeiling,
    FireTrap,
    IceTrap,
    ElectricTrap,
    TeleportTrap,
    CurseTrap,
}

impl TrapKind {
    pub const ALL: [TrapKind; 8] = [
        TrapKind::SpikePit,
        TrapKind::PoisonDart,
        TrapKind::FallingCeiling,
        TrapKind::FireTrap,
        TrapKind::IceTrap,
        TrapKind::ElectricTrap,
        TrapKind::TeleportTrap,
        TrapKind::CurseTrap,
    ];

    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// Decorative or mechanical feature attached to a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialFeature {
    BossAltar,
    DarkAura,
    TreasureChest,
    MagicalGlow,
    TrapMechanism,
    WarningSigns,
}

/// Typed reference to something inside a region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Content {
    Enemy { kind: String, boss: bool },
    Trap(TrapKind),
    Loot(LootId),
    Resident(ResidentId),
    Feature(SpecialFeature),
}

/// A placed room or building.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub rect: Rect,
    pub kind: RegionKind,
    pub level: u32,
    pub condition: f32,
    pub connections: BTreeSet<RegionId>,
    pub contents: Vec<Content>,
}

impl Region {
    pub fn new(id: RegionId, rect: Rect, kind: RegionKind) -> Self {
        Self {
            id,
            rect,
            kind,
            level: 1,
            condition: 1.0,
            connections: BTreeSet::new(),
            contents: Vec::new(),
        }
    }

    pub fn center(&self) -> (usize, usize) {
        self.rect.center()
    }

    pub fn enemies(&self) -> impl Iterator<Item = &str> {
        self.contents.iter().filter_map(|c| match c {
            Content::Enemy { kind, .. } => Some(kind.as_str()),
            _ => None,
        })
    }

    pub fn traps(&self) -> impl Iterator<Item = TrapKind> + '_ {
        self.contents.iter().filter_map(|c| match c {
            Content::Trap(trap) => Some(*trap),
            _ => None,
        })
    }

    pub fn loot(&self) -> impl Iterator<Item = LootId> + '_ {
        self.contents.iter().filter_map(|c| match c {
            Content::Loot(id) => Some(*id),
            _ => None,
        })
    }

    pub fn resident_count(&self) -> usize {
        self.contents.iter().filter(|c| matches!(c, Content::Resident(_))).count()
    }

    pub fn has_feature(&self, feature: SpecialFeature) -> bool {
        self.contents.contains(&Content::Feature(feature))
    }
}

// =============================================================================
// PATHS
// =============================================================================

/// Where a path starts or ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Region(RegionId),
    Cell { x: usize, y: usize },
}

impl Endpoint {
    pub fn region(&self) -> Option<RegionId> {
        match self {
            Endpoint::Region(id) => Some(*id),
            Endpoint::Cell { .. } => None,
        }
    }
}

/// Settlement road surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadKind {
    Dirt,
    Cobblestone,
    Paved,
}

impl RoadKind {
    /// Surface of the main road.
    pub fn main_road(wealth: f32) -> Self {
        if wealth > 0.5 {
            RoadKind::Paved
        } else {
            RoadKind::Cobblestone
        }
    }

    /// Surface of roads between civic buildings.
    pub fn civic_road(wealth: f32) -> Self {
        if wealth > 0.3 {
            RoadKind::Cobblestone
        } else {
            RoadKind::Dirt
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathKind {
    Corridor,
    Road(RoadKind),
}

/// An orthogonal polyline between two endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub id: PathId,
    pub from: Endpoint,
    pub to: Endpoint,
    pub cells: Vec<(usize, usize)>,
    pub width: usize,
    pub kind: PathKind,
    pub traps: Vec<TrapKind>,
}

impl Path {
    /// Whether this path joins two regions (and so counts for reachability).
    pub fn region_edge(&self) -> Option<(RegionId, RegionId)> {
        Some((self.from.region()?, self.to.region()?))
    }

    pub fn touches(&self, region: RegionId) -> bool {
        self.from.region() == Some(region) || self.to.region() == Some(region)
    }
}

// =============================================================================
// COMPLEXES
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ComplexKind {
    Dungeon {
        theme: DungeonTheme,
        settings: DungeonSettings,
    },
    Settlement {
        tier: SettlementTier,
        settings: SettlementSettings,
        stats: SettlementStats,
        walls: Vec<(usize, usize)>,
        gates: Vec<(usize, usize)>,
    },
}

/// A finished dungeon or settlement layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedComplex {
    pub id: ComplexId,
    pub kind: ComplexKind,
    pub regions: BTreeMap<RegionId, Region>,
    pub paths: BTreeMap<PathId, Path>,
    pub loot: BTreeMap<LootId, LootContainer>,
    pub entrance: RegionId,
    pub exit: RegionId,
    pub boss: Option<RegionId>,
    pub occupancy: OccupancyGrid,
}

impl GeneratedComplex {
    pub fn label(&self) -> String {
        match &self.kind {
            ComplexKind::Dungeon { theme, .. } => format!("{theme} dungeon {}", self.id),
            ComplexKind::Settlement { tier, .. } => format!("{tier} {}", self.id),
        }
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn rooms_of(&self, room: RoomType) -> impl Iterator<Item = &Region> {
        self.regions.values().filter(move |r| r.kind == RegionKind::Room(room))
    }

    pub fn buildings_of(&self, building: BuildingType) -> impl Iterator<Item = &Region> {
        self.regions.values().filter(move |r| r.kind == RegionKind::Building(building))
    }

    pub fn settlement_stats(&self) -> Option<&SettlementStats> {
        match &self.kind {
            ComplexKind::Settlement { stats, .. } => Some(stats),
            ComplexKind::Dungeon { .. } => None,
        }
    }

    /// Regions reachable from the entrance over region-to-region paths.
    pub fn reachable(&self) -> BTreeSet<RegionId> {
        super::connectivity::reachable_from(self.entrance, &self.regions, &self.paths)
    }

    pub fn is_fully_connected(&self) -> bool {
        self.reachable().len() == self.regions.len()
    }

    /// No two region rects overlap.
    pub fn regions_disjoint(&self) -> bool {
        let regions: Vec<&Region> = self.regions.values().collect();
        regions
            .iter()
            .enumerate()
            .all(|(i, a)| regions[i + 1..].iter().all(|b| !a.rect.intersects(&b.rect)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 4, 4);
        assert!(a.intersects(&Rect::new(3, 3, 2, 2)));
        assert!(!a.intersects(&Rect::new(4, 0, 2, 2)));
        assert!(!a.intersects(&Rect::new(0, 4, 2, 2)));
        assert_eq!(a.cells().count(), 16);
        assert_eq!(a.center(), (2, 2));
    }

    #[test]
    fn test_size_range_validation() {
        assert!(SizeRange::new(0, 3).is_err());
        assert!(SizeRange::new(5, 3).is_err());
        assert!(SizeRange::new(3, 3).is_ok());
    }

    #[test]
    fn test_occupancy_free_check() {
        let mut grid = OccupancyGrid::new(10, 10);
        let rect = Rect::new(2, 2, 3, 3);
        assert!(grid.is_free(&rect));
        grid.fill(&rect, CellTag::Region);
        assert!(!grid.is_free(&Rect::new(4, 4, 2, 2)));
        assert!(!grid.is_free(&Rect::new(8, 8, 3, 3)));
        assert_eq!(grid.count(CellTag::Region), 9);
    }
}
