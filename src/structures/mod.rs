//! Discrete structure generation
//!
//! Everything placed on a bounded grid lives here:
//! - Dungeons: themed room layouts joined by corridors
//! - Settlements: tiered building catalogs on a road network
//! - Scattered structures: ruins and towers spread over world chunks
//!
//! Dungeons and settlements share the same two building blocks, the
//! [`SpatialPlacementPlanner`] for collision-free rectangles and the
//! [`ConnectivityGraphBuilder`] for paths with a reachability guarantee.

pub mod connectivity;
pub mod dungeon;
pub mod loot;
pub mod placement;
pub mod registry;
pub mod scatter;
pub mod settlement;
pub mod types;

pub use connectivity::{ConnectivityGraphBuilder, PathStyle};
pub use dungeon::{DungeonGenerator, DungeonSettings, DungeonTheme};
pub use loot::{LootContainer, LootRarity};
pub use placement::SpatialPlacementPlanner;
pub use registry::ComplexOverlay;
pub use scatter::{GeneratedStructure, StructureGenerator, StructureId, StructureSettings};
pub use settlement::{SettlementGenerator, SettlementSettings, SettlementStats, SettlementTier};
pub use types::{
    BuildingType, CellTag, ComplexId, ComplexKind, GeneratedComplex, OccupancyGrid, Rect, Region, RegionId, RoomType,
};
