//! Procedural world generation library
//!
//! Terrain chunks, dungeons, settlements and scattered structures behind a
//! single cached, thread-safe engine. Re-exports modules for use by
//! binaries and tools.

pub mod ascii;
pub mod biomes;
pub mod cache;
pub mod climate;
pub mod config;
pub mod engine;
pub mod erosion;
pub mod error;
pub mod events;
pub mod export;
pub mod heightmap;
pub mod noise_field;
pub mod seeds;
pub mod structures;
pub mod tilemap;

pub use config::EngineConfig;
pub use engine::{EngineStats, WorldGenEngine};
pub use error::{ConfigError, GenerationError, Result};
pub use events::{GenerationEvent, GenerationObserver};
pub use heightmap::{ChunkCoord, HeightGrid};
