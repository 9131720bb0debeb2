//! Seed management for world generation
//!
//! Every generator gets its own seed derived from the world seed, and every
//! generation call derives a call-local seed from its request parameters.
//! Nothing here holds state: two calls with the same inputs always agree.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Seeds for each generation system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSeeds {
    /// Master seed (used for display/reference)
    pub master: u64,
    /// Terrain elevation layers
    pub heightmap: u64,
    /// Temperature and humidity fields
    pub climate: u64,
    /// Erosion relaxation pass
    pub erosion: u64,
    /// Dungeon layouts
    pub dungeons: u64,
    /// Settlement layouts
    pub settlements: u64,
    /// Standalone structure scatter
    pub structures: u64,
}

impl GenerationSeeds {
    /// Derive all sub-seeds deterministically from a master seed.
    pub fn from_master(master: u64) -> Self {
        Self {
            master,
            heightmap: derive_seed(master, "heightmap"),
            climate: derive_seed(master, "climate"),
            erosion: derive_seed(master, "erosion"),
            dungeons: derive_seed(master, "dungeons"),
            settlements: derive_seed(master, "settlements"),
            structures: derive_seed(master, "structures"),
        }
    }
}

/// Derive a sub-seed from a master seed and a system name.
pub fn derive_seed(master: u64, system: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    master.hash(&mut hasher);
    system.hash(&mut hasher);
    hasher.finish()
}

/// SplitMix64 finalizer. Cheap, stateless and well distributed, used to key
/// noise offsets and RNG streams by coordinates.
pub fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Fold a list of words into a single seed.
pub fn hash_words(seed: u64, words: &[u64]) -> u64 {
    words.iter().fold(mix64(seed), |acc, &w| mix64(acc ^ w))
}

/// Seed for a chunk-local random stream.
pub fn chunk_seed(seed: u64, chunk_x: i32, chunk_y: i32) -> u64 {
    hash_words(seed, &[chunk_x as i64 as u64, chunk_y as i64 as u64])
}

impl std::fmt::Display for GenerationSeeds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GenerationSeeds {{ master: {}, heightmap: {}, climate: {}, erosion: {}, \
             dungeons: {}, settlements: {}, structures: {} }}",
            self.master,
            self.heightmap,
            self.climate,
            self.erosion,
            self.dungeons,
            self.settlements,
            self.structures,
        )
    }
}
