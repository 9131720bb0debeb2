//! Biome classification from elevation, temperature and humidity

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::climate::BiomeSettings;
use crate::heightmap::{ChunkCoord, HeightMapSettings};
use crate::tilemap::Tilemap;

/// Terrain biome of a single cell.
///
/// `Water` and `Desert` are part of the vocabulary shared with renderers and
/// loaders but the elevation rule below never assigns them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Biome {
    Water,
    Beach,
    Grassland,
    Forest,
    Hills,
    Mountains,
    Snow,
    Desert,
}

impl Biome {
    pub fn all() -> &'static [Biome] {
        &[
            Biome::Water,
            Biome::Beach,
            Biome::Grassland,
            Biome::Forest,
            Biome::Hills,
            Biome::Mountains,
            Biome::Snow,
            Biome::Desert,
        ]
    }

    /// RGB color for image export.
    pub fn color(&self) -> (u8, u8, u8) {
        match self {
            Biome::Water => (40, 90, 180),
            Biome::Beach => (230, 215, 160),
            Biome::Grassland => (120, 180, 80),
            Biome::Forest => (40, 110, 50),
            Biome::Hills => (140, 130, 90),
            Biome::Mountains => (120, 110, 105),
            Biome::Snow => (245, 245, 250),
            Biome::Desert => (220, 190, 120),
        }
    }

    pub fn ascii_char(&self) -> char {
        match self {
            Biome::Water => '~',
            Biome::Beach => '.',
            Biome::Grassland => '"',
            Biome::Forest => 'T',
            Biome::Hills => 'n',
            Biome::Mountains => '^',
            Biome::Snow => '*',
            Biome::Desert => ':',
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Biome::Water => "Water",
            Biome::Beach => "Beach",
            Biome::Grassland => "Grassland",
            Biome::Forest => "Forest",
            Biome::Hills => "Hills",
            Biome::Mountains => "Mountains",
            Biome::Snow => "Snow",
            Biome::Desert => "Desert",
        }
    }
}

impl std::fmt::Display for Biome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Classify one cell.
pub fn classify(
    height: f32,
    temperature: f32,
    humidity: f32,
    terrain: &HeightMapSettings,
    climate: &BiomeSettings,
) -> Biome {
    let span = terrain.max_height - terrain.min_height;
    let normalized = if span > 0.0 { (height - terrain.min_height) / span } else { 0.0 };

    if normalized < terrain.beach_width {
        Biome::Beach
    } else if normalized < terrain.hill_threshold {
        if humidity > climate.forest_humidity {
            Biome::Forest
        } else {
            Biome::Grassland
        }
    } else if normalized < terrain.mountain_threshold {
        Biome::Hills
    } else if temperature < climate.snow_temperature {
        Biome::Snow
    } else {
        Biome::Mountains
    }
}

/// Biomes for one chunk, with the climate fields they were derived from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiomeGrid {
    pub chunk: ChunkCoord,
    pub biomes: Tilemap<Biome>,
    pub temperature: Tilemap<f32>,
    pub humidity: Tilemap<f32>,
}

impl BiomeGrid {
    pub fn size(&self) -> usize {
        self.biomes.width
    }

    pub fn get(&self, x: usize, y: usize) -> Biome {
        *self.biomes.get(x, y)
    }

    /// Cell count per biome, omitting biomes that do not occur.
    pub fn histogram(&self) -> BTreeMap<Biome, usize> {
        let mut counts = BTreeMap::new();
        for (_, _, biome) in self.biomes.iter() {
            *counts.entry(*biome).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_default(height: f32, temperature: f32, humidity: f32) -> Biome {
        classify(height, temperature, humidity, &HeightMapSettings::default(), &BiomeSettings::default())
    }

    #[test]
    fn test_elevation_bands() {
        // range is [-100, 1000]: beach < -45, hills from 340, mountains from 670
        assert_eq!(classify_default(-100.0, 20.0, 0.5), Biome::Beach);
        assert_eq!(classify_default(100.0, 20.0, 0.5), Biome::Grassland);
        assert_eq!(classify_default(100.0, 20.0, 0.7), Biome::Forest);
        assert_eq!(classify_default(500.0, 20.0, 0.9), Biome::Hills);
        assert_eq!(classify_default(900.0, 20.0, 0.5), Biome::Mountains);
        assert_eq!(classify_default(900.0, -20.0, 0.5), Biome::Snow);
    }

    #[test]
    fn test_rule_never_yields_water_or_desert() {
        for h in (-100..=1000).step_by(10) {
            for t in [-30.0, -10.0, 0.0, 50.0] {
                for hum in [0.0, 0.6, 1.0] {
                    let b = classify_default(h as f32, t, hum);
                    assert!(b != Biome::Water && b != Biome::Desert);
                }
            }
        }
    }
}
