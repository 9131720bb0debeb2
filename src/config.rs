//! Engine configuration
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "seed": 7, "quality": "high", "structures": { "spawn_density": 0.02 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::DEFAULT_MAX_CACHE_SIZE;
use crate::climate::BiomeSettings;
use crate::erosion::{ErosionSettings, GenerationQuality};
use crate::error::{ensure_positive, ConfigError};
use crate::heightmap::HeightMapSettings;
use crate::structures::placement::DEFAULT_MAX_ATTEMPTS;
use crate::structures::StructureSettings;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Master world seed; every subsystem seed is derived from it
    pub seed: u64,
    pub quality: GenerationQuality,
    /// Entries kept by the shared generation cache
    pub cache_capacity: usize,
    /// Attempts per rectangle before a placement slot gives up
    pub max_placement_attempts: usize,
    pub height_map: HeightMapSettings,
    pub biomes: BiomeSettings,
    /// Explicit erosion parameters. Derived from `quality` when absent.
    pub erosion: Option<ErosionSettings>,
    pub structures: StructureSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            quality: GenerationQuality::default(),
            cache_capacity: DEFAULT_MAX_CACHE_SIZE,
            max_placement_attempts: DEFAULT_MAX_ATTEMPTS,
            height_map: HeightMapSettings::default(),
            biomes: BiomeSettings::default(),
            erosion: None,
            structures: StructureSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Default::default() }
    }

    /// Erosion parameters in effect.
    pub fn erosion_settings(&self) -> ErosionSettings {
        self.erosion.clone().unwrap_or_else(|| ErosionSettings::from_quality(self.quality))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("cache_capacity", self.cache_capacity)?;
        ensure_positive("max_placement_attempts", self.max_placement_attempts)?;
        self.height_map.validate()?;
        self.biomes.validate()?;
        self.erosion_settings().validate()?;
        self.structures.validate()?;
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        info!(path = %path.display(), seed = config.seed, quality = %config.quality, "loaded engine config");
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
