//! Climate fields for biome classification
//! Temperature follows a world-space latitude gradient, humidity hovers
//! around a midpoint; both are perturbed by their own noise layer.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_range, ensure_unit, GenerationError, Result};
use crate::heightmap::ChunkCoord;
use crate::noise_field::{NoiseField, NoiseLayerConfig};
use crate::tilemap::Tilemap;

// =============================================================================
// CLIMATE SETTINGS
// =============================================================================

/// Climate and classification parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomeSettings {
    /// (min, max) temperature in Celsius
    pub temperature_range: (f32, f32),
    /// (min, max) humidity
    pub humidity_range: (f32, f32),
    /// World-y distance over which temperature falls from max to min
    pub latitude_span: f64,
    pub temperature_noise_scale: f64,
    /// Degrees added by the temperature noise at full amplitude
    pub temperature_variation: f32,
    pub humidity_noise_scale: f64,
    pub humidity_base: f32,
    pub humidity_variation: f32,
    /// Lowland cells wetter than this become forest
    pub forest_humidity: f32,
    /// High cells colder than this become snow
    pub snow_temperature: f32,
}

impl Default for BiomeSettings {
    fn default() -> Self {
        Self {
            temperature_range: (-30.0, 50.0),
            humidity_range: (0.0, 1.0),
            latitude_span: 4096.0,
            temperature_noise_scale: 100.0,
            temperature_variation: 10.0,
            humidity_noise_scale: 80.0,
            humidity_base: 0.5,
            humidity_variation: 0.3,
            forest_humidity: 0.6,
            snow_temperature: -10.0,
        }
    }
}

impl BiomeSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_range("biome.temperature_range", self.temperature_range.0, self.temperature_range.1)?;
        ensure_range("biome.humidity_range", self.humidity_range.0, self.humidity_range.1)?;
        ensure_unit("biome.humidity_range", self.humidity_range.0)?;
        ensure_unit("biome.humidity_range", self.humidity_range.1)?;
        if !(self.latitude_span > 0.0) {
            return Err(GenerationError::invalid("biome.latitude_span", "must be positive"));
        }
        Ok(())
    }
}

// =============================================================================
// CLIMATE MODEL
// =============================================================================

const TEMPERATURE_LAYER: u32 = 100;
const HUMIDITY_LAYER: u32 = 101;

/// Temperature and humidity samplers for one world seed.
#[derive(Clone)]
pub struct ClimateModel {
    settings: BiomeSettings,
    temperature_noise: NoiseField,
    humidity_noise: NoiseField,
}

impl ClimateModel {
    pub fn new(seed: u64, settings: BiomeSettings) -> Result<Self> {
        settings.validate()?;
        let temperature_noise = NoiseField::new(
            seed,
            TEMPERATURE_LAYER,
            NoiseLayerConfig::new(settings.temperature_noise_scale, 2, 0.5, 2.0, 0),
        )?;
        let humidity_noise = NoiseField::new(
            seed,
            HUMIDITY_LAYER,
            NoiseLayerConfig::new(settings.humidity_noise_scale, 3, 0.5, 2.0, 0),
        )?;
        Ok(Self { settings, temperature_noise, humidity_noise })
    }

    pub fn settings(&self) -> &BiomeSettings {
        &self.settings
    }

    /// Latitude gradient without noise.
    pub fn base_temperature(&self, world_y: f64) -> f32 {
        let (min, max) = self.settings.temperature_range;
        let t = (world_y.abs() / self.settings.latitude_span).clamp(0.0, 1.0) as f32;
        max - (max - min) * t
    }

    pub fn temperature_at(&self, world_x: f64, world_y: f64) -> f32 {
        let (min, max) = self.settings.temperature_range;
        let noise = self.temperature_noise.evaluate(world_x, world_y) as f32;
        (self.base_temperature(world_y) + noise * self.settings.temperature_variation).clamp(min, max)
    }

    pub fn humidity_at(&self, world_x: f64, world_y: f64) -> f32 {
        let (min, max) = self.settings.humidity_range;
        let noise = self.humidity_noise.evaluate(world_x, world_y) as f32;
        (self.settings.humidity_base + noise * self.settings.humidity_variation).clamp(min, max)
    }

    /// Temperature and humidity grids for a chunk.
    pub fn generate(&self, chunk: ChunkCoord, size: usize) -> (Tilemap<f32>, Tilemap<f32>) {
        let mut temperature = Tilemap::new(size, size);
        let mut humidity = Tilemap::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let (wx, wy) = chunk.world_position(x, y, size);
                temperature.set(x, y, self.temperature_at(wx, wy));
                humidity.set(x, y, self.humidity_at(wx, wy));
            }
        }
        (temperature, humidity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_falls_with_latitude() {
        let climate = ClimateModel::new(42, BiomeSettings::default()).unwrap();
        assert_eq!(climate.base_temperature(0.0), 50.0);
        assert_eq!(climate.base_temperature(-4096.0), -30.0);
        assert_eq!(climate.base_temperature(1_000_000.0), -30.0);
        assert!(climate.base_temperature(1000.0) > climate.base_temperature(2000.0));
    }

    #[test]
    fn test_fields_stay_in_range() {
        let climate = ClimateModel::new(7, BiomeSettings::default()).unwrap();
        let (temperature, humidity) = climate.generate(ChunkCoord::new(3, -90), 16);
        assert!(temperature.iter().all(|(_, _, t)| (-30.0..=50.0).contains(t)));
        assert!(humidity.iter().all(|(_, _, h)| (0.0..=1.0).contains(h)));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let settings = BiomeSettings { temperature_range: (10.0, -10.0), ..Default::default() };
        assert!(ClimateModel::new(1, settings).is_err());
        let settings = BiomeSettings { humidity_range: (0.0, 1.5), ..Default::default() };
        assert!(ClimateModel::new(1, settings).is_err());
        let settings = BiomeSettings { humidity_range: (-0.2, 0.5), ..Default::default() };
        assert!(settings.validate().is_err());
        let settings = BiomeSettings { humidity_range: (0.2, 0.8), ..Default::default() };
        assert!(settings.validate().is_ok());
    }
}
