//! Layered coherent noise.
//!
//! A [`NoiseField`] is a pure function of `(x, y)` once built: octave offsets
//! are derived from a coordinate-free hash of `(seed, layer, octave)` up
//! front, so evaluation never touches shared random state and neighbouring
//! chunks sample one continuous field.

use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};
use crate::seeds::hash_words;

/// Range of the per-octave domain offset, in noise units.
const OCTAVE_OFFSET_RANGE: f64 = 1000.0;

/// Parameters for one noise layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseLayerConfig {
    /// World units per noise unit (higher = broader features)
    pub scale: f64,
    /// Number of octaves summed
    pub octaves: u32,
    /// Amplitude decay per octave
    pub persistence: f64,
    /// Frequency multiplier per octave
    pub lacunarity: f64,
    /// Mixed into the seed so two layers with equal params still differ
    pub seed_offset: u64,
    /// Multiplier applied by [`NoiseField::sample`]
    #[serde(default = "unit_amplitude")]
    pub amplitude: f64,
}

fn unit_amplitude() -> f64 {
    1.0
}

impl NoiseLayerConfig {
    pub fn new(scale: f64, octaves: u32, persistence: f64, lacunarity: f64, seed_offset: u64) -> Self {
        Self { scale, octaves, persistence, lacunarity, seed_offset, amplitude: 1.0 }
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.scale > 0.0) {
            return Err(GenerationError::invalid("noise.scale", format!("{} must be positive", self.scale)));
        }
        if self.octaves == 0 {
            return Err(GenerationError::invalid("noise.octaves", "need at least one octave"));
        }
        if !(self.persistence > 0.0) || !(self.lacunarity > 0.0) {
            return Err(GenerationError::invalid(
                "noise.persistence",
                "persistence and lacunarity must be positive",
            ));
        }
        if !self.amplitude.is_finite() {
            return Err(GenerationError::invalid("noise.amplitude", "amplitude must be finite"));
        }
        Ok(())
    }
}

/// Deterministic fractal Perlin field.
#[derive(Clone)]
pub struct NoiseField {
    config: NoiseLayerConfig,
    basis: Perlin,
    offsets: Vec<(f64, f64)>,
    /// Sum of octave amplitudes, used to normalize into [-1, 1]
    amplitude_sum: f64,
}

impl NoiseField {
    pub fn new(seed: u64, layer_index: u32, config: NoiseLayerConfig) -> Result<Self> {
        config.validate()?;
        let layer_seed = hash_words(seed ^ config.seed_offset, &[layer_index as u64]);
        let basis = Perlin::new(layer_seed as u32);

        let offsets = (0..config.octaves)
            .map(|octave| {
                let h = hash_words(layer_seed, &[octave as u64]);
                let ox = (h & 0xFFFF_FFFF) as f64 / u32::MAX as f64 * OCTAVE_OFFSET_RANGE;
                let oy = (h >> 32) as f64 / u32::MAX as f64 * OCTAVE_OFFSET_RANGE;
                (ox, oy)
            })
            .collect();

        let amplitude_sum = (0..config.octaves).map(|i| config.persistence.powi(i as i32)).sum();

        Ok(Self { config, basis, offsets, amplitude_sum })
    }

    pub fn config(&self) -> &NoiseLayerConfig {
        &self.config
    }

    /// Sample the field at world coordinates. Always in [-1, 1].
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let nx = x / self.config.scale;
        let ny = y / self.config.scale;

        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        for &(ox, oy) in &self.offsets {
            total += amplitude * self.basis.get([nx * frequency + ox, ny * frequency + oy]);
            amplitude *= self.config.persistence;
            frequency *= self.config.lacunarity;
        }

        (total / self.amplitude_sum).clamp(-1.0, 1.0)
    }

    /// [`evaluate`](Self::evaluate) scaled by the layer amplitude.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        self.evaluate(x, y) * self.config.amplitude
    }
}
