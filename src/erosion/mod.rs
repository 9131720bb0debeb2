//! Stochastic erosion relaxation
//!
//! A cheap stand-in for hydraulic erosion: random cells shed material to
//! their lowest neighbour, and the whole grid decays slightly at a fixed
//! cadence. The caller owns the RNG, so a pass seeded from the chunk
//! coordinates always produces the same terrain.

pub mod params;

pub use params::{ErosionSettings, GenerationQuality};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tilemap::Tilemap;

/// Upper bound on the share of a height difference moved in one visit.
const MAX_TRANSFER_FRACTION: f32 = 0.5;

/// Statistics from one erosion pass
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErosionStats {
    /// Total material removed from visited cells
    pub total_eroded: f64,
    /// Total material added to lower neighbours
    pub total_deposited: f64,
    /// Number of iterations run
    pub iterations: usize,
    /// Iterations that actually moved material
    pub transfers: usize,
    /// Number of whole-grid evaporation passes
    pub evaporation_passes: usize,
    /// Largest single removal
    pub max_erosion: f32,
}

impl ErosionStats {
    pub fn summary(&self) -> String {
        format!(
            "{} iterations, {} transfers, eroded {:.2}, deposited {:.2}, {} evaporation passes",
            self.iterations, self.transfers, self.total_eroded, self.total_deposited, self.evaporation_passes
        )
    }
}

#[derive(Clone, Debug)]
pub struct ErosionSimulator {
    settings: ErosionSettings,
}

impl ErosionSimulator {
    pub fn new(settings: ErosionSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &ErosionSettings {
        &self.settings
    }

    /// Relax `heights` in place.
    pub fn erode<R: Rng>(&self, heights: &mut Tilemap<f32>, rng: &mut R) -> ErosionStats {
        let mut stats = ErosionStats::default();
        if heights.width == 0 || heights.height == 0 {
            return stats;
        }

        let s = &self.settings;
        for iteration in 0..s.iterations {
            let x = rng.gen_range(0..heights.width);
            let y = rng.gen_range(0..heights.height);
            let current = *heights.get(x, y);

            let lowest = heights
                .neighbors(x, y)
                .into_iter()
                .map(|(nx, ny)| (nx, ny, *heights.get(nx, ny)))
                .min_by(|a, b| a.2.total_cmp(&b.2));

            if let Some((nx, ny, neighbour)) = lowest {
                if current > neighbour {
                    let diff = current - neighbour;
                    let transfer = (diff * s.erosion_rate).min(diff * MAX_TRANSFER_FRACTION);
                    let deposit = transfer * s.deposition_rate;

                    *heights.get_mut(x, y) -= transfer;
                    *heights.get_mut(nx, ny) += deposit;

                    stats.total_eroded += transfer as f64;
                    stats.total_deposited += deposit as f64;
                    stats.max_erosion = stats.max_erosion.max(transfer);
                    stats.transfers += 1;
                }
            }

            if iteration % s.evaporation_interval == 0 {
                heights.scale_all(1.0 - s.evaporation_rate);
                stats.evaporation_passes += 1;
            }
            stats.iterations += 1;
        }

        stats
    }
}
