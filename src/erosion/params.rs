//! Erosion settings and the quality presets that scale them

use serde::{Deserialize, Serialize};

use crate::error::{ensure_unit, GenerationError, Result};

/// Generation quality preset. Scales the erosion iteration count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationQuality {
    /// Fast previews
    Low,
    /// Balanced
    #[default]
    Medium,
    /// More relaxation passes
    High,
    /// Slowest, smoothest terrain
    Ultra,
}

impl GenerationQuality {
    pub fn all() -> &'static [Self] {
        &[Self::Low, Self::Medium, Self::High, Self::Ultra]
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Quick preview (quarter erosion)",
            Self::Medium => "Balanced erosion",
            Self::High => "Double erosion passes",
            Self::Ultra => "Quadruple erosion passes",
        }
    }

    /// Multiplier applied to the base erosion iteration count.
    pub fn iteration_factor(&self) -> f32 {
        match self {
            Self::Low => 0.25,
            Self::Medium => 1.0,
            Self::High => 2.0,
            Self::Ultra => 4.0,
        }
    }
}

impl std::fmt::Display for GenerationQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Ultra => write!(f, "ultra"),
        }
    }
}

impl std::str::FromStr for GenerationQuality {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "ultra" => Ok(Self::Ultra),
            other => Err(GenerationError::invalid("quality", format!("unknown preset '{other}'"))),
        }
    }
}

/// Parameters for the relaxation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionSettings {
    /// Run erosion at all when generating height maps
    pub enabled: bool,
    /// Number of random cells visited
    pub iterations: usize,
    /// Fraction of the height difference removed per visit
    pub erosion_rate: f32,
    /// Fraction of removed material deposited at the lower neighbour
    pub deposition_rate: f32,
    /// Whole-grid decay applied every `evaporation_interval` iterations
    pub evaporation_rate: f32,
    pub evaporation_interval: usize,
}

impl Default for ErosionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            iterations: 1000,
            erosion_rate: 0.1,
            deposition_rate: 0.1,
            evaporation_rate: 0.01,
            evaporation_interval: 100,
        }
    }
}

impl ErosionSettings {
    /// Default settings with the iteration count scaled for a quality preset.
    pub fn from_quality(quality: GenerationQuality) -> Self {
        let base = Self::default();
        Self {
            iterations: (base.iterations as f32 * quality.iteration_factor()).round() as usize,
            ..base
        }
    }

    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_unit("erosion.erosion_rate", self.erosion_rate)?;
        ensure_unit("erosion.deposition_rate", self.deposition_rate)?;
        ensure_unit("erosion.evaporation_rate", self.evaporation_rate)?;
        if self.evaporation_interval == 0 {
            return Err(GenerationError::invalid("erosion.evaporation_interval", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_scales_iterations() {
        assert_eq!(ErosionSettings::from_quality(GenerationQuality::Low).iterations, 250);
        assert_eq!(ErosionSettings::from_quality(GenerationQuality::Medium).iterations, 1000);
        assert_eq!(ErosionSettings::from_quality(GenerationQuality::Ultra).iterations, 4000);
    }

    #[test]
    fn test_quality_parse_roundtrip() {
        for q in GenerationQuality::all() {
            assert_eq!(q.to_string().parse::<GenerationQuality>().unwrap(), *q);
        }
        assert!("extreme".parse::<GenerationQuality>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_rates() {
        let settings = ErosionSettings { erosion_rate: 1.5, ..Default::default() };
        assert!(settings.validate().is_err());
        let settings = ErosionSettings { evaporation_interval: 0, ..Default::default() };
        assert!(settings.validate().is_err());
        assert!(ErosionSettings::default().validate().is_ok());
    }
}
