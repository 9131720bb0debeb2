use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::biomes::{classify, BiomeGrid};
use crate::cache::{Artifact, CacheKey, GenerationCache};
use crate::climate::{BiomeSettings, ClimateModel};
use crate::erosion::{ErosionSettings, ErosionSimulator, ErosionStats};
use crate::error::{ensure_positive, ensure_range, ensure_unit, GenerationError, Result};
use crate::events::{GenerationEvent, GenerationObserver};
use crate::noise_field::{NoiseField, NoiseLayerConfig};
use crate::seeds::{hash_words, GenerationSeeds};
use crate::tilemap::Tilemap;

// =============================================================================
// LAYER CONSTANTS
// =============================================================================

const MACRO_AMPLITUDE: f64 = 200.0;
const MESO_AMPLITUDE: f64 = 100.0;
const MICRO_AMPLITUDE: f64 = 50.0;
const FRACTAL_AMPLITUDE: f64 = 75.0;

const MESO_OCTAVES: u32 = 3;
const FRACTAL_BANDS: u32 = 4;
const FRACTAL_BAND_OCTAVES: u32 = 2;
/// Weight decay between fractal sub-bands
const FRACTAL_BAND_FALLOFF: f64 = 0.7;

/// Largest chunk edge accepted by the generators
pub const MAX_CHUNK_SIZE: usize = 4096;

// =============================================================================
// CHUNK COORDINATES
// =============================================================================

/// Integer coordinate of a fixed-size tile in the world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// World position of a cell inside this chunk.
    pub fn world_position(&self, cell_x: usize, cell_y: usize, size: usize) -> (f64, f64) {
        (
            self.x as f64 * size as f64 + cell_x as f64,
            self.y as f64 * size as f64 + cell_y as f64,
        )
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// TERRAIN SETTINGS
// =============================================================================

/// Parameters for terrain generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightMapSettings {
    /// World units per noise unit for the broadest layer
    pub scale: f64,
    /// Octaves of the finest layer
    pub octaves: u32,
    /// Amplitude decay per octave (0.0-1.0)
    pub persistence: f64,
    /// Frequency multiplier per octave
    pub lacunarity: f64,
    pub base_height: f32,
    /// Elevation change per world unit of y
    pub global_slope: f32,
    pub min_height: f32,
    pub max_height: f32,
    pub sea_level: f32,
    /// Normalized elevation above which cells are mountains
    pub mountain_threshold: f32,
    /// Normalized elevation above which cells are hills
    pub hill_threshold: f32,
    /// Normalized elevation below which cells are beach
    pub beach_width: f32,
}

impl Default for HeightMapSettings {
    fn default() -> Self {
        Self {
            scale: 50.0,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,
            base_height: 0.0,
            global_slope: 0.01,
            min_height: -100.0,
            max_height: 1000.0,
            sea_level: 0.0,
            mountain_threshold: 0.7,
            hill_threshold: 0.4,
            beach_width: 0.05,
        }
    }
}

impl HeightMapSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.scale > 0.0) {
            return Err(GenerationError::invalid("height_map.scale", "must be positive"));
        }
        if self.octaves == 0 {
            return Err(GenerationError::invalid("height_map.octaves", "need at least one octave"));
        }
        if !(self.min_height < self.max_height) {
            return Err(GenerationError::invalid(
                "height_map.min_height",
                format!("{} must be below max_height {}", self.min_height, self.max_height),
            ));
        }
        ensure_unit("height_map.beach_width", self.beach_width)?;
        ensure_unit("height_map.hill_threshold", self.hill_threshold)?;
        ensure_unit("height_map.mountain_threshold", self.mountain_threshold)?;
        ensure_range("height_map.beach_width", self.beach_width, self.hill_threshold)?;
        ensure_range("height_map.hill_threshold", self.hill_threshold, self.mountain_threshold)?;
        Ok(())
    }

    fn layer(&self, scale: f64, octaves: u32, amplitude: f64) -> NoiseLayerConfig {
        NoiseLayerConfig::new(scale, octaves, self.persistence, self.lacunarity, 0).with_amplitude(amplitude)
    }
}

// =============================================================================
// HEIGHT GRID
// =============================================================================

/// Elevation for one chunk. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeightGrid {
    pub chunk: ChunkCoord,
    pub size: usize,
    pub min_height: f32,
    pub max_height: f32,
    pub cells: Tilemap<f32>,
}

impl HeightGrid {
    pub fn get(&self, x: usize, y: usize) -> f32 {
        *self.cells.get(x, y)
    }

    /// Observed (min, max) elevation.
    pub fn range(&self) -> (f32, f32) {
        self.cells.min_max()
    }

    pub fn mean(&self) -> f32 {
        let n = self.cells.as_slice().len().max(1);
        self.cells.as_slice().iter().map(|h| *h as f64).sum::<f64>() as f32 / n as f32
    }

    /// Stable digest of the grid contents, used to key derived maps.
    pub fn fingerprint(&self) -> u64 {
        let header = [self.chunk.x as i64 as u64, self.chunk.y as i64 as u64, self.size as u64];
        self.cells
            .as_slice()
            .iter()
            .fold(hash_words(0, &header), |acc, h| hash_words(acc, &[h.to_bits() as u64]))
    }

    /// Check that a decoded grid matches the request and the terrain bounds.
    fn check_stored(&self, chunk: ChunkCoord, size: usize, settings: &HeightMapSettings) -> Result<()> {
        if self.chunk != chunk || self.size != size || self.cells.width != size || self.cells.height != size {
            return Err(GenerationError::invalid(
                "height_grid",
                format!("stored grid is {} {}x{}, expected {} {}x{}", self.chunk, self.cells.width, self.cells.height, chunk, size, size),
            ));
        }
        if self.cells.as_slice().len() != size * size {
            return Err(GenerationError::invalid("height_grid", "cell count does not match size"));
        }
        if self.min_height != settings.min_height || self.max_height != settings.max_height {
            return Err(GenerationError::invalid(
                "height_grid",
                format!(
                    "stored bounds {}..{} differ from {}..{}",
                    self.min_height, self.max_height, settings.min_height, settings.max_height
                ),
            ));
        }
        if let Some(h) = self.cells.as_slice().iter().find(|h| !(self.min_height..=self.max_height).contains(*h)) {
            return Err(GenerationError::invalid(
                "height_grid",
                format!("elevation {h} outside {}..{}", self.min_height, self.max_height),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

/// Running counters for a height-map generator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeightMapStats {
    pub height_maps_generated: u64,
    pub biome_maps_generated: u64,
    pub restored: u64,
    pub restore_failures: u64,
    pub erosion_passes: u64,
    pub total_eroded: f64,
}

struct TerrainLayers {
    macro_layer: NoiseField,
    meso: NoiseField,
    micro: NoiseField,
    /// Sub-bands, amplitudes already weighted
    fractal: Vec<NoiseField>,
}

impl TerrainLayers {
    fn new(seed: u64, settings: &HeightMapSettings) -> Result<Self> {
        let scale = settings.scale;
        let macro_layer = NoiseField::new(seed, 0, settings.layer(scale, 1, MACRO_AMPLITUDE))?;
        let meso = NoiseField::new(seed, 1, settings.layer(scale * 0.5, MESO_OCTAVES, MESO_AMPLITUDE))?;
        let micro = NoiseField::new(seed, 2, settings.layer(scale * 0.25, settings.octaves, MICRO_AMPLITUDE))?;

        let raw_weights: Vec<f64> = (0..FRACTAL_BANDS).map(|i| FRACTAL_BAND_FALLOFF.powi(i as i32)).collect();
        let total: f64 = raw_weights.iter().sum();
        let fractal = (0..FRACTAL_BANDS)
            .zip(raw_weights)
            .map(|(i, w)| {
                let band_scale = scale * 0.5f64.powi(i as i32);
                let band = settings.layer(band_scale, FRACTAL_BAND_OCTAVES, FRACTAL_AMPLITUDE * w / total);
                NoiseField::new(seed, 10 + i, band)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { macro_layer, meso, micro, fractal })
    }

    fn sample(&self, x: f64, y: f64) -> f64 {
        let fractal: f64 = self.fractal.iter().map(|band| band.sample(x, y)).sum();
        self.macro_layer.sample(x, y) + self.meso.sample(x, y) + self.micro.sample(x, y) + fractal
    }
}

/// Produces cached elevation and biome grids per chunk.
pub struct HeightMapGenerator {
    settings: HeightMapSettings,
    seeds: GenerationSeeds,
    layers: TerrainLayers,
    climate: ClimateModel,
    erosion: Option<ErosionSimulator>,
    cache: Arc<GenerationCache<Artifact>>,
    observer: Arc<dyn GenerationObserver>,
    stats: Mutex<HeightMapStats>,
}

impl HeightMapGenerator {
    pub fn new(
        seeds: GenerationSeeds,
        settings: HeightMapSettings,
        biome_settings: BiomeSettings,
        erosion_settings: ErosionSettings,
        cache: Arc<GenerationCache<Artifact>>,
        observer: Arc<dyn GenerationObserver>,
    ) -> Result<Self> {
        settings.validate()?;
        let layers = TerrainLayers::new(seeds.heightmap, &settings)?;
        let climate = ClimateModel::new(seeds.climate, biome_settings)?;
        let erosion = if erosion_settings.enabled {
            Some(ErosionSimulator::new(erosion_settings)?)
        } else {
            None
        };
        Ok(Self {
            settings,
            seeds,
            layers,
            climate,
            erosion,
            cache,
            observer,
            stats: Mutex::new(HeightMapStats::default()),
        })
    }

    pub fn settings(&self) -> &HeightMapSettings {
        &self.settings
    }

    pub fn stats(&self) -> HeightMapStats {
        self.stats.lock().clone()
    }

    pub fn height_key(&self, chunk: ChunkCoord, size: usize) -> CacheKey {
        CacheKey::builder("height_map")
            .param("chunk_x", chunk.x)
            .param("chunk_y", chunk.y)
            .param("size", size)
            .param("seed", self.seeds.master)
            .build()
    }

    pub fn biome_key(&self, heights: &HeightGrid, chunk: ChunkCoord) -> CacheKey {
        CacheKey::builder("biome_map")
            .param("chunk_x", chunk.x)
            .param("chunk_y", chunk.y)
            .param("size", heights.size)
            .param("seed", self.seeds.master)
            .param("heights", format!("{:016x}", heights.fingerprint()))
            .build()
    }

    /// Elevation before erosion and clamping.
    pub fn raw_height(&self, world_x: f64, world_y: f64) -> f32 {
        let base = self.settings.base_height as f64 + self.settings.global_slope as f64 * world_y;
        (base + self.layers.sample(world_x, world_y)) as f32
    }

    /// Build a grid without touching the cache.
    pub fn build_height_grid(&self, chunk: ChunkCoord, size: usize) -> Result<(HeightGrid, Option<ErosionStats>)> {
        validate_chunk_size(size)?;

        let mut cells = Tilemap::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let (wx, wy) = chunk.world_position(x, y, size);
                cells.set(x, y, self.raw_height(wx, wy));
            }
        }

        let erosion_stats = self.erosion.as_ref().map(|sim| {
            let seed = hash_words(self.seeds.erosion, &[chunk.x as i64 as u64, chunk.y as i64 as u64, size as u64]);
            sim.erode(&mut cells, &mut ChaCha8Rng::seed_from_u64(seed))
        });

        cells.clamp_all(self.settings.min_height, self.settings.max_height);

        let grid = HeightGrid {
            chunk,
            size,
            min_height: self.settings.min_height,
            max_height: self.settings.max_height,
            cells,
        };
        Ok((grid, erosion_stats))
    }

    pub fn generate_height_map(&self, chunk: ChunkCoord, size: usize) -> Result<Arc<HeightGrid>> {
        validate_chunk_size(size)?;
        let key = self.height_key(chunk, size);
        let (artifact, evicted) = self.cache.get_or_insert_with(key, || {
            let (grid, erosion) = self.build_height_grid(chunk, size)?;
            {
                let mut stats = self.stats.lock();
                stats.height_maps_generated += 1;
                if let Some(erosion) = &erosion {
                    stats.erosion_passes += 1;
                    stats.total_eroded += erosion.total_eroded;
                }
            }
            debug!(%chunk, size, "generated height map");
            self.observer.on_event(&GenerationEvent::HeightMapGenerated { chunk, size });
            Ok(Artifact::Height(Arc::new(grid)))
        })?;
        self.report_eviction(evicted);
        expect_height(artifact)
    }

    /// Classify a grid without touching the cache.
    pub fn build_biome_grid(&self, heights: &HeightGrid, chunk: ChunkCoord) -> BiomeGrid {
        let size = heights.cells.width;
        let (temperature, humidity) = self.climate.generate(chunk, size);
        let climate_settings = self.climate.settings();
        let biomes = heights.cells.map(|x, y, h| {
            classify(*h, *temperature.get(x, y), *humidity.get(x, y), &self.settings, climate_settings)
        });
        BiomeGrid { chunk, biomes, temperature, humidity }
    }

    pub fn generate_biome_map(&self, heights: &HeightGrid, chunk: ChunkCoord) -> Result<Arc<BiomeGrid>> {
        validate_chunk_size(heights.cells.width)?;
        if heights.cells.width != heights.cells.height {
            return Err(GenerationError::invalid("height_grid", "biome maps need a square grid"));
        }
        let key = self.biome_key(heights, chunk);
        let (artifact, evicted) = self.cache.get_or_insert_with(key, || {
            let grid = self.build_biome_grid(heights, chunk);
            self.stats.lock().biome_maps_generated += 1;
            debug!(%chunk, "generated biome map");
            self.observer.on_event(&GenerationEvent::BiomeMapGenerated { chunk });
            Ok(Artifact::Biome(Arc::new(grid)))
        })?;
        self.report_eviction(evicted);
        match artifact {
            Artifact::Biome(grid) => Ok(grid),
            _ => Err(GenerationError::invalid("cache", "biome key holds a different artifact")),
        }
    }

    /// Load a previously serialized grid into the cache.
    ///
    /// A grid that fails to decode, does not match the request or holds
    /// elevations outside the configured bounds is treated as a cache miss and
    /// regenerated.
    pub fn restore_height_map(&self, chunk: ChunkCoord, size: usize, json: &str) -> Result<Arc<HeightGrid>> {
        validate_chunk_size(size)?;
        let key = self.height_key(chunk, size);
        let decoded = serde_json::from_str::<HeightGrid>(json)
            .map_err(GenerationError::from)
            .and_then(|grid| grid.check_stored(chunk, size, &self.settings).map(|_| grid));

        match decoded {
            Ok(grid) => {
                let grid = Arc::new(grid);
                let evicted = self.cache.put(key, Artifact::Height(grid.clone()));
                self.report_eviction(evicted);
                self.stats.lock().restored += 1;
                Ok(grid)
            }
            Err(e) => {
                warn!(%chunk, size, error = %e, "stored height map rejected, regenerating");
                self.stats.lock().restore_failures += 1;
                self.observer.on_event(&GenerationEvent::RestoreFailed { key, reason: e.to_string() });
                self.generate_height_map(chunk, size)
            }
        }
    }

    fn report_eviction(&self, evicted: Option<CacheKey>) {
        if let Some(key) = evicted {
            self.observer.on_event(&GenerationEvent::CacheEvicted { key });
        }
    }
}

pub(crate) fn validate_chunk_size(size: usize) -> Result<()> {
    ensure_positive("size", size)?;
    if size > MAX_CHUNK_SIZE {
        return Err(GenerationError::invalid("size", format!("{size} exceeds {MAX_CHUNK_SIZE}")));
    }
    Ok(())
}

fn expect_height(artifact: Artifact) -> Result<Arc<HeightGrid>> {
    match artifact {
        Artifact::Height(grid) => Ok(grid),
        _ => Err(GenerationError::invalid("cache", "height key holds a different artifact")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelObserver, NullObserver};

    fn generator_with(seed: u64, erosion: ErosionSettings, observer: Arc<dyn GenerationObserver>) -> HeightMapGenerator {
        let cache = Arc::new(GenerationCache::with_capacity(64).unwrap());
        HeightMapGenerator::new(
            GenerationSeeds::from_master(seed),
            HeightMapSettings::default(),
            BiomeSettings::default(),
            erosion,
            cache,
            observer,
        )
        .unwrap()
    }

    fn generator(seed: u64) -> HeightMapGenerator {
        generator_with(seed, ErosionSettings::default(), Arc::new(NullObserver))
    }

    #[test]
    fn test_same_seed_same_grid() {
        let a = generator(42).build_height_grid(ChunkCoord::new(0, 0), 8).unwrap().0;
        let b = generator(42).build_height_grid(ChunkCoord::new(0, 0), 8).unwrap().0;
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_different_seed_differs() {
        let a = generator(1).build_height_grid(ChunkCoord::new(0, 0), 16).unwrap().0;
        let b = generator(2).build_height_grid(ChunkCoord::new(0, 0), 16).unwrap().0;
        assert_ne!(a.cells, b.cells);
    }

    #[test]
    fn test_heights_within_bounds() {
        let gen = generator(9);
        for chunk in [ChunkCoord::new(0, 0), ChunkCoord::new(-500, 800), ChunkCoord::new(10_000, -10_000)] {
            let (grid, _) = gen.build_height_grid(chunk, 16).unwrap();
            let (lo, hi) = grid.range();
            assert!(lo >= -100.0 && hi <= 1000.0, "{chunk}: {lo}..{hi}");
        }
    }

    #[test]
    fn test_chunks_sample_one_world_field_without_erosion() {
        let gen = generator_with(5, ErosionSettings::disabled(), Arc::new(NullObserver));
        let wide = gen.build_height_grid(ChunkCoord::new(0, 0), 32).unwrap().0;
        let right = gen.build_height_grid(ChunkCoord::new(1, 0), 16).unwrap().0;
        // world x 16..32 of row y is shared by both requests
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(wide.get(16 + x, y), right.get(x, y));
            }
        }
    }

    #[test]
    fn test_generate_height_map_hits_cache() {
        let gen = generator(42);
        let a = gen.generate_height_map(ChunkCoord::new(0, 0), 8).unwrap();
        let b = gen.generate_height_map(ChunkCoord::new(0, 0), 8).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(gen.stats().height_maps_generated, 1);
    }

    #[test]
    fn test_zero_size_rejected() {
        let gen = generator(42);
        assert!(matches!(
            gen.generate_height_map(ChunkCoord::new(0, 0), 0),
            Err(GenerationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_threshold_order_enforced() {
        let settings = HeightMapSettings { beach_width: 0.5, hill_threshold: 0.4, ..Default::default() };
        assert!(settings.validate().is_err());
        let settings = HeightMapSettings { hill_threshold: 0.9, mountain_threshold: 0.8, ..Default::default() };
        assert!(settings.validate().is_err());
        assert!(HeightMapSettings::default().validate().is_ok());
    }

    #[test]
    fn test_biome_key_tracks_grid_contents() {
        let gen = generator(3);
        let grid = gen.generate_height_map(ChunkCoord::new(0, 0), 8).unwrap();
        let mut altered = (*grid).clone();
        altered.cells.set(0, 0, 999.0);
        assert_ne!(gen.biome_key(&grid, grid.chunk), gen.biome_key(&altered, grid.chunk));

        let biomes = gen.generate_biome_map(&grid, grid.chunk).unwrap();
        assert_eq!(biomes.size(), 8);
        assert_eq!(biomes.temperature.width, 8);
    }

    #[test]
    fn test_restore_failure_regenerates() {
        let (observer, rx) = ChannelObserver::bounded(16);
        let gen = generator_with(42, ErosionSettings::default(), Arc::new(observer));
        let grid = gen.restore_height_map(ChunkCoord::new(0, 0), 8, "{not json").unwrap();
        assert_eq!(grid.size, 8);
        assert_eq!(gen.stats().restore_failures, 1);
        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, GenerationEvent::RestoreFailed { .. })));
        assert!(events.iter().any(|e| matches!(e, GenerationEvent::HeightMapGenerated { .. })));
    }

    #[test]
    fn test_restore_roundtrip_uses_stored_grid() {
        let gen = generator(42);
        let (mut grid, _) = gen.build_height_grid(ChunkCoord::new(2, 3), 8).unwrap();
        grid.cells.set(1, 1, 123.0);
        let json = serde_json::to_string(&grid).unwrap();

        let restored = gen.restore_height_map(ChunkCoord::new(2, 3), 8, &json).unwrap();
        assert_eq!(restored.get(1, 1), 123.0);
        let cached = gen.generate_height_map(ChunkCoord::new(2, 3), 8).unwrap();
        assert!(Arc::ptr_eq(&restored, &cached));
        assert_eq!(gen.stats().height_maps_generated, 0);
    }

    #[test]
    fn test_restore_rejects_out_of_bounds_grid() {
        let gen = generator(42);
        let (mut grid, _) = gen.build_height_grid(ChunkCoord::new(0, 0), 8).unwrap();
        grid.cells.set(0, 0, 1e9);
        let json = serde_json::to_string(&grid).unwrap();
        let restored = gen.restore_height_map(ChunkCoord::new(0, 0), 8, &json).unwrap();
        let (lo, hi) = restored.range();
        assert!(lo >= gen.settings().min_height && hi <= gen.settings().max_height);
        assert_eq!(gen.stats().restore_failures, 1);

        let (mut grid, _) = gen.build_height_grid(ChunkCoord::new(1, 0), 8).unwrap();
        grid.max_height = 5000.0;
        let json = serde_json::to_string(&grid).unwrap();
        gen.restore_height_map(ChunkCoord::new(1, 0), 8, &json).unwrap();
        assert_eq!(gen.stats().restore_failures, 2);

        let (mut grid, _) = gen.build_height_grid(ChunkCoord::new(2, 0), 8).unwrap();
        assert!(grid.check_stored(ChunkCoord::new(2, 0), 8, gen.settings()).is_ok());
        grid.cells.set(3, 3, f32::NAN);
        assert!(grid.check_stored(ChunkCoord::new(2, 0), 8, gen.settings()).is_err());
    }

    #[test]
    fn test_restore_rejects_mismatched_chunk() {
        let gen = generator(42);
        let (grid, _) = gen.build_height_grid(ChunkCoord::new(0, 0), 8).unwrap();
        let json = serde_json::to_string(&grid).unwrap();
        gen.restore_height_map(ChunkCoord::new(1, 0), 8, &json).unwrap();
        assert_eq!(gen.stats().restore_failures, 1);
    }
}
