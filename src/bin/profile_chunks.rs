//! Profiling tool comparing sequential and parallel chunk generation

use std::time::{Duration, Instant};

use world_forge::config::EngineConfig;
use world_forge::engine::WorldGenEngine;
use world_forge::erosion::GenerationQuality;
use world_forge::heightmap::ChunkCoord;
use world_forge::structures::{DungeonSettings, DungeonTheme, SettlementSettings, SettlementTier};

fn engine(quality: GenerationQuality) -> Result<WorldGenEngine, Box<dyn std::error::Error>> {
    let mut config = EngineConfig::with_seed(1337);
    config.quality = quality;
    Ok(WorldGenEngine::new(config)?)
}

fn percent(part: Duration, total: Duration) -> f64 {
    100.0 * part.as_secs_f64() / total.as_secs_f64().max(f64::EPSILON)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let size = 128;
    let radius = 3;
    let chunks: Vec<ChunkCoord> = (-radius..=radius)
        .flat_map(|y| (-radius..=radius).map(move |x| ChunkCoord::new(x, y)))
        .collect();

    println!("=== Performance Profiling ===");
    println!("Chunks: {} of {}x{} cells", chunks.len(), size, size);
    println!("Threads: {}", rayon::current_num_threads());
    println!();

    for quality in GenerationQuality::all() {
        println!("--- {} ---", quality);

        // Separate engines so neither run is served from cache
        let sequential_engine = engine(*quality)?;
        let start = Instant::now();
        for chunk in &chunks {
            sequential_engine.generate_height_map(chunk.x, chunk.y, size)?;
        }
        let sequential = start.elapsed();
        println!("Sequential: {:?}", sequential);

        let parallel_engine = engine(*quality)?;
        let start = Instant::now();
        parallel_engine.generate_height_maps_parallel(&chunks, size)?;
        let parallel = start.elapsed();
        println!("Parallel:   {:?}", parallel);
        println!(
            "Speedup:    {:.2}x",
            sequential.as_secs_f64() / parallel.as_secs_f64().max(f64::EPSILON)
        );

        let start = Instant::now();
        parallel_engine.generate_height_maps_parallel(&chunks, size)?;
        println!("Cached:     {:?}", start.elapsed());
        println!();
    }

    let engine = engine(GenerationQuality::Medium)?;

    let start = Instant::now();
    for theme in DungeonTheme::all() {
        engine.generate_dungeon(*theme, &DungeonSettings::default())?;
    }
    let dungeon_time = start.elapsed();

    let start = Instant::now();
    for tier in SettlementTier::all() {
        engine.generate_settlement(*tier, &SettlementSettings::default())?;
    }
    let settlement_time = start.elapsed();

    let start = Instant::now();
    for chunk in &chunks {
        engine.generate_structures_for_chunk(chunk.x, chunk.y, 1024, 1337)?;
    }
    let structure_time = start.elapsed();

    let total = dungeon_time + settlement_time + structure_time;
    println!("=== Complexes ===");
    println!("Dungeons:    {:>8.2}% ({:?})", percent(dungeon_time, total), dungeon_time);
    println!("Settlements: {:>8.2}% ({:?})", percent(settlement_time, total), settlement_time);
    println!("Structures:  {:>8.2}% ({:?})", percent(structure_time, total), structure_time);
    println!("─────────────────────────────────");
    println!("TOTAL:       {:>8}  {:?}", "100%", total);
    println!();
    println!("{}", engine.stats().summary());

    Ok(())
}
