use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use world_forge::ascii::{self, AsciiMode};
use world_forge::config::EngineConfig;
use world_forge::engine::WorldGenEngine;
use world_forge::erosion::GenerationQuality;
use world_forge::export;
use world_forge::structures::{DungeonSettings, DungeonTheme, SettlementSettings, SettlementTier};

#[derive(Parser, Debug)]
#[command(name = "world_forge")]
#[command(about = "Generate procedural terrain, dungeons, settlements and scattered structures")]
struct Args {
    /// Random seed (uses random seed if not specified)
    #[arg(short, long, global = true)]
    seed: Option<u64>,

    /// JSON engine config; --seed and --quality override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Generation quality preset (low, medium, high, ultra)
    #[arg(short, long, global = true)]
    quality: Option<GenerationQuality>,

    /// Dump the generated value as JSON instead of an ASCII map
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a terrain chunk and print its maps
    Terrain(TerrainArgs),
    /// Generate a themed dungeon
    Dungeon(DungeonArgs),
    /// Generate a settlement
    Settlement(SettlementArgs),
    /// Scatter structures over a square of chunks
    Structures(StructureArgs),
    /// Generate a sample of everything and print engine statistics
    Stats,
}

#[derive(ClapArgs, Debug)]
struct TerrainArgs {
    #[arg(short = 'x', long, default_value = "0", allow_hyphen_values = true)]
    chunk_x: i32,

    #[arg(short = 'y', long, default_value = "0", allow_hyphen_values = true)]
    chunk_y: i32,

    /// Cells per chunk side
    #[arg(long, default_value = "64")]
    size: usize,

    /// Map view (biome, height, temperature, humidity)
    #[arg(long, default_value = "biome")]
    view: AsciiMode,

    /// Print the biome view with 24-bit color
    #[arg(long)]
    color: bool,

    /// Export height, biome and shaded PNGs with this path prefix
    #[arg(long)]
    export_png: Option<String>,

    /// Write a text world file
    #[arg(long)]
    export_file: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct DungeonArgs {
    /// Dungeon theme (cave, crypt, mine, laboratory, temple, fortress, maze, tower)
    #[arg(short, long, default_value = "cave")]
    theme: DungeonTheme,

    #[arg(short = 'W', long, default_value = "50")]
    width: usize,

    #[arg(short = 'H', long, default_value = "50")]
    height: usize,

    #[arg(long, default_value = "10")]
    min_rooms: usize,

    #[arg(long, default_value = "25")]
    max_rooms: usize,

    #[arg(long, default_value = "0.5")]
    complexity: f32,

    #[arg(long, default_value = "1")]
    level: u32,

    /// Export the layout as PNG
    #[arg(long)]
    export_png: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct SettlementArgs {
    /// Settlement tier (hamlet, village, town, city, capital)
    #[arg(short, long, default_value = "village")]
    tier: SettlementTier,

    #[arg(short = 'W', long, default_value = "100")]
    width: usize,

    #[arg(short = 'H', long, default_value = "100")]
    height: usize,

    #[arg(short, long, default_value = "100")]
    population: u32,

    #[arg(long, default_value = "0.5")]
    wealth: f32,

    #[arg(long, default_value = "0.3")]
    defense: f32,

    /// Export the layout as PNG
    #[arg(long)]
    export_png: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct StructureArgs {
    /// Chunks per side of the scanned square
    #[arg(short, long, default_value = "3")]
    radius: i32,

    #[arg(long, default_value = "512")]
    chunk_size: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_engine(args: &Args) -> Result<WorldGenEngine, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    } else if args.config.is_none() {
        config.seed = rand::random();
    }
    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    println!("World seed: {}", config.seed);
    println!("Quality: {} ({})", config.quality, config.quality.description());
    Ok(WorldGenEngine::new(config)?)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(&args)?;

    match &args.command {
        Command::Terrain(t) => {
            println!("Generating chunk ({}, {}) at {}x{}...", t.chunk_x, t.chunk_y, t.size, t.size);
            let heights = engine.generate_height_map(t.chunk_x, t.chunk_y, t.size)?;
            let biomes = engine.generate_biome_map(&heights, t.chunk_x, t.chunk_y)?;
            let (lo, hi) = heights.range();
            println!("Elevation range: {:.1} to {:.1} (mean {:.1})", lo, hi, heights.mean());

            if args.json {
                println!("{}", serde_json::to_string_pretty(&*heights)?);
            } else if t.color {
                print!("{}", ascii::render_colored_biome_map(&biomes));
            } else {
                println!("=== {} View ===", t.view.name());
                print!("{}", ascii::render_ascii_map(&heights, &biomes, t.view));
                match t.view {
                    AsciiMode::Height => print!("{}", ascii::height_legend()),
                    _ => print!("{}", ascii::biome_legend()),
                }
            }

            if let Some(prefix) = &t.export_png {
                export::export_heightmap(&heights, format!("{}_height.png", prefix))?;
                export::export_biome_map(&biomes, format!("{}_biomes.png", prefix))?;
                export::export_terrain_shaded(&heights, &biomes, format!("{}_shaded.png", prefix))?;
                println!("Exported PNGs with prefix: {}", prefix);
            }
            if let Some(path) = &t.export_file {
                ascii::export_world_file(&heights, &biomes, engine.config().seed, path)?;
                println!("World file saved to: {}", path.display());
            }
        }

        Command::Dungeon(d) => {
            let settings = DungeonSettings {
                width: d.width,
                height: d.height,
                min_rooms: d.min_rooms,
                max_rooms: d.max_rooms,
                complexity: d.complexity,
                level: d.level,
                seed: engine.config().seed,
                ..Default::default()
            };
            println!("Generating {} dungeon...", d.theme);
            let dungeon = engine.generate_dungeon(d.theme, &settings)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&*dungeon)?);
            } else {
                print!("{}", ascii::render_complex(&dungeon));
                print!("{}", ascii::complex_legend(&dungeon));
                print!("{}", ascii::complex_report(&dungeon));
            }
            if let Some(path) = &d.export_png {
                export::export_complex(&dungeon, 8, path)?;
                println!("Exported layout to: {}", path.display());
            }
        }

        Command::Settlement(s) => {
            let settings = SettlementSettings {
                width: s.width,
                height: s.height,
                population: s.population,
                wealth_level: s.wealth,
                defense_level: s.defense,
                seed: engine.config().seed,
                ..Default::default()
            };
            println!("Generating {}...", s.tier);
            let settlement = engine.generate_settlement(s.tier, &settings)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&*settlement)?);
            } else {
                print!("{}", ascii::render_complex(&settlement));
                print!("{}", ascii::complex_legend(&settlement));
                print!("{}", ascii::complex_report(&settlement));
            }
            if let Some(path) = &s.export_png {
                export::export_complex(&settlement, 6, path)?;
                println!("Exported layout to: {}", path.display());
            }
        }

        Command::Structures(s) => {
            let seed = engine.config().seed;
            let mut total = 0;
            for cy in -s.radius..=s.radius {
                for cx in -s.radius..=s.radius {
                    let structures = engine.generate_structures_for_chunk(cx, cy, s.chunk_size, seed)?;
                    if structures.is_empty() {
                        continue;
                    }
                    total += structures.len();
                    if args.json {
                        println!("{}", serde_json::to_string_pretty(&*structures)?);
                    } else {
                        println!("=== Chunk ({}, {}) ===", cx, cy);
                        print!("{}", ascii::structure_report(&structures));
                    }
                }
            }
            println!("Scattered {} structures", total);
        }

        Command::Stats => {
            println!("Generating sample content...");
            let heights = engine.generate_height_map(0, 0, 64)?;
            engine.generate_biome_map(&heights, 0, 0)?;
            engine.generate_height_map(0, 0, 64)?;
            for theme in DungeonTheme::all() {
                engine.generate_dungeon(*theme, &DungeonSettings::default())?;
            }
            for tier in SettlementTier::all() {
                engine.generate_settlement(*tier, &SettlementSettings::default())?;
            }
            engine.generate_structures_for_chunk(0, 0, 1024, engine.config().seed)?;

            let stats = engine.stats();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats.summary());
            }
        }
    }

    Ok(())
}
