//! ASCII rendering and export module for generated chunks and complexes
//!
//! Provides functions to render grids as text and write world files.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use chrono::Local;

use crate::biomes::{Biome, BiomeGrid};
use crate::heightmap::HeightGrid;
use crate::structures::scatter::GeneratedStructure;
use crate::structures::types::{BuildingType, CellTag, ComplexKind, GeneratedComplex, RegionKind, RoomType};

/// ASCII rendering modes
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AsciiMode {
    /// Show biome characters
    Biome,
    /// Show elevation gradient
    Height,
    /// Show temperature gradient
    Temperature,
    /// Show humidity gradient
    Humidity,
}

impl AsciiMode {
    pub fn name(&self) -> &'static str {
        match self {
            AsciiMode::Biome => "Biome",
            AsciiMode::Height => "Height",
            AsciiMode::Temperature => "Temperature",
            AsciiMode::Humidity => "Humidity",
        }
    }

    pub fn all() -> &'static [AsciiMode] {
        &[AsciiMode::Biome, AsciiMode::Height, AsciiMode::Temperature, AsciiMode::Humidity]
    }
}

impl std::str::FromStr for AsciiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AsciiMode::all()
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown view '{s}' (biome, height, temperature, humidity)"))
    }
}

/// Get ASCII character for elevation, normalized to the grid's height range
pub fn height_char(elevation: f32, min: f32, max: f32) -> char {
    const CHARS: &[char] = &['~', '.', '-', '=', '+', '*', '#', '%', '^', 'A', 'M'];
    let normalized = ((elevation - min) / (max - min).max(f32::EPSILON)).clamp(0.0, 1.0);
    let idx = (normalized * (CHARS.len() - 1) as f32) as usize;
    CHARS[idx.min(CHARS.len() - 1)]
}

/// Get ASCII character for temperature
pub fn temperature_char(temp: f32) -> char {
    // -30°C to +50°C
    const CHARS: &[char] = &['#', '=', '-', '.', ',', ';', ':', '+', '*', '@'];
    let normalized = ((temp + 30.0) / 80.0).clamp(0.0, 1.0);
    let idx = (normalized * (CHARS.len() - 1) as f32) as usize;
    CHARS[idx.min(CHARS.len() - 1)]
}

/// Get ASCII character for humidity
pub fn humidity_char(humidity: f32) -> char {
    const CHARS: &[char] = &['_', '.', '-', ':', ';', '=', '+', '#', '%', '~'];
    let idx = (humidity.clamp(0.0, 1.0) * (CHARS.len() - 1) as f32) as usize;
    CHARS[idx.min(CHARS.len() - 1)]
}

/// Render a chunk to an ASCII string
pub fn render_ascii_map(heights: &HeightGrid, biomes: &BiomeGrid, mode: AsciiMode) -> String {
    let size = heights.size;
    let mut result = String::with_capacity((size + 1) * size);

    for y in 0..size {
        for x in 0..size {
            let ch = match mode {
                AsciiMode::Biome => biomes.get(x, y).ascii_char(),
                AsciiMode::Height => height_char(heights.get(x, y), heights.min_height, heights.max_height),
                AsciiMode::Temperature => temperature_char(*biomes.temperature.get(x, y)),
                AsciiMode::Humidity => humidity_char(*biomes.humidity.get(x, y)),
            };
            result.push(ch);
        }
        result.push('\n');
    }

    result
}

/// Generate legend for biome characters
pub fn biome_legend() -> String {
    let mut legend = String::from("=== BIOME LEGEND ===\n");
    for biome in Biome::all() {
        legend.push_str(&format!("  {} {}\n", biome.ascii_char(), biome.display_name()));
    }
    legend
}

/// Generate height legend
pub fn height_legend() -> String {
    "=== HEIGHT LEGEND ===\n\
     Lowest → Highest:\n\
     ~ . - = + * # % ^ A M\n"
        .to_string()
}

// =============================================================================
// COMPLEXES
// =============================================================================

fn room_char(room: RoomType) -> char {
    match room {
        RoomType::Entrance => 'E',
        RoomType::Exit => 'X',
        RoomType::Boss => 'B',
        RoomType::Treasure => '$',
        RoomType::Trap => '!',
        RoomType::Chamber => '#',
    }
}

fn building_char(building: BuildingType) -> char {
    match building {
        BuildingType::House => 'h',
        BuildingType::Shop => 's',
        BuildingType::Blacksmith => 'b',
        BuildingType::Tavern => 't',
        BuildingType::Temple => 'T',
        BuildingType::TownHall => 'H',
        BuildingType::Warehouse => 'w',
        BuildingType::Stable => 'S',
        BuildingType::Farm => 'f',
        BuildingType::Library => 'L',
        BuildingType::Academy => 'A',
        BuildingType::Barracks => 'K',
        BuildingType::Tower => 'O',
    }
}

/// Character for a region: its room or building glyph
pub fn region_char(kind: RegionKind) -> char {
    match kind {
        RegionKind::Room(room) => room_char(room),
        RegionKind::Building(building) => building_char(building),
    }
}

/// Render a dungeon or settlement layout
pub fn render_complex(complex: &GeneratedComplex) -> String {
    let grid = &complex.occupancy;
    let mut rows: Vec<Vec<char>> = (0..grid.height())
        .map(|y| {
            (0..grid.width())
                .map(|x| match grid.get(x, y) {
                    CellTag::Free => ' ',
                    CellTag::Region => '?',
                    CellTag::Path => '.',
                    CellTag::Wall => '=',
                    CellTag::Gate => '+',
                })
                .collect()
        })
        .collect();

    for region in complex.regions.values() {
        let ch = region_char(region.kind);
        for (x, y) in region.rect.cells() {
            rows[y][x] = ch;
        }
    }

    let mut result = String::with_capacity((grid.width() + 1) * grid.height());
    for row in rows {
        result.extend(row);
        result.push('\n');
    }
    result
}

/// Generate legend for complex characters
pub fn complex_legend(complex: &GeneratedComplex) -> String {
    match complex.kind {
        ComplexKind::Dungeon { .. } => "=== DUNGEON LEGEND ===\n\
             E Entrance  X Exit  B Boss  $ Treasure  ! Trap  # Chamber  . Corridor\n"
            .to_string(),
        ComplexKind::Settlement { .. } => "=== SETTLEMENT LEGEND ===\n\
             h House  s Shop  b Blacksmith  t Tavern  T Temple  H Town hall  w Warehouse\n\
             S Stable  f Farm  L Library  A Academy  K Barracks  O Tower\n\
             . Road  = Wall  + Gate\n"
            .to_string(),
    }
}

/// One line per region with its contents
pub fn complex_report(complex: &GeneratedComplex) -> String {
    let mut report = format!(
        "{}: {} regions, {} paths, entrance {}, exit {}\n",
        complex.label(),
        complex.regions.len(),
        complex.paths.len(),
        complex.entrance,
        complex.exit
    );
    if let Some(stats) = complex.settlement_stats() {
        report.push_str(&format!(
            "population {}  wealth {:.2}  defense {:.2}  trade {:.2}\n",
            stats.population, stats.wealth, stats.defense, stats.trade
        ));
    }
    for region in complex.regions.values() {
        let enemies: Vec<&str> = region.enemies().collect();
        report.push_str(&format!(
            "  {:>4} {:<10} {}x{} at ({}, {})  lvl {}",
            region.id.to_string(),
            region.kind.to_string(),
            region.rect.width,
            region.rect.height,
            region.rect.x,
            region.rect.y,
            region.level
        ));
        if !enemies.is_empty() {
            report.push_str(&format!("  enemies: {}", enemies.join(", ")));
        }
        let traps = region.traps().count();
        if traps > 0 {
            report.push_str(&format!("  traps: {traps}"));
        }
        for id in region.loot() {
            if let Some(container) = complex.loot.get(&id) {
                report.push_str(&format!("  loot: {} ({})", container.name, container.rarity));
            }
        }
        let residents = region.resident_count();
        if residents > 0 {
            report.push_str(&format!("  residents: {residents}"));
        }
        report.push('\n');
    }
    report
}

/// One line per scattered structure
pub fn structure_report(structures: &[GeneratedStructure]) -> String {
    let mut report = String::new();
    for s in structures {
        report.push_str(&format!(
            "{} {:<20} at ({:.1}, {:.1})  lvl {:>2}  loot {}  enemies {}",
            s.id,
            s.template_id,
            s.position.0,
            s.position.1,
            s.level,
            s.loot.len(),
            s.enemies.len()
        ));
        if let Some(boss) = &s.boss {
            report.push_str(&format!("  boss: {boss}"));
        }
        report.push('\n');
    }
    report
}

// =============================================================================
// COLOR
// =============================================================================

/// Create ANSI colored character string (24-bit color)
pub fn ansi_colored_char(ch: char, fg: (u8, u8, u8), bg: (u8, u8, u8)) -> String {
    format!(
        "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m{}\x1b[0m",
        fg.0, fg.1, fg.2, bg.0, bg.1, bg.2, ch
    )
}

/// Render the biome view with each cell colored by its biome
pub fn render_colored_biome_map(biomes: &BiomeGrid) -> String {
    let size = biomes.size();
    let mut result = String::new();
    for y in 0..size {
        for x in 0..size {
            let biome = biomes.get(x, y);
            let bg = biome.color();
            let fg = (bg.0 / 3, bg.1 / 3, bg.2 / 3);
            result.push_str(&ansi_colored_char(biome.ascii_char(), fg, bg));
        }
        result.push('\n');
    }
    result
}

// =============================================================================
// WORLD FILE
// =============================================================================

/// Export a chunk to an ASCII file
pub fn export_world_file(
    heights: &HeightGrid,
    biomes: &BiomeGrid,
    seed: u64,
    path: impl AsRef<Path>,
) -> io::Result<()> {
    let mut file = File::create(path)?;
    let size = heights.size;
    let total = (size * size).max(1);

    // Header
    writeln!(file, "=== WORLD FORGE CHUNK FILE ===")?;
    writeln!(file, "Seed: {}", seed)?;
    writeln!(file, "Chunk: {}", heights.chunk)?;
    writeln!(file, "Size: {}x{}", size, size)?;
    let (lo, hi) = heights.range();
    writeln!(file, "Elevation: {:.1} .. {:.1} (mean {:.1})", lo, hi, heights.mean())?;
    writeln!(file, "Generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(file)?;

    for mode in AsciiMode::all() {
        writeln!(file, "=== MAP ({} View) ===", mode.name())?;
        write!(file, "{}", render_ascii_map(heights, biomes, *mode))?;
        writeln!(file)?;
    }

    write!(file, "{}", biome_legend())?;
    writeln!(file)?;

    writeln!(file, "=== BIOME DISTRIBUTION ===")?;
    for (biome, count) in biomes.histogram() {
        writeln!(file, "  {:<10} {:>6} ({:.1}%)", biome.display_name(), count, count as f32 * 100.0 / total as f32)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::types::{ComplexId, OccupancyGrid, Rect, Region, RegionId};
    use crate::structures::{DungeonSettings, DungeonTheme};
    use std::collections::BTreeMap;

    #[test]
    fn test_height_char_spans_range() {
        assert_eq!(height_char(0.0, 0.0, 100.0), '~');
        assert_eq!(height_char(100.0, 0.0, 100.0), 'M');
        assert_eq!(height_char(500.0, 0.0, 100.0), 'M');
        assert_eq!(height_char(5.0, 5.0, 5.0), '~');
    }

    #[test]
    fn test_render_complex_draws_regions_and_paths() {
        let mut occupancy = OccupancyGrid::new(6, 3);
        let room = Region::new(RegionId(0), Rect::new(0, 0, 2, 2), RegionKind::Room(RoomType::Entrance));
        occupancy.fill(&room.rect, CellTag::Region);
        occupancy.set(3, 1, CellTag::Path);
        let complex = GeneratedComplex {
            id: ComplexId(1),
            kind: ComplexKind::Dungeon { theme: DungeonTheme::Cave, settings: DungeonSettings::default() },
            regions: BTreeMap::from([(room.id, room)]),
            paths: BTreeMap::new(),
            loot: BTreeMap::new(),
            entrance: RegionId(0),
            exit: RegionId(0),
            boss: None,
            occupancy,
        };
        let text = render_complex(&complex);
        assert_eq!(text, "EE    \nEE .  \n      \n");
        assert!(complex_report(&complex).contains("cave dungeon #1"));
    }

    #[test]
    fn test_ascii_mode_parse() {
        assert_eq!("height".parse::<AsciiMode>().unwrap(), AsciiMode::Height);
        assert!("plates".parse::<AsciiMode>().is_err());
    }
}
