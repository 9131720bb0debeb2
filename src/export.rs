//! PNG export of chunk grids and complex layouts

use std::path::Path;

use image::{ImageBuffer, ImageResult, Rgb, RgbImage};

use crate::biomes::BiomeGrid;
use crate::heightmap::HeightGrid;
use crate::structures::types::{CellTag, GeneratedComplex, RegionKind, RoomType};

/// Spectral colormap (matplotlib style): dark blue -> cyan -> green -> yellow -> orange -> red
fn spectral_colormap(t: f32) -> [u8; 3] {
    let colors: [[f32; 3]; 11] = [
        [0.37, 0.31, 0.64], // Dark blue/purple (low)
        [0.20, 0.53, 0.74], // Blue
        [0.40, 0.76, 0.65], // Teal
        [0.67, 0.87, 0.64], // Light green
        [0.90, 0.96, 0.60], // Yellow-green
        [1.00, 1.00, 0.75], // Light yellow / white
        [1.00, 0.88, 0.55], // Yellow
        [0.99, 0.68, 0.38], // Light orange
        [0.96, 0.43, 0.26], // Orange
        [0.84, 0.24, 0.31], // Red
        [0.62, 0.00, 0.26], // Dark red (high)
    ];

    let t_scaled = t.clamp(0.0, 1.0) * 10.0;
    let idx = (t_scaled as usize).min(9);
    let frac = t_scaled - idx as f32;

    let c1 = colors[idx];
    let c2 = colors[idx + 1];

    [
        ((c1[0] + (c2[0] - c1[0]) * frac) * 255.0) as u8,
        ((c1[1] + (c2[1] - c1[1]) * frac) * 255.0) as u8,
        ((c1[2] + (c2[2] - c1[2]) * frac) * 255.0) as u8,
    ]
}

/// Render elevation normalized to the grid's configured height range.
pub fn render_heightmap(heights: &HeightGrid) -> RgbImage {
    let span = (heights.max_height - heights.min_height).max(f32::EPSILON);
    let size = heights.size as u32;
    ImageBuffer::from_fn(size, size, |x, y| {
        let t = (heights.get(x as usize, y as usize) - heights.min_height) / span;
        Rgb(spectral_colormap(t))
    })
}

pub fn render_biome_map(biomes: &BiomeGrid) -> RgbImage {
    let size = biomes.size() as u32;
    ImageBuffer::from_fn(size, size, |x, y| {
        let (r, g, b) = biomes.get(x as usize, y as usize).color();
        Rgb([r, g, b])
    })
}

/// Biome colors with hillshade (fake 3D shadows) from the height grid.
pub fn render_terrain_shaded(heights: &HeightGrid, biomes: &BiomeGrid) -> RgbImage {
    // Light from the northwest, elevated
    let light = normalize_vec3(-1.0, -1.0, 2.0);
    let span = (heights.max_height - heights.min_height).max(f32::EPSILON);
    let size = heights.size as u32;

    ImageBuffer::from_fn(size, size, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let normal = calculate_normal(heights, x, y, span);
        let diffuse = (normal[0] * light[0] + normal[1] * light[1] + normal[2] * light[2]).max(0.0);
        let ambient = 0.4;
        let shade = ambient + (1.0 - ambient) * diffuse;

        let (r, g, b) = biomes.get(x, y).color();
        Rgb([
            (r as f32 * shade).clamp(0.0, 255.0) as u8,
            (g as f32 * shade).clamp(0.0, 255.0) as u8,
            (b as f32 * shade).clamp(0.0, 255.0) as u8,
        ])
    })
}

/// Surface normal from the height gradient, clamped at the chunk edges
fn calculate_normal(heights: &HeightGrid, x: usize, y: usize, span: f32) -> [f32; 3] {
    let last = heights.size - 1;
    let h = |x: usize, y: usize| heights.get(x, y) / span;
    let dx = h((x + 1).min(last), y) - h(x.saturating_sub(1), y);
    let dy = h(x, (y + 1).min(last)) - h(x, y.saturating_sub(1));
    // Exaggerate relief so chunk-scale slopes are visible
    normalize_vec3(-dx * 20.0, -dy * 20.0, 1.0)
}

fn normalize_vec3(x: f32, y: f32, z: f32) -> [f32; 3] {
    let len = (x * x + y * y + z * z).sqrt();
    if len > 0.0 {
        [x / len, y / len, z / len]
    } else {
        [0.0, 0.0, 1.0]
    }
}

fn region_color(kind: RegionKind) -> [u8; 3] {
    match kind {
        RegionKind::Room(RoomType::Entrance) => [80, 200, 90],
        RegionKind::Room(RoomType::Exit) => [70, 140, 230],
        RegionKind::Room(RoomType::Boss) => [200, 40, 40],
        RegionKind::Room(RoomType::Treasure) => [230, 190, 40],
        RegionKind::Room(RoomType::Trap) => [200, 110, 30],
        RegionKind::Room(RoomType::Chamber) => [150, 140, 130],
        RegionKind::Building(b) if b.is_civic() => [180, 90, 200],
        RegionKind::Building(b) if b.is_defense() => [90, 90, 100],
        RegionKind::Building(b) if b.is_trade() => [220, 160, 60],
        RegionKind::Building(_) => [170, 120, 80],
    }
}

/// Render a complex with `scale` pixels per cell.
pub fn render_complex(complex: &GeneratedComplex, scale: u32) -> RgbImage {
    let grid = &complex.occupancy;
    let scale = scale.max(1);
    let mut img: RgbImage = ImageBuffer::new(grid.width() as u32 * scale, grid.height() as u32 * scale);

    for (x, y, tag) in grid.tiles().iter() {
        let color = match tag {
            CellTag::Free => [25, 25, 30],
            CellTag::Region => [120, 120, 120],
            CellTag::Path => [200, 190, 160],
            CellTag::Wall => [70, 60, 55],
            CellTag::Gate => [160, 100, 40],
        };
        fill_cell(&mut img, x as u32, y as u32, scale, color);
    }
    for region in complex.regions.values() {
        let color = region_color(region.kind);
        for (x, y) in region.rect.cells() {
            fill_cell(&mut img, x as u32, y as u32, scale, color);
        }
    }
    img
}

fn fill_cell(img: &mut RgbImage, x: u32, y: u32, scale: u32, color: [u8; 3]) {
    for dy in 0..scale {
        for dx in 0..scale {
            img.put_pixel(x * scale + dx, y * scale + dy, Rgb(color));
        }
    }
}

pub fn export_heightmap(heights: &HeightGrid, path: impl AsRef<Path>) -> ImageResult<()> {
    render_heightmap(heights).save(path)
}

pub fn export_biome_map(biomes: &BiomeGrid, path: impl AsRef<Path>) -> ImageResult<()> {
    render_biome_map(biomes).save(path)
}

pub fn export_terrain_shaded(heights: &HeightGrid, biomes: &BiomeGrid, path: impl AsRef<Path>) -> ImageResult<()> {
    render_terrain_shaded(heights, biomes).save(path)
}

pub fn export_complex(complex: &GeneratedComplex, scale: u32, path: impl AsRef<Path>) -> ImageResult<()> {
    render_complex(complex, scale).save(path)
}
