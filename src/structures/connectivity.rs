//! Orthogonal path carving and reachability
//!
//! Regions are chained in order, so the path graph is connected by
//! construction. Above a complexity threshold a few extra random pairs are
//! joined to introduce loops.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use rand::Rng;

use super::types::{CellTag, Endpoint, OccupancyGrid, Path, PathId, PathKind, Region, RegionId};
use crate::error::{ensure_positive, Result};

/// Complexity above which extra connections are added.
pub const CYCLE_THRESHOLD: f32 = 0.5;
/// Extra connections per region when cycles are enabled.
pub const EXTRA_CONNECTION_RATIO: f32 = 0.3;

/// Width and surface of carved paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathStyle {
    pub width: usize,
    pub kind: PathKind,
}

impl PathStyle {
    pub fn new(width: usize, kind: PathKind) -> Result<Self> {
        ensure_positive("path.width", width)?;
        Ok(Self { width, kind })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ConnectivityGraphBuilder {
    style: PathStyle,
}

impl ConnectivityGraphBuilder {
    pub fn new(style: PathStyle) -> Result<Self> {
        ensure_positive("path.width", style.width)?;
        Ok(Self { style })
    }

    pub fn style(&self) -> PathStyle {
        self.style
    }

    /// Chain `regions` in order, then add random extra links when
    /// `complexity` exceeds [`CYCLE_THRESHOLD`]. Returns the number of paths
    /// added.
    pub fn connect<R: Rng>(
        &self,
        regions: &mut [Region],
        grid: &mut OccupancyGrid,
        complexity: f32,
        paths: &mut BTreeMap<PathId, Path>,
        rng: &mut R,
    ) -> usize {
        let before = paths.len();
        for i in 1..regions.len() {
            self.join(regions, i - 1, i, grid, paths, self.style);
        }

        if complexity > CYCLE_THRESHOLD && regions.len() > 1 {
            let extra = (regions.len() as f32 * EXTRA_CONNECTION_RATIO) as usize;
            for _ in 0..extra {
                let a = rng.gen_range(0..regions.len());
                let b = rng.gen_range(0..regions.len());
                if a != b && !regions[a].connections.contains(&regions[b].id) {
                    self.join(regions, a, b, grid, paths, self.style);
                }
            }
        }
        paths.len() - before
    }

    /// Join two regions centre to centre and record the connection on both.
    pub fn join(
        &self,
        regions: &mut [Region],
        a: usize,
        b: usize,
        grid: &mut OccupancyGrid,
        paths: &mut BTreeMap<PathId, Path>,
        style: PathStyle,
    ) -> PathId {
        let (id_a, id_b) = (regions[a].id, regions[b].id);
        let id = connect_cells(
            grid,
            paths,
            (Endpoint::Region(id_a), regions[a].center()),
            (Endpoint::Region(id_b), regions[b].center()),
            style,
        );
        regions[a].connections.insert(id_b);
        regions[b].connections.insert(id_a);
        id
    }
}

/// Carve a free-standing path between two cells.
pub fn connect_cells(
    grid: &mut OccupancyGrid,
    paths: &mut BTreeMap<PathId, Path>,
    from: (Endpoint, (usize, usize)),
    to: (Endpoint, (usize, usize)),
    style: PathStyle,
) -> PathId {
    let cells = orthogonal_path(from.1, to.1);
    carve(grid, &cells, style.width);

    let id = PathId(paths.len() as u32);
    paths.insert(
        id,
        Path {
            id,
            from: from.0,
            to: to.0,
            cells,
            width: style.width,
            kind: style.kind,
            traps: Vec::new(),
        },
    );
    id
}

/// Cells from `start` to `end` inclusive, along x first and then y.
pub fn orthogonal_path(start: (usize, usize), end: (usize, usize)) -> Vec<(usize, usize)> {
    let mut cells = Vec::with_capacity(start.0.abs_diff(end.0) + start.1.abs_diff(end.1) + 1);
    let (mut x, mut y) = start;
    cells.push((x, y));
    while x != end.0 {
        x = if x < end.0 { x + 1 } else { x - 1 };
        cells.push((x, y));
    }
    while y != end.1 {
        y = if y < end.1 { y + 1 } else { y - 1 };
        cells.push((x, y));
    }
    cells
}

/// Mark `Free` cells within `width` of the polyline as `Path`.
pub fn carve(grid: &mut OccupancyGrid, cells: &[(usize, usize)], width: usize) {
    let lo = (width.saturating_sub(1) / 2) as i64;
    let hi = (width / 2) as i64;
    for &(x, y) in cells {
        for dy in -lo..=hi {
            for dx in -lo..=hi {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                if grid.in_bounds(nx, ny) && grid.get(nx as usize, ny as usize) == CellTag::Free {
                    grid.set(nx as usize, ny as usize, CellTag::Path);
                }
            }
        }
    }
}

/// Closest cell carrying `tag`, by squared distance.
pub fn nearest_tagged(grid: &OccupancyGrid, from: (usize, usize), tag: CellTag) -> Option<(usize, usize)> {
    let mut best: Option<((usize, usize), usize)> = None;
    for y in 0..grid.height() {
        for x in 0..grid.width() {
            if grid.get(x, y) != tag {
                continue;
            }
            let d = x.abs_diff(from.0).pow(2) + y.abs_diff(from.1).pow(2);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some(((x, y), d));
            }
        }
    }
    best.map(|(cell, _)| cell)
}

/// BFS over region-to-region paths.
pub fn reachable_from(
    entrance: RegionId,
    regions: &BTreeMap<RegionId, Region>,
    paths: &BTreeMap<PathId, Path>,
) -> BTreeSet<RegionId> {
    let mut adjacency: HashMap<RegionId, Vec<RegionId>> = HashMap::new();
    for (a, b) in paths.values().filter_map(Path::region_edge) {
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    }

    let mut visited = BTreeSet::new();
    if !regions.contains_key(&entrance) {
        return visited;
    }
    let mut queue = VecDeque::from([entrance]);
    visited.insert(entrance);
    while let Some(current) = queue.pop_front() {
        for next in adjacency.get(&current).into_iter().flatten() {
            if regions.contains_key(next) && visited.insert(*next) {
                queue.push_back(*next);
            }
        }
    }
    visited
}
