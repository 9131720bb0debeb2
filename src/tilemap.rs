//! Bounded 2D grid used for every per-chunk layer (heights, biomes, occupancy).

use serde::{Deserialize, Serialize};

/// A row-major 2D grid. Unlike a world map it does not wrap: chunks are
/// bounded tiles and neighbours past an edge simply do not exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tilemap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Tilemap<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }
}

impl<T: Clone> Tilemap<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height, "({x}, {y}) outside {}x{}", self.width, self.height);
        y * self.width + x
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = self.index(x, y);
        &mut self.data[idx]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Fill the entire map with a value.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// 4-connected neighbours that lie inside the grid.
    pub fn neighbors(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let mut result = Vec::with_capacity(4);
        if x > 0 {
            result.push((x - 1, y));
        }
        if x + 1 < self.width {
            result.push((x + 1, y));
        }
        if y > 0 {
            result.push((x, y - 1));
        }
        if y + 1 < self.height {
            result.push((x, y + 1));
        }
        result
    }

    /// Raw row-major cells.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.data.iter().enumerate().map(move |(idx, val)| (idx % width, idx / width, val))
    }

    /// Iterate mutably over all cells with their coordinates.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut T)> {
        let width = self.width;
        self.data.iter_mut().enumerate().map(move |(idx, val)| (idx % width, idx / width, val))
    }

    /// Build a grid of a different type cell by cell.
    pub fn map<U, F: FnMut(usize, usize, &T) -> U>(&self, mut f: F) -> Tilemap<U> {
        Tilemap {
            width: self.width,
            height: self.height,
            data: self.iter().map(|(x, y, v)| f(x, y, v)).collect(),
        }
    }
}

impl Tilemap<f32> {
    /// (min, max) over all cells; `(0.0, 0.0)` for an empty grid.
    pub fn min_max(&self) -> (f32, f32) {
        if self.data.is_empty() {
            return (0.0, 0.0);
        }
        self.data.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Multiply every cell by `factor`.
    pub fn scale_all(&mut self, factor: f32) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    pub fn clamp_all(&mut self, min: f32, max: f32) {
        for v in &mut self.data {
            *v = v.clamp(min, max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors_do_not_wrap() {
        let map: Tilemap<u8> = Tilemap::new(4, 3);
        assert_eq!(map.neighbors(0, 0), vec![(1, 0), (0, 1)]);
        assert_eq!(map.neighbors(3, 2).len(), 2);
        assert_eq!(map.neighbors(1, 1).len(), 4);
    }

    #[test]
    fn test_iter_coordinates_are_row_major() {
        let mut map = Tilemap::new_with(3, 2, 0u32);
        map.set(2, 1, 7);
        let found: Vec<_> = map.iter().filter(|(_, _, v)| **v == 7).map(|(x, y, _)| (x, y)).collect();
        assert_eq!(found, vec![(2, 1)]);
    }

    #[test]
    fn test_min_max_and_clamp() {
        let mut map = Tilemap::new_with(2, 2, 5.0f32);
        map.set(0, 0, -3.0);
        map.set(1, 1, 12.0);
        assert_eq!(map.min_max(), (-3.0, 12.0));
        map.clamp_all(0.0, 10.0);
        assert_eq!(map.min_max(), (0.0, 10.0));
    }
}
