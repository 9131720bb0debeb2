//! Collision-free rectangle packing on an occupancy grid
//!
//! Rejection sampling: each slot gets a fixed attempt budget, and a slot that
//! runs out is reported as `None` instead of failing the whole layout.

use rand::Rng;

use super::types::{CellTag, OccupancyGrid, Rect, SizeRange};
use crate::error::{ensure_positive, Result};

pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

#[derive(Clone, Copy, Debug)]
pub struct SpatialPlacementPlanner {
    max_attempts: usize,
}

impl Default for SpatialPlacementPlanner {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

impl SpatialPlacementPlanner {
    pub fn new(max_attempts: usize) -> Result<Self> {
        ensure_positive("placement.max_attempts", max_attempts)?;
        Ok(Self { max_attempts })
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Place `count` rectangles, marking each accepted one as `Region`.
    pub fn place<R: Rng>(
        &self,
        grid: &mut OccupancyGrid,
        count: usize,
        size: SizeRange,
        rng: &mut R,
    ) -> Result<Vec<Option<Rect>>> {
        size.validate()?;
        Ok((0..count).map(|_| self.try_place(grid, size, rng)).collect())
    }

    /// Place a single rectangle.
    pub fn place_one<R: Rng>(&self, grid: &mut OccupancyGrid, size: SizeRange, rng: &mut R) -> Result<Option<Rect>> {
        size.validate()?;
        Ok(self.try_place(grid, size, rng))
    }

    fn try_place<R: Rng>(&self, grid: &mut OccupancyGrid, size: SizeRange, rng: &mut R) -> Option<Rect> {
        for _ in 0..self.max_attempts {
            let width = size.sample(rng);
            let height = size.sample(rng);
            if width > grid.width() || height > grid.height() {
                continue;
            }
            let x = rng.gen_range(0..=grid.width() - width);
            let y = rng.gen_range(0..=grid.height() - height);
            let rect = Rect::new(x, y, width, height);
            if grid.is_free(&rect) {
                grid.fill(&rect, CellTag::Region);
                return Some(rect);
            }
        }
        None
    }

    /// Claim a fixed rect. Fails without side effects if any cell is taken.
    pub fn reserve(&self, grid: &mut OccupancyGrid, rect: Rect, tag: CellTag) -> bool {
        if !grid.is_free(&rect) {
            return false;
        }
        grid.fill(&rect, tag);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_placed_rects_never_overlap() {
        let planner = SpatialPlacementPlanner::default();
        let mut grid = OccupancyGrid::new(40, 40);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let rects: Vec<Rect> = planner
            .place(&mut grid, 30, SizeRange::new(3, 8).unwrap(), &mut rng)
            .unwrap()
            .into_iter()
            .flatten()
            .collect();

        assert!(!rects.is_empty());
        for (i, a) in rects.iter().enumerate() {
            assert!(a.right() <= 40 && a.bottom() <= 40);
            for b in &rects[i + 1..] {
                assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
            }
        }
        let marked: usize = rects.iter().map(Rect::area).sum();
        assert_eq!(grid.count(CellTag::Region), marked);
    }

    #[test]
    fn test_exhausted_slots_yield_none() {
        let planner = SpatialPlacementPlanner::new(10).unwrap();
        let mut grid = OccupancyGrid::new(6, 6);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let slots = planner.place(&mut grid, 3, SizeRange::fixed(6), &mut rng).unwrap();
        assert_eq!(slots.iter().filter(|s| s.is_some()).count(), 1);
        assert!(slots[1].is_none() && slots[2].is_none());
    }

    #[test]
    fn test_oversized_range_places_nothing() {
        let planner = SpatialPlacementPlanner::default();
        let mut grid = OccupancyGrid::new(4, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let slots = planner.place(&mut grid, 2, SizeRange::fixed(5), &mut rng).unwrap();
        assert!(slots.iter().all(Option::is_none));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let planner = SpatialPlacementPlanner::default();
        let mut grid = OccupancyGrid::new(4, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(planner.place(&mut grid, 1, SizeRange { min: 4, max: 2 }, &mut rng).is_err());
        assert!(planner.place(&mut grid, 1, SizeRange { min: 0, max: 2 }, &mut rng).is_err());
    }

    #[test]
    fn test_reserve_respects_occupancy() {
        let planner = SpatialPlacementPlanner::default();
        let mut grid = OccupancyGrid::new(10, 10);
        assert!(planner.reserve(&mut grid, Rect::new(0, 0, 3, 3), CellTag::Region));
        assert!(!planner.reserve(&mut grid, Rect::new(2, 2, 3, 3), CellTag::Region));
        assert_eq!(grid.get(4, 4), CellTag::Free);
    }
}
