//! Uniform XZ bucket grid over the optimizer's output.
//!
//! Rebuilt from scratch on every [`SpatialGrid::update_points`]; there is no
//! incremental maintenance.

use crate::error::{Error, Result};
use glam::Vec3;
use hashbrown::HashMap;

/// Anything with a world position can live in the grid.
pub trait GridPosition {
    fn grid_position(&self) -> Vec3;
}

impl GridPosition for Vec3 {
    #[inline]
    fn grid_position(&self) -> Vec3 {
        *self
    }
}

type CellKey = (i32, i32);

/// When a query box covers more cells than this multiple of the occupied
/// cell count, walk the occupied cells instead of the box.
const SPARSE_SCAN_FACTOR: i64 = 4;

#[derive(Debug, Clone)]
pub struct SpatialGrid<T> {
    cell_size: f32,
    cells: HashMap<CellKey, Vec<T>>,
    len: usize,
}

impl<T: GridPosition + Clone> SpatialGrid<T> {
    pub fn new(cell_size: f32) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(Error::InvalidCellSize(cell_size));
        }
        Ok(Self {
            cell_size,
            cells: HashMap::new(),
            len: 0,
        })
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    fn key(&self, x: f32, z: f32) -> CellKey {
        (
            (x / self.cell_size).floor() as i32,
            (z / self.cell_size).floor() as i32,
        )
    }

    /// Clears every cell and re-inserts `points`.
    pub fn update_points(&mut self, points: &[T]) {
        self.clear();
        for p in points {
            let pos = p.grid_position();
            if !pos.is_finite() {
                continue;
            }
            let key = self.key(pos.x, pos.z);
            self.cells.entry(key).or_default().push(p.clone());
            self.len += 1;
        }
    }

    /// Contents of every cell overlapping the box. Results are at cell
    /// granularity and may include points just outside the box.
    pub fn points_in_bounds(&self, min_x: f32, min_z: f32, max_x: f32, max_z: f32) -> Vec<&T> {
        if self.cells.is_empty() || min_x > max_x || min_z > max_z {
            return Vec::new();
        }
        let (x0, z0) = self.key(min_x, min_z);
        let (x1, z1) = self.key(max_x, max_z);

        let span = (x1 as i64 - x0 as i64 + 1).saturating_mul(z1 as i64 - z0 as i64 + 1);
        let mut out = Vec::new();

        if span > self.cells.len() as i64 * SPARSE_SCAN_FACTOR {
            for (&(cx, cz), bucket) in &self.cells {
                if (x0..=x1).contains(&cx) && (z0..=z1).contains(&cz) {
                    out.extend(bucket.iter());
                }
            }
            return out;
        }

        for cx in x0..=x1 {
            for cz in z0..=z1 {
                if let Some(bucket) = self.cells.get(&(cx, cz)) {
                    out.extend(bucket.iter());
                }
            }
        }
        out
    }

    /// Points within `radius` of `center` by exact 3D distance.
    pub fn points_in_radius(&self, center: Vec3, radius: f32) -> Vec<&T> {
        if !(radius >= 0.0) {
            return Vec::new();
        }
        let r2 = radius * radius;
        self.points_in_bounds(center.x - radius, center.z - radius, center.x + radius, center.z + radius)
            .into_iter()
            .filter(|p| p.grid_position().distance_squared(center) <= r2)
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of occupied cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(points: &[Vec3]) -> SpatialGrid<Vec3> {
        let mut g = SpatialGrid::new(50.0).unwrap();
        g.update_points(points);
        g
    }

    #[test]
    fn rejects_bad_cell_sizes() {
        assert!(SpatialGrid::<Vec3>::new(0.0).is_err());
        assert!(SpatialGrid::<Vec3>::new(-1.0).is_err());
        assert!(SpatialGrid::<Vec3>::new(f32::NAN).is_err());
    }

    #[test]
    fn negative_coordinates_floor_into_their_own_cells() {
        let g = grid(&[Vec3::new(-0.5, 0.0, -0.5), Vec3::new(0.5, 0.0, 0.5)]);
        assert_eq!(g.cell_count(), 2);
        assert_eq!(g.points_in_bounds(-10.0, -10.0, -1.0, -1.0).len(), 1);
    }

    #[test]
    fn update_replaces_previous_contents() {
        let mut g = grid(&[Vec3::ZERO, Vec3::new(100.0, 0.0, 100.0)]);
        assert_eq!(g.len(), 2);
        g.update_points(&[Vec3::new(10.0, 0.0, 10.0)]);
        assert_eq!(g.len(), 1);
        assert_eq!(g.cell_count(), 1);
    }

    #[test]
    fn bounds_query_is_cell_granular() {
        let g = grid(&[Vec3::new(1.0, 0.0, 1.0), Vec3::new(49.0, 0.0, 49.0), Vec3::new(75.0, 0.0, 1.0)]);
        // The box only covers (0..5, 0..5) but the whole first cell comes back.
        assert_eq!(g.points_in_bounds(0.0, 0.0, 5.0, 5.0).len(), 2);
        assert_eq!(g.points_in_bounds(0.0, 0.0, 60.0, 5.0).len(), 3);
    }

    #[test]
    fn radius_query_filters_exactly() {
        let g = grid(&[Vec3::new(1.0, 0.0, 1.0), Vec3::new(49.0, 0.0, 49.0), Vec3::new(3.0, 4.0, 0.0)]);
        let hits = g.points_in_radius(Vec3::ZERO, 5.0);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|p| p.length() <= 5.0));
    }

    #[test]
    fn huge_boxes_walk_occupied_cells() {
        let g = grid(&[Vec3::new(-1.0e6, 0.0, 0.0), Vec3::new(1.0e6, 0.0, 0.0)]);
        assert_eq!(g.points_in_bounds(-2.0e6, -2.0e6, 2.0e6, 2.0e6).len(), 2);
    }
}
