//! # Local cost map
//!
//! The local cost map is a rolling occupancy-cost grid centred near the robot.
//! Cells hold a cost in `[0, 100]`, with `-1` marking unknown terrain. The map
//! is stored row-major, with the cell's world position derived from the map
//! origin and resolution.
//!
//! Costs are evaluated through square kernels centred on a cell, which smear
//! each cell's cost over the robot's footprint scale. Kernel evaluation never
//! wraps across row boundaries and treats out-of-map cells as absent.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Cell cost marking unknown terrain
pub const UNKNOWN_COST: i8 = -1;

/// Maximum cell cost
pub const MAX_COST: i8 = 100;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The kernel used to aggregate cell costs around a centre cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostKernel {
    /// Maximum cost over the kernel window
    Max,

    /// Average cost over the nominal kernel window. Cells falling outside the
    /// map still count towards the divisor, diluting the average near map
    /// borders.
    Avg,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A rolling local cost map in the robot's vicinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCostMap {
    /// Size of each (square) cell in meters
    pub resolution_m: f64,

    /// Position of the cell `(0, 0)` corner in the map's frame
    pub origin_m: Vector2<f64>,

    /// Number of cells along the x axis
    pub width: usize,

    /// Number of cells along the y axis
    pub height: usize,

    /// Cell costs in row-major order, length `width * height`
    pub data: Vec<i8>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LocalCostMap {
    /// Create a map of the given dimensions with all cells set to `cost`.
    pub fn filled(resolution_m: f64, origin_m: Vector2<f64>, width: usize, height: usize, cost: i8) -> Self {
        Self {
            resolution_m,
            origin_m,
            width,
            height,
            data: vec![cost; width * height],
        }
    }

    /// Number of cells in the map
    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    /// Get the raw cost of the cell at the given linear index, or `None` if
    /// the index is outside the map.
    pub fn raw(&self, idx: i64) -> Option<i8> {
        if idx < 0 || idx >= self.num_cells() as i64 {
            None
        } else {
            Some(self.data[idx as usize])
        }
    }

    /// Get the linear index of the cell containing the given point (in the
    /// map's frame), rounding to the nearest cell.
    ///
    /// The returned index may lie outside the map, callers must check it with
    /// [`LocalCostMap::raw`] or similar.
    pub fn index_of_point(&self, point_m: &Point2<f64>) -> i64 {
        let col = ((point_m.x - self.origin_m.x) / self.resolution_m).round() as i64;
        let row = ((point_m.y - self.origin_m.y) / self.resolution_m).round() as i64;
        row * self.width as i64 + col
    }

    /// Get the position (in the map's frame) of the cell at the given linear
    /// index. The index must refer to an in-map cell.
    pub fn point_of_index(&self, idx: i64) -> Point2<f64> {
        let col = idx % self.width as i64;
        let row = idx / self.width as i64;
        Point2::new(
            self.origin_m.x + col as f64 * self.resolution_m,
            self.origin_m.y + row as f64 * self.resolution_m,
        )
    }

    /// Get the kernel dimensions (size, bound) for the given radius.
    ///
    /// The kernel size is the radius in whole cells, forced odd, and the
    /// bound is the half-width of the window either side of the centre.
    pub fn kernel_dims(&self, radius_m: f64) -> (i64, i64) {
        let mut size = (radius_m / self.resolution_m) as i64;
        if size % 2 == 0 {
            size += 1;
        }
        (size, size / 2)
    }

    /// Evaluate a cost kernel of the given radius centred on the given cell.
    ///
    /// Cells outside the map, and cells whose column offset from the centre
    /// exceeds the kernel bound (which would mean wrapping onto another row),
    /// are excluded from the window. A centre index outside the map therefore
    /// yields a cost of zero.
    pub fn kernel_cost(&self, kernel: CostKernel, centre_idx: i64, radius_m: f64) -> i32 {
        if self.data.is_empty() || self.width == 0 {
            return 0;
        }
        if centre_idx < 0 || centre_idx >= self.num_cells() as i64 {
            return 0;
        }

        let (size, bound) = self.kernel_dims(radius_m);
        let width = self.width as i64;
        let num_cells = self.num_cells() as i64;
        let centre_col = centre_idx % width;

        let mut max: i32 = 0;
        let mut sum: i64 = 0;

        for row_offset in -bound..=bound {
            for col_offset in -bound..=bound {
                let idx = centre_idx + row_offset * width + col_offset;

                if idx < 0 || idx >= num_cells {
                    continue;
                }

                // Row wrap guard, the window must not spill onto another row
                if (idx % width - centre_col).abs() > bound {
                    continue;
                }

                let cost = self.data[idx as usize] as i32;
                sum += cost as i64;
                if cost > max {
                    max = cost;
                }
            }
        }

        match kernel {
            CostKernel::Max => max,
            CostKernel::Avg => (sum / (size * size)) as i32,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn free_map(width: usize, height: usize, res: f64) -> LocalCostMap {
        LocalCostMap::filled(res, Vector2::new(0.0, 0.0), width, height, 0)
    }

    #[test]
    fn max_kernel_on_free_map_is_zero() {
        let map = free_map(10, 10, 0.2);

        for idx in 0..map.num_cells() as i64 {
            assert_eq!(map.kernel_cost(CostKernel::Max, idx, 0.6), 0);
        }
    }

    #[test]
    fn kernel_on_out_of_map_centre_is_zero() {
        let mut map = free_map(5, 5, 0.2);
        map.data.iter_mut().for_each(|c| *c = 90);

        assert_eq!(map.kernel_cost(CostKernel::Max, -1, 0.6), 0);
        assert_eq!(map.kernel_cost(CostKernel::Max, 25, 0.6), 0);
        assert_eq!(map.kernel_cost(CostKernel::Avg, -13, 1.0), 0);
    }

    #[test]
    fn max_kernel_does_not_wrap_rows() {
        // Radius 0.6 m at 0.2 m/cell gives a 3x3 kernel (bound 1). Cell 4 is
        // the end of row 0 and cell 5 the start of row 1, so a naive linear
        // window around cell 5 would pick up cell 4's cost.
        let mut map = free_map(5, 5, 0.2);
        map.data[4] = 90;

        assert_eq!(map.kernel_cost(CostKernel::Max, 5, 0.6), 0);

        // The same cost is seen from its own row
        assert_eq!(map.kernel_cost(CostKernel::Max, 3, 0.6), 90);
    }

    #[test]
    fn max_kernel_ignores_unknown_cells() {
        let mut map = free_map(5, 5, 0.2);
        map.data.iter_mut().for_each(|c| *c = UNKNOWN_COST);

        assert_eq!(map.kernel_cost(CostKernel::Max, 12, 0.6), 0);
    }

    #[test]
    fn avg_kernel_dilutes_at_map_border() {
        // 3x3 kernel centred on the map corner sees 4 in-map cells of cost
        // 90, but the divisor stays at the nominal 9 cells.
        let map = LocalCostMap::filled(0.5, Vector2::new(0.0, 0.0), 3, 3, 90);

        assert_eq!(map.kernel_cost(CostKernel::Avg, 0, 1.0), 40);

        // Fully interior centre sees the undiluted average
        assert_eq!(map.kernel_cost(CostKernel::Avg, 4, 1.0), 90);
    }

    #[test]
    fn even_kernel_sizes_are_forced_odd() {
        let map = free_map(5, 5, 0.5);

        // 1.0 / 0.5 = 2 cells, forced to 3
        assert_eq!(map.kernel_dims(1.0), (3, 1));
    }

    #[test]
    fn point_index_round_trip() {
        let map = LocalCostMap::filled(0.2, Vector2::new(-1.0, -1.0), 10, 10, 0);

        let idx = map.index_of_point(&Point2::new(0.0, 0.0));
        assert_eq!(idx, 55);

        let p = map.point_of_index(idx);
        assert!((p.x - 0.0).abs() < 1e-9);
        assert!((p.y - 0.0).abs() < 1e-9);
    }
}
