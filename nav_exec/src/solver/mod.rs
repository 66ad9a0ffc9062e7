//! # Grid path solvers
//!
//! A solver plans a sequence of cells through a [`LocalCostMap`] between a
//! start and target cell. The planner is decoupled from the concrete solver
//! through the [`GridSolver`] trait so that scenario tests can substitute
//! deterministic fakes.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use ordered_float::NotNan;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};
use thiserror::Error;

// Internal imports
use crate::map::LocalCostMap;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors produced by a grid solve.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("Cell index {0} is outside the map")]
    InvalidCell(i64),

    #[error("No traversable path exists between the start and target cells")]
    NoPath,

    #[error("The solve did not complete within the allowed time")]
    Timeout,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A solver able to plan a cell sequence through a cost map.
pub trait GridSolver {
    /// Plan a path from `start_idx` to `target_idx`, returning the linear
    /// cell indices from start to target inclusive.
    fn solve(
        &self,
        map: &LocalCostMap,
        start_idx: i64,
        target_idx: i64,
        timeout: Duration,
    ) -> Result<Vec<usize>, SolveError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An A* solver over the 8-connected cell grid.
///
/// Cells with unknown cost, or cost at or above `danger_cost`, are not
/// traversable. Step costs are weighted by the destination cell's cost so
/// that the solver prefers low cost terrain over the geometrically shortest
/// route.
pub struct AStarSolver {
    /// Cost at which a cell stops being traversable
    pub danger_cost: i8,
}

/// Cost of a node on the open set.
///
/// Ordered by reversed estimated total cost, so that the maximum element of a
/// [`BinaryHeap`] is the node with the lowest estimate.
#[derive(Clone, Copy, PartialEq, Eq)]
struct NodeCost {
    estimate: NotNan<f64>,
    idx: usize,
}

impl Ord for NodeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for NodeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GridSolver for AStarSolver {
    fn solve(
        &self,
        map: &LocalCostMap,
        start_idx: i64,
        target_idx: i64,
        timeout: Duration,
    ) -> Result<Vec<usize>, SolveError> {
        map.raw(start_idx).ok_or(SolveError::InvalidCell(start_idx))?;
        map.raw(target_idx)
            .ok_or(SolveError::InvalidCell(target_idx))?;

        let start = start_idx as usize;
        let target = target_idx as usize;
        let width = map.width as i64;
        let num_cells = map.num_cells();

        let solve_epoch = Instant::now();

        let mut open = BinaryHeap::new();
        let mut came_from: Vec<Option<usize>> = vec![None; num_cells];
        let mut best_cost: Vec<f64> = vec![std::f64::INFINITY; num_cells];

        best_cost[start] = 0.0;
        open.push(NodeCost {
            estimate: heuristic(map, start, target),
            idx: start,
        });

        while let Some(NodeCost { idx, .. }) = open.pop() {
            // Deadline check on every expansion, the tick budget is short
            if solve_epoch.elapsed() >= timeout {
                return Err(SolveError::Timeout);
            }

            if idx == target {
                return Ok(reconstruct(&came_from, start, target));
            }

            let row = idx as i64 / width;
            let col = idx as i64 % width;

            for &(dr, dc) in &[
                (-1i64, -1i64),
                (-1, 0),
                (-1, 1),
                (0, -1),
                (0, 1),
                (1, -1),
                (1, 0),
                (1, 1),
            ] {
                let nrow = row + dr;
                let ncol = col + dc;
                if nrow < 0 || nrow >= map.height as i64 || ncol < 0 || ncol >= width {
                    continue;
                }

                let nidx = (nrow * width + ncol) as usize;
                let cell_cost = map.data[nidx];

                if cell_cost < 0 || cell_cost >= self.danger_cost {
                    continue;
                }

                let step_len = ((dr * dr + dc * dc) as f64).sqrt();
                let step_cost = step_len * (1.0 + cell_cost as f64 / 100.0);
                let tentative = best_cost[idx] + step_cost;

                if tentative < best_cost[nidx] {
                    best_cost[nidx] = tentative;
                    came_from[nidx] = Some(idx);
                    // tentative is a finite sum, so it cannot be NaN
                    open.push(NodeCost {
                        estimate: heuristic(map, nidx, target)
                            + NotNan::new(tentative).unwrap_or_else(|_| NotNan::default()),
                        idx: nidx,
                    });
                }
            }
        }

        Err(SolveError::NoPath)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Euclidean distance between two cells, in cells.
fn heuristic(map: &LocalCostMap, a: usize, b: usize) -> NotNan<f64> {
    let width = map.width as i64;
    let dr = (a as i64 / width - b as i64 / width) as f64;
    let dc = (a as i64 % width - b as i64 % width) as f64;

    // dr and dc are finite so the hypotenuse cannot be NaN
    NotNan::new((dr * dr + dc * dc).sqrt()).unwrap_or_else(|_| NotNan::default())
}

/// Walk the parent links back from the target and reverse into a path.
fn reconstruct(came_from: &[Option<usize>], start: usize, target: usize) -> Vec<usize> {
    let mut path = vec![target];
    let mut current = target;

    while current != start {
        match came_from[current] {
            Some(prev) => {
                path.push(prev);
                current = prev;
            }
            None => break,
        }
    }

    path.reverse();
    path
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector2;

    const SOLVE_TIMEOUT: Duration = Duration::from_millis(500);

    fn free_map(width: usize, height: usize) -> LocalCostMap {
        LocalCostMap::filled(0.2, Vector2::new(0.0, 0.0), width, height, 0)
    }

    #[test]
    fn solves_across_free_map() {
        let map = free_map(5, 5);
        let solver = AStarSolver { danger_cost: 80 };

        let cells = solver.solve(&map, 0, 24, SOLVE_TIMEOUT).unwrap();

        assert_eq!(*cells.first().unwrap(), 0);
        assert_eq!(*cells.last().unwrap(), 24);
        // Pure diagonal is optimal on a free map
        assert_eq!(cells.len(), 5);
    }

    #[test]
    fn detours_around_blocked_cells() {
        let mut map = free_map(5, 5);
        // Wall down column 2, with a gap in the bottom row
        for row in 0..4 {
            map.data[row * 5 + 2] = 95;
        }
        let solver = AStarSolver { danger_cost: 80 };

        let cells = solver.solve(&map, 10, 14, SOLVE_TIMEOUT).unwrap();

        assert_eq!(*cells.first().unwrap(), 10);
        assert_eq!(*cells.last().unwrap(), 14);
        for &c in &cells {
            assert!(map.data[c] < 80, "path crosses blocked cell {}", c);
        }
    }

    #[test]
    fn unknown_cells_are_not_traversable() {
        let mut map = free_map(3, 1);
        map.data[1] = -1;
        let solver = AStarSolver { danger_cost: 80 };

        assert!(matches!(
            solver.solve(&map, 0, 2, SOLVE_TIMEOUT),
            Err(SolveError::NoPath)
        ));
    }

    #[test]
    fn zero_timeout_fails_deterministically() {
        let map = free_map(5, 5);
        let solver = AStarSolver { danger_cost: 80 };

        assert!(matches!(
            solver.solve(&map, 0, 24, Duration::from_secs(0)),
            Err(SolveError::Timeout)
        ));
    }

    #[test]
    fn out_of_map_cells_are_rejected() {
        let map = free_map(5, 5);
        let solver = AStarSolver { danger_cost: 80 };

        assert!(matches!(
            solver.solve(&map, -3, 24, SOLVE_TIMEOUT),
            Err(SolveError::InvalidCell(-3))
        ));
        assert!(matches!(
            solver.solve(&map, 0, 25, SOLVE_TIMEOUT),
            Err(SolveError::InvalidCell(25))
        ));
    }
}
