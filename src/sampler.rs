use std::f64::consts::PI;

use rand::Rng;

use crate::error::TaskError;
use crate::grid::OccupancyGrid;
use crate::types::{ExclusionZone, Pose};

/// Consecutive failed candidates before a map is declared unusable.
pub const MAX_SAMPLE_ATTEMPTS: u32 = 100;

/// Draw a uniformly random collision-free pose on the map.
///
/// A candidate cell is valid when it clears every exclusion zone by
/// `zone.radius + safety_distance` and every cell of the square
/// `floor(safety_distance / resolution)` neighborhood around it is in-bounds
/// and free. Orientation is drawn from `[-PI, PI]` once a position is
/// accepted.
pub fn sample_pose(
    free_cells: &[(u32, u32)],
    grid: &OccupancyGrid,
    exclusion_zones: &[ExclusionZone],
    safety_distance: f64,
    rng: &mut impl Rng,
) -> Result<Pose, TaskError> {
    if !free_cells.is_empty() {
        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            let (row, col) = free_cells[rng.random_range(0..free_cells.len())];
            let (x, y) = grid.meta().cell_to_world(row, col);
            if !clears_zones(exclusion_zones, safety_distance, x, y) {
                continue;
            }
            if !has_local_clearance(grid, safety_distance, x, y) {
                continue;
            }
            return Ok(Pose::new(x, y, rng.random_range(-PI..PI)));
        }
    }
    Err(TaskError::PlacementExhausted {
        attempts: MAX_SAMPLE_ATTEMPTS,
        zones: exclusion_zones.len(),
    })
}

fn clears_zones(zones: &[ExclusionZone], safety_distance: f64, x: f64, y: f64) -> bool {
    zones.iter().all(|zone| {
        let clearance = zone.radius + safety_distance;
        (x - zone.x).powi(2) + (y - zone.y).powi(2) >= clearance * clearance
    })
}

fn has_local_clearance(grid: &OccupancyGrid, safety_distance: f64, x: f64, y: f64) -> bool {
    let radius = (safety_distance / grid.meta().resolution).floor() as i64;
    let (row, col) = grid.meta().world_to_cell(x, y);
    for dr in -radius..=radius {
        for dc in -radius..=radius {
            // out-of-bounds neighbors count as occupied
            if !grid.is_free(row + dr, col + dc) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridMeta;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn grid(width: u32, height: u32, resolution: f64, occupied: &[(u32, u32)]) -> OccupancyGrid {
        let mut cells = vec![0i8; (width * height) as usize];
        for &(row, col) in occupied {
            cells[(row * width + col) as usize] = 100;
        }
        OccupancyGrid::new(
            GridMeta {
                width,
                height,
                resolution,
                origin_x: 0.0,
                origin_y: 0.0,
            },
            cells,
        )
        .unwrap()
    }

    fn free_cells(grid: &OccupancyGrid) -> Vec<(u32, u32)> {
        let meta = *grid.meta();
        (0..meta.height)
            .flat_map(|row| (0..meta.width).map(move |col| (row, col)))
            .filter(|&(row, col)| grid.is_free(row as i64, col as i64))
            .collect()
    }

    #[test]
    fn respects_zones_and_occupied_block() {
        // 10x10, occupied 2x2 block at rows/cols 5..=6, zone at (1,1) r=1.0,
        // safety 0.5: no pose within 1.5 of (1,1), none inside the block.
        let grid = grid(10, 10, 1.0, &[(5, 5), (5, 6), (6, 5), (6, 6)]);
        let free = free_cells(&grid);
        let zones = [ExclusionZone::new(1.0, 1.0, 1.0)];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let pose = sample_pose(&free, &grid, &zones, 0.5, &mut rng).unwrap();
            let dist_sq = pose.squared_planar_distance(1.0, 1.0);
            assert!(dist_sq >= 1.5 * 1.5, "pose {pose:?} violates the zone");
            let (row, col) = grid.meta().world_to_cell(pose.x, pose.y);
            assert!(
                !(5..=6).contains(&row) || !(5..=6).contains(&col),
                "pose {pose:?} landed in the occupied block"
            );
        }
    }

    #[test]
    fn clearance_radius_excludes_border_cells() {
        // 3x3 with safety of one full cell: only the center survives the
        // neighborhood check, every border cell has out-of-bounds neighbors.
        let grid = grid(3, 3, 1.0, &[]);
        let free = free_cells(&grid);
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..50 {
            let pose = sample_pose(&free, &grid, &[], 1.0, &mut rng).unwrap();
            assert_eq!(grid.meta().world_to_cell(pose.x, pose.y), (1, 1));
        }
    }

    #[test]
    fn neighborhood_blocks_cells_near_occupancy() {
        // resolution 0.5, safety 1.0 -> radius of two cells around (4, 4).
        let grid = grid(12, 12, 0.5, &[(4, 4)]);
        let free = free_cells(&grid);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..100 {
            let pose = sample_pose(&free, &grid, &[], 1.0, &mut rng).unwrap();
            let (row, col) = grid.meta().world_to_cell(pose.x, pose.y);
            assert!(
                (row - 4).abs() > 2 || (col - 4).abs() > 2,
                "pose {pose:?} is within two cells of the occupied cell"
            );
        }
    }

    #[test]
    fn empty_free_index_exhausts_budget() {
        let grid = grid(4, 4, 1.0, &[]);
        let mut rng = StdRng::seed_from_u64(1);
        let result = sample_pose(&[], &grid, &[], 0.2, &mut rng);
        match result {
            Err(TaskError::PlacementExhausted { attempts, zones }) => {
                assert_eq!(attempts, MAX_SAMPLE_ATTEMPTS);
                assert_eq!(zones, 0);
            }
            other => panic!("expected PlacementExhausted, got {other:?}"),
        }
    }

    #[test]
    fn fully_excluded_map_exhausts_budget() {
        let grid = grid(4, 4, 1.0, &[]);
        let free = free_cells(&grid);
        // a zone swallowing the whole map
        let zones = [ExclusionZone::new(2.0, 2.0, 50.0)];
        let mut rng = StdRng::seed_from_u64(5);
        let result = sample_pose(&free, &grid, &zones, 0.2, &mut rng);
        match result {
            Err(TaskError::PlacementExhausted { attempts, zones }) => {
                assert_eq!(attempts, MAX_SAMPLE_ATTEMPTS);
                assert_eq!(zones, 1);
            }
            other => panic!("expected PlacementExhausted, got {other:?}"),
        }
    }

    #[test]
    fn orientation_stays_in_range() {
        let grid = grid(6, 6, 1.0, &[]);
        let free = free_cells(&grid);
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..100 {
            let pose = sample_pose(&free, &grid, &[], 0.2, &mut rng).unwrap();
            assert!((-PI..=PI).contains(&pose.theta));
        }
    }
}
