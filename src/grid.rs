use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::TaskError;
use crate::sim_interface::{GridMetaMsg, OccupancyGridMsg};

/// Occupancy value of an unoccupied cell.
pub const FREE: i8 = 0;

/// Grid geometry needed for cell/world coordinate conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMeta {
    pub width: u32,
    pub height: u32,
    pub resolution: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl GridMeta {
    /// World coordinates of a cell, cell-origin convention.
    pub fn cell_to_world(&self, row: u32, col: u32) -> (f64, f64) {
        (
            col as f64 * self.resolution + self.origin_x,
            row as f64 * self.resolution + self.origin_y,
        )
    }

    /// Cell indices containing a world point. May fall outside the grid.
    pub fn world_to_cell(&self, x: f64, y: f64) -> (i64, i64) {
        (
            ((y - self.origin_y) / self.resolution).floor() as i64,
            ((x - self.origin_x) / self.resolution).floor() as i64,
        )
    }
}

/// One row-major occupancy snapshot. Replaced wholesale on every map update,
/// never partially mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    meta: GridMeta,
    cells: Vec<i8>,
}

impl OccupancyGrid {
    pub fn new(meta: GridMeta, cells: Vec<i8>) -> Result<Self, TaskError> {
        let expected = meta.width as u64 * meta.height as u64;
        if cells.len() as u64 != expected {
            return Err(TaskError::configuration(format!(
                "grid data length {} does not match {}x{} cells",
                cells.len(),
                meta.width,
                meta.height
            )));
        }
        Ok(Self { meta, cells })
    }

    pub fn meta(&self) -> &GridMeta {
        &self.meta
    }

    /// Occupancy value at (row, col), `None` outside the grid.
    pub fn value_at(&self, row: i64, col: i64) -> Option<i8> {
        if row < 0 || col < 0 || row >= self.meta.height as i64 || col >= self.meta.width as i64 {
            return None;
        }
        Some(self.cells[row as usize * self.meta.width as usize + col as usize])
    }

    /// Out-of-bounds cells count as blocked.
    pub fn is_free(&self, row: i64, col: i64) -> bool {
        self.value_at(row, col) == Some(FREE)
    }

    fn free_cells(&self) -> Vec<(u32, u32)> {
        let mut free = Vec::new();
        for row in 0..self.meta.height {
            for col in 0..self.meta.width {
                if self.cells[row as usize * self.meta.width as usize + col as usize] == FREE {
                    free.push((row, col));
                }
            }
        }
        free
    }
}

impl TryFrom<OccupancyGridMsg> for OccupancyGrid {
    type Error = TaskError;

    fn try_from(msg: OccupancyGridMsg) -> Result<Self, TaskError> {
        let meta = msg
            .meta
            .ok_or_else(|| TaskError::configuration("map snapshot is missing grid metadata"))?;
        OccupancyGrid::new(
            GridMeta {
                width: meta.width,
                height: meta.height,
                resolution: meta.resolution,
                origin_x: meta.origin_x,
                origin_y: meta.origin_y,
            },
            msg.cells.iter().map(|&b| b as i8).collect(),
        )
    }
}

impl From<&OccupancyGrid> for OccupancyGridMsg {
    fn from(grid: &OccupancyGrid) -> Self {
        OccupancyGridMsg {
            meta: Some(GridMetaMsg {
                width: grid.meta.width,
                height: grid.meta.height,
                resolution: grid.meta.resolution,
                origin_x: grid.meta.origin_x,
                origin_y: grid.meta.origin_y,
            }),
            cells: grid.cells.iter().map(|&c| c as u8).collect(),
        }
    }
}

/// The current map plus its derived free-cell index.
///
/// The index is recomputed exactly once per replacement, so it is never
/// stale relative to the grid a reset samples from.
#[derive(Debug, Clone)]
pub struct MapModel {
    grid: OccupancyGrid,
    free_cells: Vec<(u32, u32)>,
}

impl MapModel {
    pub fn new(grid: OccupancyGrid) -> Self {
        let free_cells = grid.free_cells();
        Self { grid, free_cells }
    }

    pub fn replace(&mut self, grid: OccupancyGrid) {
        self.free_cells = grid.free_cells();
        self.grid = grid;
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn free_cells(&self) -> &[(u32, u32)] {
        &self.free_cells
    }

    pub fn meta(&self) -> &GridMeta {
        self.grid.meta()
    }
}

/// The map synchronization guard: map replacement and entire reset bodies
/// serialize on this mutex.
pub type SharedMap = Arc<Mutex<MapModel>>;

pub fn shared(model: MapModel) -> SharedMap {
    Arc::new(Mutex::new(model))
}
