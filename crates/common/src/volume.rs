use glam::IVec3;
use serde::{Deserialize, Serialize};

/// A cell coordinate. `x` and `y` span the horizontal plane, `z` is vertical (up = +z).
pub type Coord = IVec3;

/// Largest number of cells a volume may hold.
///
/// Path costs are packed into 27 bits of the search ledger; the costliest move is 12 units,
/// so `12 * MAX_CELLS` must stay below `1 << 27`.
pub const MAX_CELLS: usize = 1 << 23;

/// Errors from grid addressing and storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("coordinate {coord} is outside volume {width}x{height}x{depth}")]
    OutOfBounds {
        coord: Coord,
        width: u32,
        height: u32,
        depth: u32,
    },
    #[error("index {index} is outside a volume of {cell_count} cells")]
    IndexOutOfBounds { index: usize, cell_count: usize },
    #[error("buffer holds {actual} cells, volume needs {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("volume extents must be positive, got {width}x{height}x{depth}")]
    ZeroExtent { width: u32, height: u32, depth: u32 },
    #[error("volume of {cells} cells exceeds the limit of {MAX_CELLS}")]
    TooLarge { cells: usize },
}

impl GridError {
    /// True for both coordinate and index bounds failures.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            GridError::OutOfBounds { .. } | GridError::IndexOutOfBounds { .. }
        )
    }
}

/// Fixed extents of the world, immutable once configured.
///
/// Linear layout is x fastest, then y, then z:
/// `index = x + width * (y + height * z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 3]", into = "[u32; 3]")]
pub struct Volume {
    width: u32,
    height: u32,
    depth: u32,
}

impl Volume {
    pub fn new(width: u32, height: u32, depth: u32) -> Result<Self, GridError> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(GridError::ZeroExtent {
                width,
                height,
                depth,
            });
        }
        let cells = (width as usize)
            .checked_mul(height as usize)
            .and_then(|c| c.checked_mul(depth as usize))
            .unwrap_or(usize::MAX);
        if cells > MAX_CELLS {
            return Err(GridError::TooLarge { cells });
        }
        Ok(Self {
            width,
            height,
            depth,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Total number of addressable cells.
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }

    /// Whether `coord` lies inside the volume.
    pub fn contains(&self, coord: Coord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && (coord.x as u32) < self.width
            && (coord.y as u32) < self.height
            && (coord.z as u32) < self.depth
    }

    /// Linear index of `coord`.
    pub fn index_of(&self, coord: Coord) -> Result<usize, GridError> {
        if !self.contains(coord) {
            return Err(self.out_of_bounds(coord));
        }
        let (w, h) = (self.width as usize, self.height as usize);
        Ok(coord.x as usize + w * (coord.y as usize + h * coord.z as usize))
    }

    /// Inverse of [`Volume::index_of`].
    pub fn coord_of(&self, index: usize) -> Result<Coord, GridError> {
        if index >= self.cell_count() {
            return Err(GridError::IndexOutOfBounds {
                index,
                cell_count: self.cell_count(),
            });
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let x = index % w;
        let y = (index / w) % h;
        let z = index / (w * h);
        Ok(IVec3::new(x as i32, y as i32, z as i32))
    }

    fn out_of_bounds(&self, coord: Coord) -> GridError {
        GridError::OutOfBounds {
            coord,
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }
}

impl TryFrom<[u32; 3]> for Volume {
    type Error = GridError;

    fn try_from([width, height, depth]: [u32; 3]) -> Result<Self, Self::Error> {
        Volume::new(width, height, depth)
    }
}

impl From<Volume> for [u32; 3] {
    fn from(v: Volume) -> Self {
        [v.width, v.height, v.depth]
    }
}
