use voxpath_common::{Coord, GridError, Volume};

/// Dense, bounds-checked storage of one value per cell of a [`Volume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    volume: Volume,
    cells: Vec<T>,
}

/// Collision flags: 0 = traversable, anything else = blocked.
pub type CollisionGrid = Grid<u8>;

/// Per-job search bookkeeping values.
pub type AccountingGrid = Grid<u32>;

impl<T: Copy + Default> Grid<T> {
    /// Allocate a grid with every cell set to `T::default()`.
    pub fn zeroed(volume: Volume) -> Self {
        Self::filled(volume, T::default())
    }
}

impl<T: Copy> Grid<T> {
    /// Allocate a grid with every cell set to `value`.
    pub fn filled(volume: Volume, value: T) -> Self {
        Self {
            volume,
            cells: vec![value; volume.cell_count()],
        }
    }

    /// Wrap a caller-supplied buffer. Its length must equal the volume's cell count.
    pub fn from_raw(volume: Volume, cells: Vec<T>) -> Result<Self, GridError> {
        if cells.len() != volume.cell_count() {
            return Err(GridError::SizeMismatch {
                expected: volume.cell_count(),
                actual: cells.len(),
            });
        }
        Ok(Self { volume, cells })
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn get(&self, index: usize) -> Result<T, GridError> {
        self.cells
            .get(index)
            .copied()
            .ok_or(GridError::IndexOutOfBounds {
                index,
                cell_count: self.cells.len(),
            })
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<(), GridError> {
        let cell_count = self.cells.len();
        let slot = self
            .cells
            .get_mut(index)
            .ok_or(GridError::IndexOutOfBounds { index, cell_count })?;
        *slot = value;
        Ok(())
    }

    pub fn get_at(&self, coord: Coord) -> Result<T, GridError> {
        self.get(self.volume.index_of(coord)?)
    }

    pub fn set_at(&mut self, coord: Coord, value: T) -> Result<(), GridError> {
        let index = self.volume.index_of(coord)?;
        self.set(index, value)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    pub fn into_inner(self) -> Vec<T> {
        self.cells
    }
}

impl CollisionGrid {
    /// Whether the cell at `coord` is blocked. Cells outside the volume count as blocked.
    pub fn is_blocked(&self, coord: Coord) -> bool {
        self.get_at(coord).map(|flag| flag != 0).unwrap_or(true)
    }

    /// Mark `coord` as blocked or open.
    pub fn set_blocked(&mut self, coord: Coord, blocked: bool) -> Result<(), GridError> {
        self.set_at(coord, u8::from(blocked))
    }
}
