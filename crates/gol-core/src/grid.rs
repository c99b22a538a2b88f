//! Toroidal grid, the Life rule kernel, and the double buffer.
//!
//! The [`Grid`] stores cells row-major. Every lookup wraps toroidally: the
//! neighbour of column 0 is column `width - 1`, the neighbour of row 0 is
//! row `height - 1`.
//!
//! The kernel is two pure functions, [`neighbour_count`] and
//! [`next_cell_state`]. They read only the grid they are given, so any
//! number of workers may call them at once on the same read-only buffer.
//!
//! [`BufferPair`] holds the two grids of a run. Workers read the current
//! grid and write the next one; the scheduler flips the current index once
//! every worker has finished.

use gol_types::{Cell, CellError, Coord};

/// Errors raised while building a grid from external data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// Width or height is zero.
    #[error("grid dimensions must be at least 1x1 (got {width}x{height})")]
    Empty {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },

    /// `width * height` does not fit in memory.
    #[error("grid dimensions {width}x{height} overflow")]
    TooLarge {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },

    /// A row has a different length than the first row.
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        /// Index of the offending row.
        row: usize,
        /// Expected row length.
        expected: usize,
        /// Actual row length.
        found: usize,
    },

    /// The byte buffer does not hold exactly `width * height` cells.
    #[error("expected {expected} cells, found {found}")]
    WrongLength {
        /// Expected cell count.
        expected: usize,
        /// Actual cell count.
        found: usize,
    },

    /// A byte is neither dead nor alive.
    #[error("cell ({x}, {y}): {source}")]
    Cell {
        /// Column of the offending byte.
        x: usize,
        /// Row of the offending byte.
        y: usize,
        /// The underlying cell error.
        source: CellError,
    },
}

/// A toroidal grid of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create an all-dead grid.
    pub fn new(width: usize, height: usize) -> Result<Self, GridError> {
        let len = checked_area(width, height)?;
        Ok(Self {
            width,
            height,
            cells: vec![Cell::Dead; len],
        })
    }

    /// Build a grid from row-major bytes (`grid[y][x]`).
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, GridError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        let len = checked_area(width, height)?;

        let mut cells = Vec::with_capacity(len);
        for (y, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(GridError::RaggedRow {
                    row: y,
                    expected: width,
                    found: row.len(),
                });
            }
            for (x, byte) in row.iter().enumerate() {
                let cell = Cell::try_from(*byte).map_err(|source| GridError::Cell { x, y, source })?;
                cells.push(cell);
            }
        }

        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Build a grid from a flat row-major byte buffer.
    pub fn from_bytes(width: usize, height: usize, bytes: &[u8]) -> Result<Self, GridError> {
        let len = checked_area(width, height)?;
        if bytes.len() != len {
            return Err(GridError::WrongLength {
                expected: len,
                found: bytes.len(),
            });
        }
        let cells = bytes
            .iter()
            .enumerate()
            .map(|(i, byte)| {
                Cell::try_from(*byte).map_err(|source| GridError::Cell {
                    x: i.checked_rem(width).unwrap_or(0),
                    y: i.checked_div(width).unwrap_or(0),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Build a grid with the given live cells. Coordinates wrap.
    pub fn with_alive(
        width: usize,
        height: usize,
        alive: impl IntoIterator<Item = Coord>,
    ) -> Result<Self, GridError> {
        let mut grid = Self::new(width, height)?;
        for coord in alive {
            grid.set(coord.x, coord.y, Cell::Alive);
        }
        Ok(grid)
    }

    /// Grid width in cells.
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    pub const fn height(&self) -> usize {
        self.height
    }

    /// The cell at `(x, y)`, wrapping toroidally.
    pub fn get(&self, x: usize, y: usize) -> Cell {
        self.cells
            .get(self.index(x, y))
            .copied()
            .unwrap_or_default()
    }

    /// Set the cell at `(x, y)`, wrapping toroidally.
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        let idx = self.index(x, y);
        if let Some(slot) = self.cells.get_mut(idx) {
            *slot = cell;
        }
    }

    /// One row of the grid. Empty if `y` is out of range.
    pub fn row(&self, y: usize) -> &[Cell] {
        let start = y.saturating_mul(self.width);
        let end = start.saturating_add(self.width);
        self.cells.get(start..end).unwrap_or(&[])
    }

    /// Number of live cells.
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_alive()).count()
    }

    /// Every live cell, in row-major order.
    pub fn alive_cells(&self) -> Vec<Coord> {
        self.coords()
            .zip(&self.cells)
            .filter(|(_, cell)| cell.is_alive())
            .map(|(coord, _)| coord)
            .collect()
    }

    /// Row-major byte rows (`rows[y][x]`).
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(self.width)
            .map(|row| row.iter().map(|c| c.to_byte()).collect())
            .collect()
    }

    /// Flat row-major bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.to_byte()).collect()
    }

    /// A copy of this grid cyclically shifted by `(dx, dy)`: the cell at
    /// `(x, y)` moves to `(x + dx, y + dy)`, wrapping.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn shifted(&self, dx: usize, dy: usize) -> Self {
        let mut out = self.clone();
        for coord in self.coords() {
            out.set(
                coord.x.wrapping_add(dx % self.width),
                coord.y.wrapping_add(dy % self.height),
                self.get(coord.x, coord.y),
            );
        }
        out
    }

    /// Mutable access to the row-major cell storage, for the evolver.
    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// All coordinates in row-major order.
    fn coords(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Coord::new(x, y)))
    }

    /// Flat index of `(x, y)` after toroidal wrapping.
    #[allow(clippy::arithmetic_side_effects)]
    fn index(&self, x: usize, y: usize) -> usize {
        // width and height are >= 1, enforced by every constructor.
        (y % self.height) * self.width + (x % self.width)
    }
}

/// `width * height`, rejecting empty and overflowing dimensions.
fn checked_area(width: usize, height: usize) -> Result<usize, GridError> {
    if width == 0 || height == 0 {
        return Err(GridError::Empty { width, height });
    }
    width
        .checked_mul(height)
        .ok_or(GridError::TooLarge { width, height })
}

// ---------------------------------------------------------------------------
// Rule kernel
// ---------------------------------------------------------------------------

/// Number of live cells among the 8 toroidal neighbours of `(x, y)`.
///
/// On grids smaller than 3 in either dimension a neighbour can be visited
/// more than once; every visit counts.
#[allow(clippy::arithmetic_side_effects)]
pub fn neighbour_count(grid: &Grid, x: usize, y: usize) -> u8 {
    let (w, h) = (grid.width(), grid.height());
    let (x, y) = (x % w, y % h);
    let cols = [(x + w - 1) % w, x, (x + 1) % w];
    let rows = [(y + h - 1) % h, y, (y + 1) % h];

    let mut count = 0;
    for (ri, ny) in rows.into_iter().enumerate() {
        for (ci, nx) in cols.into_iter().enumerate() {
            if ri == 1 && ci == 1 {
                continue;
            }
            if grid.get(nx, ny).is_alive() {
                count += 1;
            }
        }
    }
    count
}

/// The Life rule: a live cell survives with 2 or 3 neighbours, a dead
/// cell is born with exactly 3, everything else is dead.
pub const fn next_cell_state(current: Cell, neighbours: u8) -> Cell {
    match (current, neighbours) {
        (Cell::Alive, 2 | 3) | (Cell::Dead, 3) => Cell::Alive,
        _ => Cell::Dead,
    }
}

// ---------------------------------------------------------------------------
// Double buffer
// ---------------------------------------------------------------------------

/// Two equally-sized grids and the index of the current one.
#[derive(Debug, Clone)]
pub struct BufferPair {
    buffers: [Grid; 2],
    current: usize,
}

impl BufferPair {
    /// Create a pair whose current buffer is `initial`.
    pub fn new(initial: Grid) -> Self {
        let next = initial.clone();
        Self {
            buffers: [initial, next],
            current: 0,
        }
    }

    /// The current grid.
    pub fn current(&self) -> &Grid {
        let [a, b] = &self.buffers;
        if self.current == 0 { a } else { b }
    }

    /// Lend out the current grid read-only and the next grid writable.
    pub fn split(&mut self) -> (&Grid, &mut Grid) {
        let [a, b] = &mut self.buffers;
        if self.current == 0 { (a, b) } else { (b, a) }
    }

    /// Make the next grid current.
    pub const fn swap(&mut self) {
        self.current ^= 1;
    }

    /// Consume the pair and return the current grid.
    pub fn into_current(self) -> Grid {
        let [a, b] = self.buffers;
        if self.current == 0 { a } else { b }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn coords(cells: &[(usize, usize)]) -> Vec<Coord> {
        cells.iter().map(|&(x, y)| Coord::new(x, y)).collect()
    }

    #[test]
    fn new_grid_is_dead() {
        let grid = Grid::new(4, 3).unwrap();
        assert_eq!(grid.width(), 4);
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.alive_count(), 0);
    }

    #[test]
    fn empty_dimensions_rejected() {
        assert_eq!(
            Grid::new(0, 3),
            Err(GridError::Empty {
                width: 0,
                height: 3
            })
        );
        assert!(Grid::from_rows(&[]).is_err());
    }

    #[test]
    fn rows_round_trip() {
        let rows = vec![vec![0, 255, 0], vec![255, 255, 0]];
        let grid = Grid::from_rows(&rows).unwrap();
        assert_eq!(grid.to_rows(), rows);
        assert_eq!(grid.alive_cells(), coords(&[(1, 0), (0, 1), (1, 1)]));
    }

    #[test]
    fn ragged_rows_rejected() {
        let rows = vec![vec![0, 0, 0], vec![0, 0]];
        assert!(matches!(
            Grid::from_rows(&rows),
            Err(GridError::RaggedRow { row: 1, .. })
        ));
    }

    #[test]
    fn invalid_byte_reports_position() {
        let rows = vec![vec![0, 0], vec![0, 7]];
        assert!(matches!(
            Grid::from_rows(&rows),
            Err(GridError::Cell { x: 1, y: 1, .. })
        ));
    }

    #[test]
    fn flat_bytes_length_checked() {
        assert!(matches!(
            Grid::from_bytes(2, 2, &[0, 0, 0]),
            Err(GridError::WrongLength {
                expected: 4,
                found: 3
            })
        ));
        let grid = Grid::from_bytes(2, 2, &[0, 255, 255, 0]).unwrap();
        assert_eq!(grid.to_bytes(), vec![0, 255, 255, 0]);
    }

    #[test]
    fn lookups_wrap_toroidally() {
        let grid = Grid::with_alive(4, 4, coords(&[(3, 3)])).unwrap();
        assert!(grid.get(7, 7).is_alive());
        assert!(grid.get(3, 3).is_alive());
        assert!(!grid.get(0, 0).is_alive());
    }

    #[test]
    fn corner_neighbours_wrap() {
        // Live cells in the three other corners are all neighbours of (0, 0).
        let grid = Grid::with_alive(5, 5, coords(&[(4, 0), (0, 4), (4, 4)])).unwrap();
        assert_eq!(neighbour_count(&grid, 0, 0), 3);
    }

    #[test]
    fn neighbour_count_excludes_self() {
        let grid = Grid::with_alive(5, 5, coords(&[(2, 2)])).unwrap();
        assert_eq!(neighbour_count(&grid, 2, 2), 0);
        assert_eq!(neighbour_count(&grid, 1, 1), 1);
    }

    #[test]
    fn rule_table() {
        for n in 0..=8 {
            let survives = matches!(n, 2 | 3);
            assert_eq!(next_cell_state(Cell::Alive, n).is_alive(), survives, "alive n={n}");
            assert_eq!(next_cell_state(Cell::Dead, n).is_alive(), n == 3, "dead n={n}");
        }
    }

    #[test]
    fn shift_moves_cells_and_wraps() {
        let grid = Grid::with_alive(4, 3, coords(&[(3, 2)])).unwrap();
        let shifted = grid.shifted(1, 1);
        assert_eq!(shifted.alive_cells(), coords(&[(0, 0)]));
    }

    #[test]
    fn buffer_pair_swaps() {
        let initial = Grid::with_alive(3, 3, coords(&[(1, 1)])).unwrap();
        let mut pair = BufferPair::new(initial.clone());
        assert_eq!(pair.current(), &initial);

        {
            let (current, next) = pair.split();
            assert_eq!(current, &initial);
            next.set(1, 1, Cell::Dead);
        }
        // Writes to the next buffer are invisible until the swap.
        assert_eq!(pair.current(), &initial);

        pair.swap();
        assert_eq!(pair.current().alive_count(), 0);
        pair.swap();
        assert_eq!(pair.current(), &initial);
        assert_eq!(pair.into_current(), initial);
    }
}
