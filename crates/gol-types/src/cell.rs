//! Cell state and grid coordinates.
//!
//! On the wire and in image files a cell is a single byte: `255` for alive
//! and `0` for dead. Inside the engine it is the two-variant [`Cell`] enum,
//! so no third value can ever reach the kernel. Bytes are validated once,
//! on entry, by [`Cell::try_from`].

use serde::{Deserialize, Serialize};

/// Byte value of a live cell.
pub const ALIVE_BYTE: u8 = 255;

/// Byte value of a dead cell.
pub const DEAD_BYTE: u8 = 0;

/// A byte that is neither [`ALIVE_BYTE`] nor [`DEAD_BYTE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid cell byte {value}: expected 0 (dead) or 255 (alive)")]
pub struct CellError {
    /// The offending byte.
    pub value: u8,
}

/// The state of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    /// A dead cell (`0`).
    #[default]
    Dead,
    /// A live cell (`255`).
    Alive,
}

impl Cell {
    /// Whether the cell is alive.
    pub const fn is_alive(self) -> bool {
        matches!(self, Self::Alive)
    }

    /// The byte encoding of this cell.
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Alive => ALIVE_BYTE,
            Self::Dead => DEAD_BYTE,
        }
    }
}

impl TryFrom<u8> for Cell {
    type Error = CellError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            ALIVE_BYTE => Ok(Self::Alive),
            DEAD_BYTE => Ok(Self::Dead),
            other => Err(CellError { value: other }),
        }
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> Self {
        cell.to_byte()
    }
}

/// A cell position: `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Column index.
    pub x: usize,
    /// Row index.
    pub y: usize,
}

impl Coord {
    /// Create a coordinate from a column and a row.
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl core::fmt::Display for Coord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
