//! Board and Win Detection
//!
//! The 3×3 grid, the two marks, the two seats that own them, and the pure
//! win detector.

use serde::{Deserialize, Serialize};

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// The 8 winning triples: 3 rows, 3 columns, 2 diagonals.
pub const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

// =============================================================================
// SEAT / MARK
// =============================================================================

/// A seat at the table. Resolved once when a player is placed in a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    /// The match creator.
    A,
    /// The joiner.
    B,
}

impl Seat {
    /// The opposing seat.
    #[inline]
    pub fn other(self) -> Seat {
        match self {
            Seat::A => Seat::B,
            Seat::B => Seat::A,
        }
    }

    /// The mark this seat places.
    #[inline]
    pub fn mark(self) -> Mark {
        match self {
            Seat::A => Mark::X,
            Seat::B => Mark::O,
        }
    }
}

/// A mark on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mark {
    /// Placed by seat A.
    X = 1,
    /// Placed by seat B.
    O = 2,
}

impl Mark {
    /// The seat that owns this mark.
    #[inline]
    pub fn seat(self) -> Seat {
        match self {
            Mark::X => Seat::A,
            Mark::O => Seat::B,
        }
    }
}

/// A single board cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    /// Nothing placed.
    #[default]
    Empty,
    /// Holds a mark.
    Taken(Mark),
}

impl Cell {
    /// Wire encoding: 0 empty, 1 X, 2 O.
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            Cell::Empty => 0,
            Cell::Taken(mark) => mark as u8,
        }
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// The 3×3 grid, indexed row-major 0..9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Board {
    cells: [Cell; CELL_COUNT],
}

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from cells.
    pub fn from_cells(cells: [Cell; CELL_COUNT]) -> Self {
        Self { cells }
    }

    /// Cell at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// All cells.
    pub fn cells(&self) -> &[Cell; CELL_COUNT] {
        &self.cells
    }

    /// Place a mark on an empty cell. Returns false (and changes nothing)
    /// if the index is out of range or the cell is taken.
    pub fn place(&mut self, index: usize, mark: Mark) -> bool {
        match self.cells.get_mut(index) {
            Some(cell @ Cell::Empty) => {
                *cell = Cell::Taken(mark);
                true
            }
            _ => false,
        }
    }

    /// True when no cell is empty.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| *c != Cell::Empty)
    }

    /// True when every cell is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| *c == Cell::Empty)
    }

    /// Number of placed marks.
    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|c| **c != Cell::Empty).count()
    }

    /// Clear every cell.
    pub fn clear(&mut self) {
        self.cells = [Cell::Empty; CELL_COUNT];
    }

    /// Wire form of the board.
    pub fn to_bytes(&self) -> [u8; CELL_COUNT] {
        self.cells.map(Cell::as_u8)
    }

    /// The winning mark, if any line is complete.
    pub fn winner(&self) -> Option<Mark> {
        winner(&self.cells)
    }
}

/// Returns the mark that fills any of the 8 winning lines.
///
/// Pure and total. Only one line can be newly completed per move, so the
/// order lines are checked in does not matter.
pub fn winner(cells: &[Cell; CELL_COUNT]) -> Option<Mark> {
    WIN_LINES.iter().find_map(|&[a, b, c]| match cells[a] {
        Cell::Taken(mark) if cells[b] == cells[a] && cells[c] == cells[a] => Some(mark),
        _ => None,
    })
}
