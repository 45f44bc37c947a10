//! Game Logic Module
//!
//! Board rules, match state and the referee that drives matches from
//! creation to settlement.
//!
//! ## Module Structure
//!
//! - `board`: Cells, seats, marks and win detection
//! - `state`: Match record and its public view
//! - `registry`: Concurrent in-memory match store
//! - `referee`: Create/join/move operations and settlement

pub mod board;
pub mod state;
pub mod registry;
pub mod referee;

// Re-export key types
pub use board::{winner, Board, Cell, Mark, Seat, CELL_COUNT, WIN_LINES};
pub use state::{Match, MatchStatus, MatchView};
pub use registry::MatchRegistry;
pub use referee::{
    MatchError, MoveOutcome, MoveResult, Referee, RefereeConfig, ReplayStarter, Settlement,
};
