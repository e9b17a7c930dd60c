//! A perfect solver for the board game 'Connect 4'
//!
//! This solver uses an optimised game tree search to find the
//! exact game-theoretic score of any position, and of every move
//! available from it.
//!
//! # Basic Usage
//!
//! ```
//! use connect4_solver::{bitboard::BitBoard, solver::Solver};
//!
//!# use std::error::Error;
//!# fn main() -> Result<(), Box<dyn Error>> {
//! let board = BitBoard::from_moves("112233")?;
//! let mut solver = Solver::new();
//!
//! assert_eq!(solver.solve(&board, false), 18);
//! assert_eq!(solver.solve(&board, true), 1);
//! assert_eq!(solver.analyze(&board, false)[3], 18);
//!# Ok(())
//!# }
//! ```

use static_assertions::*;
pub use anyhow;

pub mod error;

pub mod bitboard;

pub mod move_order;

pub mod transposition_table;

pub mod opening_book;

pub mod solver;

mod test;

pub use crate::bitboard::BitBoard;
pub use crate::error::{BookError, MoveError, SequenceError, SolverError};
pub use crate::opening_book::OpeningBook;
pub use crate::solver::{Solver, SolverConfig};
pub use crate::transposition_table::TranspositionTable;

/// The width of the game board in tiles
pub const WIDTH: usize = 7;

/// The height of the game board in tiles
pub const HEIGHT: usize = 6;

// ensure that the given dimensions fit in a u64 for the bitboard representation
const_assert!(WIDTH * (HEIGHT + 1) <= 64);
// board columns are written as single digits
const_assert!(WIDTH < 10);
