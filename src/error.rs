//! Error types reported by the library

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// Why a single move was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("could not parse '{0}' as a valid move")]
    NotAColumn(char),
    #[error("column {} does not exist", .0 + 1)]
    OutOfRange(usize),
    #[error("invalid move, column {} full", .0 + 1)]
    ColumnFull(usize),
    #[error("invalid position, column {} ends a game that is already won", .0 + 1)]
    GameOver(usize),
}

/// A move sequence that could only be partially applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid move {} '{token}': {source}", .consumed + 1)]
pub struct SequenceError {
    /// Number of characters successfully played before the bad one
    pub consumed: usize,
    pub token: char,
    pub source: MoveError,
}

impl SequenceError {
    /// The 1-based index of the offending move within the sequence
    pub fn move_index(&self) -> usize {
        self.consumed + 1
    }
}

#[derive(Debug, Error)]
pub enum BookError {
    #[error("failed to read or write opening book: {0}")]
    Io(#[from] io::Error),
    #[error("not an opening book file")]
    BadMagic,
    #[error("unsupported opening book version {0}")]
    UnsupportedVersion(u8),
    #[error("opening book is for a {width}x{height} board")]
    Dimensions { width: u8, height: u8 },
    #[error("opening book depth {0} exceeds the board size")]
    Depth(u8),
    #[error("opening book keys are not sorted at entry {0}")]
    Unsorted(usize),
    #[error("opening book score {score} at entry {index} is out of range")]
    ScoreOutOfRange { index: usize, score: i8 },
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("a transposition table of {0} entries cannot be addressed")]
    TableSize(usize),
    #[error("could not allocate a transposition table of {slots} entries")]
    TableAllocation {
        slots: usize,
        #[source]
        source: TryReserveError,
    },
}
