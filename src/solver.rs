//! An agent to solve the game of Connect 4

use log::{debug, warn};
use rand::seq::IndexedRandom;
use rand::Rng;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::bitboard::BitBoard;
use crate::error::{MoveError, SolverError};
use crate::move_order::{MoveSorter, CELL_WEIGHT_SCALE, MOVE_ORDER};
use crate::opening_book::{OpeningBook, DEFAULT_BOOK_PATH};
use crate::transposition_table::{Bound, TranspositionTable, DEFAULT_CAPACITY};
use crate::{HEIGHT, WIDTH};

/// The minimum possible score of a position
pub const MIN_SCORE: i32 = -((WIDTH * HEIGHT) as i32) / 2 + 3;
/// The maximum possible score of a postion
pub const MAX_SCORE: i32 = ((WIDTH * HEIGHT) as i32 + 1) / 2 - 3;
/// Reported by [`Solver::analyze`] for columns that cannot be played, lower
/// than any score
pub const INVALID_MOVE: i32 = -1000;

/// Settings needed to build a [`Solver`]
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Number of transposition table slots, rounded up to a prime
    pub table_capacity: usize,
    /// Opening book to load, if any. A missing or unreadable book is skipped.
    pub book_path: Option<PathBuf>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            table_capacity: DEFAULT_CAPACITY,
            book_path: Some(PathBuf::from(DEFAULT_BOOK_PATH)),
        }
    }
}

/// An agent to solve Connect 4 positions
///
/// # Notes
/// This agent uses a classical game tree search with various optimisations to
/// find the mathematically best move(s) in any position, thus 'solving' the game.
/// The transposition table persists between calls, its entries stay valid for
/// any later position.
///
/// # Position Scoring
/// A position is scored from the point of view of the player to move, by how
/// early they can force a win. If they win with their final placed tile (their
/// 21st tile in a 7x6 board) the score is 1, or -1 if the opponent wins with
/// their final tile. Earlier wins have scores further from 0, up to 18/-18,
/// where a player wins with their 4th tile. A drawn position has a score of 0.
///
/// In weak mode only the sign of the score is computed: 1, 0 or -1.
pub struct Solver {
    node_count: usize,
    transposition_table: TranspositionTable,
    opening_book: Option<OpeningBook>,
}

impl Solver {
    /// Creates a new `Solver` with a default sized transposition table and no
    /// opening book
    pub fn new() -> Self {
        Self::with_transposition_table(TranspositionTable::new())
    }

    /// Creates a new `Solver` with a given transposition table
    pub fn with_transposition_table(transposition_table: TranspositionTable) -> Self {
        Self {
            node_count: 0,
            transposition_table,
            opening_book: None,
        }
    }

    /// Creates a new `Solver` as described by `config`
    ///
    /// Only failing to allocate the transposition table is an error, the
    /// opening book is optional.
    pub fn with_config(config: &SolverConfig) -> Result<Self, SolverError> {
        let mut solver = Self::with_transposition_table(TranspositionTable::with_capacity(
            config.table_capacity,
        )?);
        if let Some(path) = &config.book_path {
            solver.load_book(path);
        }
        Ok(solver)
    }

    /// Adds an opening book to an existing `Solver`
    pub fn with_opening_book(mut self, opening_book: OpeningBook) -> Self {
        self.opening_book = Some(opening_book);
        self
    }

    /// Loads the opening book at `path`
    ///
    /// On failure the solver keeps searching without a book; returns whether
    /// the book was loaded.
    pub fn load_book<P: AsRef<Path>>(&mut self, path: P) -> bool {
        match OpeningBook::load(path.as_ref()) {
            Ok(book) => {
                self.opening_book = Some(book);
                true
            }
            Err(err) => {
                warn!(
                    "opening book {} unavailable, solving without it: {}",
                    path.as_ref().display(),
                    err
                );
                self.opening_book = None;
                false
            }
        }
    }

    pub fn opening_book(&self) -> Option<&OpeningBook> {
        self.opening_book.as_ref()
    }

    /// The number of nodes searched by this `Solver` so far (for diagnostics only)
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn reset_node_count(&mut self) {
        self.node_count = 0;
    }

    /// Forgets every cached search result
    pub fn clear_transposition_table(&mut self) {
        self.transposition_table.reset();
    }

    fn book_score(&self, board: &BitBoard) -> Option<i32> {
        self.opening_book
            .as_ref()
            .and_then(|book| book.lookup(board))
    }

    /// Performs game tree search
    ///
    /// The result is fail-soft: a value `<= alpha` is an upper bound of the
    /// score, a value `>= beta` a lower bound, anything between is exact.
    /// The player to move must not have a winning move.
    fn negamax(&mut self, board: &BitBoard, mut alpha: i32, mut beta: i32) -> i32 {
        debug_assert!(alpha < beta);
        debug_assert!(!board.can_win_next());
        self.node_count += 1;

        // look for moves that don't give the opponent a next turn win
        let non_losing_moves = board.non_losing_moves();
        if non_losing_moves == 0 {
            return -(((WIDTH * HEIGHT - board.num_moves()) / 2) as i32);
        }

        // check for draw, neither side can win with the last two tiles
        if board.num_moves() >= WIDTH * HEIGHT - 2 {
            return 0;
        }

        // the opponent cannot win with their next tile
        let min = -(((WIDTH * HEIGHT - 2 - board.num_moves()) / 2) as i32);
        if alpha < min {
            alpha = min;
            if alpha >= beta {
                return alpha;
            }
        }
        // we cannot win with this tile
        let mut max = ((WIDTH * HEIGHT - 1 - board.num_moves()) / 2) as i32;

        if let Some(score) = self.book_score(board) {
            return score;
        }

        // try to fetch the upper/lower bound of the score from the transposition table
        let key = board.canonical_key();
        if let Some(entry) = self.transposition_table.get(key) {
            match entry.bound {
                Bound::Exact => return entry.value,
                Bound::Lower => {
                    if alpha < entry.value {
                        alpha = entry.value;
                        if alpha >= beta {
                            // prune the exploration
                            return alpha;
                        }
                    }
                }
                Bound::Upper => max = max.min(entry.value),
            }
        }
        if beta > max {
            // clamp beta to calculated upper bound
            beta = max;
            // if the upper bound is lower than alpha, we can prune the exploration
            if alpha >= beta {
                return beta;
            }
        }

        let alpha_start = alpha;
        let mut moves = MoveSorter::new();
        for &column in MOVE_ORDER.columns() {
            let candidate = non_losing_moves & BitBoard::column_mask(column);
            if candidate != 0 {
                let sort_key = board.move_score(candidate) * CELL_WEIGHT_SCALE
                    + MOVE_ORDER.move_weight(candidate);
                moves.push(candidate, column, sort_key);
            }
        }

        // search the next level of the tree
        for (move_bitmap, _column) in moves {
            let mut next = *board;
            next.play_bitmap(move_bitmap);
            // the search window is flipped for the other player
            let score = -self.negamax(&next, -beta, -alpha);
            // if a child node's score is better than beta, we can prune the tree
            // here because a perfect opponent will not pick this branch
            if score >= beta {
                self.transposition_table.put(key, score, Bound::Lower);
                return score;
            }
            if score > alpha {
                alpha = score;
            }
        }

        let bound = if alpha > alpha_start {
            Bound::Exact
        } else {
            Bound::Upper
        };
        self.transposition_table.put(key, alpha, bound);
        alpha
    }

    /// Calculates the score of `board` (see [Position Scoring])
    ///
    /// The exact score is found with a sequence of null-window searches, each
    /// one halving the interval the score is known to lie in. In weak mode the
    /// interval starts as `[-1, 1]` and only the sign is returned.
    ///
    /// [Position Scoring]: #position-scoring
    pub fn solve(&mut self, board: &BitBoard, weak: bool) -> i32 {
        // check for win for current player on this move
        if board.can_win_next() {
            return if weak { 1 } else { Self::win_score(board) };
        }
        if let Some(score) = self.book_score(board) {
            return if weak { score.signum() } else { score };
        }

        let (mut min, mut max) = if weak {
            (-1, 1)
        } else {
            (
                -(((WIDTH * HEIGHT - board.num_moves()) / 2) as i32),
                ((WIDTH * HEIGHT + 1 - board.num_moves()) / 2) as i32,
            )
        };

        let nodes_before = self.node_count;
        // iteratively narrow the search window
        while min < max {
            let mut mid = min + (max - min) / 2;
            // tweak the search value for both negative and positive searches
            if mid <= 0 && min / 2 < mid {
                mid = min / 2
            } else if mid >= 0 && max / 2 > mid {
                mid = max / 2
            }

            // use a null-window to determine if the actual score is greater or less that mid
            let r = self.negamax(board, mid, mid + 1);

            // r is not necessarily the exact true score, but its value indicates
            // whether the true score is above or below the search target
            if r <= mid {
                // actual score <= r
                max = r
            } else {
                // actual score >= r
                min = r;
            }
        }
        debug!(
            "solved position after {} moves: score {}, {} nodes",
            board.num_moves(),
            min,
            self.node_count - nodes_before
        );
        // in weak mode a bound can overshoot [-1, 1], only its sign is proven
        if weak {
            min.signum()
        } else {
            min
        }
    }

    /// Scores every column of `board`, [`INVALID_MOVE`] for full columns
    ///
    /// The score of a column is the score of the position after playing it,
    /// from the point of view of the player playing it, so it equals
    /// `-solve(board.play(column))` for every column `play` accepts.
    /// A column that wins on the spot is the exception: [`BitBoard::play`]
    /// refuses it as ending the game, and it is scored as the immediate win
    /// (1 in weak mode) instead.
    pub fn analyze(&mut self, board: &BitBoard, weak: bool) -> [i32; WIDTH] {
        let mut scores = [INVALID_MOVE; WIDTH];
        for (column, score) in scores.iter_mut().enumerate() {
            *score = match board.play(column) {
                Ok(next) => -self.solve(&next, weak),
                Err(MoveError::GameOver(_)) if weak => 1,
                Err(MoveError::GameOver(_)) => Self::win_score(board),
                Err(_) => INVALID_MOVE,
            };
        }
        scores
    }

    // score of a win with the next tile
    fn win_score(board: &BitBoard) -> i32 {
        ((WIDTH * HEIGHT + 1 - board.num_moves()) / 2) as i32
    }

    /// Converts a position score to a win distance in a single player's moves
    pub fn score_to_win_distance(board: &BitBoard, score: i32) -> usize {
        match score.cmp(&0) {
            Ordering::Equal => WIDTH * HEIGHT - board.num_moves(),
            Ordering::Greater => (WIDTH * HEIGHT / 2 + 1 - score as usize) - board.num_moves() / 2,
            Ordering::Less => (WIDTH * HEIGHT / 2 + 1) - (-score as usize) - board.num_moves() / 2,
        }
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

/// Lists the columns achieving the best score of an analysis
pub fn best_columns(scores: &[i32; WIDTH]) -> Vec<usize> {
    let best = scores.iter().copied().max().unwrap_or(INVALID_MOVE);
    if best == INVALID_MOVE {
        return Vec::new();
    }
    (0..WIDTH).filter(|&column| scores[column] == best).collect()
}

/// Picks one of the best columns of an analysis at random
pub fn choose_column<R: Rng + ?Sized>(scores: &[i32; WIDTH], rng: &mut R) -> Option<usize> {
    best_columns(scores).choose(rng).copied()
}
