//! Static move ordering for the game tree search
//!
//! Alpha-beta prunes the most when the best child is searched first. Moves are
//! ranked by the threats they create, then by how many potential alignments
//! pass through the cell they land on, then by distance from the middle
//! column.

use crate::{HEIGHT, WIDTH};

/// Multiplier that keeps threat counts ahead of cell weights in a sort key
pub const CELL_WEIGHT_SCALE: i32 = 16;

/// The precomputed ordering shared by every search
pub static MOVE_ORDER: MoveOrderTable = MoveOrderTable::new();

/// Per-cell alignment counts and the center-out column order of the board
pub struct MoveOrderTable {
    columns: [usize; WIDTH],
    weights: [[u8; HEIGHT]; WIDTH],
}

impl MoveOrderTable {
    pub const fn new() -> Self {
        Self {
            columns: center_out_columns(),
            weights: alignment_counts(),
        }
    }

    /// Columns from the middle outwards, as the middle columns are often
    /// better moves
    pub fn columns(&self) -> &[usize; WIDTH] {
        &self.columns
    }

    /// Number of 4-alignments the cell at `column`, `row` can take part in
    pub fn cell_weight(&self, column: usize, row: usize) -> i32 {
        self.weights[column][row] as i32
    }

    /// Weight of the cell a move bitmap (a single tile) lands on
    pub fn move_weight(&self, move_bitmap: u64) -> i32 {
        let index = move_bitmap.trailing_zeros() as usize;
        self.cell_weight(index / (HEIGHT + 1), index % (HEIGHT + 1))
    }
}

impl Default for MoveOrderTable {
    fn default() -> Self {
        Self::new()
    }
}

const fn center_out_columns() -> [usize; WIDTH] {
    let mut move_order = [0; WIDTH];
    let mut i = 0;
    while i < WIDTH {
        move_order[i] = (WIDTH / 2) + (i % 2) * (i / 2 + 1) - (1 - i % 2) * (i / 2);
        i += 1;
    }
    move_order
}

const fn alignment_counts() -> [[u8; HEIGHT]; WIDTH] {
    // horizontal, vertical and both diagonals as (column, row) steps
    const DIRECTIONS: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

    let mut weights = [[0; HEIGHT]; WIDTH];
    let mut column = 0;
    while column < WIDTH {
        let mut row = 0;
        while row < HEIGHT {
            let mut d = 0;
            while d < DIRECTIONS.len() {
                let (dc, dr) = DIRECTIONS[d];
                // every window of 4 containing the cell starts 0 to 3 steps back
                let mut back = 0;
                while back < 4 {
                    let start_c = column as isize - back * dc;
                    let start_r = row as isize - back * dr;
                    let end_c = start_c + 3 * dc;
                    let end_r = start_r + 3 * dr;
                    if in_bounds(start_c, start_r) && in_bounds(end_c, end_r) {
                        weights[column][row] += 1;
                    }
                    back += 1;
                }
                d += 1;
            }
            row += 1;
        }
        column += 1;
    }
    weights
}

const fn in_bounds(column: isize, row: isize) -> bool {
    column >= 0 && column < WIDTH as isize && row >= 0 && row < HEIGHT as isize
}

/// Insertion-sorted list of at most `WIDTH` candidate moves
///
/// Iterating yields the highest key first; among equal keys, the move pushed
/// first comes out first.
pub struct MoveSorter {
    size: usize,
    // move bitmap, column and sort key
    moves: [(u64, usize, i32); WIDTH],
}

impl MoveSorter {
    pub fn new() -> Self {
        Self {
            size: 0,
            moves: [(0, 0, 0); WIDTH],
        }
    }
    pub fn push(&mut self, new_move: u64, column: usize, score: i32) {
        let mut pos = self.size;
        self.size += 1;
        while pos != 0 && self.moves[pos - 1].2 >= score {
            self.moves[pos] = self.moves[pos - 1];
            pos -= 1;
        }
        self.moves[pos] = (new_move, column, score);
    }
    pub fn len(&self) -> usize {
        self.size
    }
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Default for MoveSorter {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for MoveSorter {
    type Item = (u64, usize);

    fn next(&mut self) -> Option<Self::Item> {
        match self.size {
            0 => None,
            _ => {
                self.size -= 1;
                Some((self.moves[self.size].0, self.moves[self.size].1))
            }
        }
    }
}
