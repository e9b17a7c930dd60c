use std::fmt;

use crate::error::{MoveError, SequenceError};
use crate::{HEIGHT, WIDTH};

pub(crate) mod static_masks {
    use crate::{HEIGHT, WIDTH};

    pub const fn bottom_mask() -> u64 {
        let mut mask = 0;
        let mut column = 0;
        while column < WIDTH {
            mask |= 1 << (column * (HEIGHT + 1));
            column += 1;
        }
        mask
    }
    pub const fn full_board_mask() -> u64 {
        bottom_mask() * ((1 << HEIGHT as u64) - 1)
    }
    // a column including its sentinel bit
    pub const fn padded_column_mask() -> u64 {
        (1 << (HEIGHT + 1)) - 1
    }
}

/// A Connect 4 position packed into two bitmaps
///
/// Each column occupies `HEIGHT + 1` bits, bottom cell first; the extra bit
/// on top of every column is a sentinel that stays empty so shifts never
/// carry tiles from one column into the next.
///
/// The position only ever holds games that are still in progress: a move
/// that would complete an alignment is refused, the score of such a move is
/// read from the position before it instead.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct BitBoard {
    // mask of the current player's tiles
    player_mask: u64,
    // mask of all tiles
    board_mask: u64,
    num_moves: usize,
}
impl BitBoard {
    pub fn new() -> Self {
        Self {
            player_mask: 0,
            board_mask: 0,
            num_moves: 0,
        }
    }

    /// Plays a sequence of 1-indexed column digits from the empty board
    pub fn from_moves<S: AsRef<str>>(moves: S) -> Result<Self, SequenceError> {
        Self::new().after_moves(moves)
    }

    /// Returns the position after a sequence of 1-indexed column digits, or
    /// the first move that could not be played
    pub fn after_moves<S: AsRef<str>>(&self, moves: S) -> Result<Self, SequenceError> {
        let mut board = *self;
        board.try_play_sequence(moves.as_ref())?;
        Ok(board)
    }

    /// Plays a sequence of 1-indexed column digits from this position
    ///
    /// Returns the number of moves played. When it is shorter than the
    /// input, the character at that index is the first illegal move and the
    /// position holds every move before it.
    pub fn play_sequence<S: AsRef<str>>(&mut self, moves: S) -> usize {
        match self.try_play_sequence(moves.as_ref()) {
            Ok(played) => played,
            Err(err) => err.consumed,
        }
    }

    fn try_play_sequence(&mut self, moves: &str) -> Result<usize, SequenceError> {
        let mut consumed = 0;
        for token in moves.chars() {
            let next = match token.to_digit(10).map(|c| c as usize) {
                Some(column @ 1..=WIDTH) => self.play(column - 1),
                _ => Err(MoveError::NotAColumn(token)),
            };
            match next {
                Ok(next) => *self = next,
                Err(source) => {
                    return Err(SequenceError {
                        consumed,
                        token,
                        source,
                    })
                }
            }
            consumed += 1;
        }
        Ok(consumed)
    }

    pub fn player_mask(&self) -> u64 {
        self.player_mask
    }

    pub fn board_mask(&self) -> u64 {
        self.board_mask
    }

    pub fn top_mask(column: usize) -> u64 {
        1 << (column * (HEIGHT + 1) + (HEIGHT - 1))
    }

    pub fn bottom_mask(column: usize) -> u64 {
        1 << (column * (HEIGHT + 1))
    }

    pub fn column_mask(column: usize) -> u64 {
        ((1 << HEIGHT) - 1) << (column * (HEIGHT + 1))
    }

    /// Returns the next position with a tile dropped in `column` (0-indexed)
    ///
    /// Refuses full or nonexistent columns, and moves that would win the game
    pub fn play(&self, column: usize) -> Result<Self, MoveError> {
        if column >= WIDTH {
            return Err(MoveError::OutOfRange(column));
        }
        if !self.can_play(column) {
            return Err(MoveError::ColumnFull(column));
        }
        if self.is_winning_move(column) {
            return Err(MoveError::GameOver(column));
        }
        let mut next = *self;
        next.play_bitmap(self.move_bitmap(column));
        Ok(next)
    }

    /// Returns the single bit where a tile dropped in `column` lands
    pub(crate) fn move_bitmap(&self, column: usize) -> u64 {
        (self.board_mask + Self::bottom_mask(column)) & Self::column_mask(column)
    }

    // unchecked, for the search
    pub(crate) fn play_bitmap(&mut self, move_bitmap: u64) {
        // switch the current player
        self.player_mask ^= self.board_mask;
        // add a cell of the previous player to the correct column
        self.board_mask |= move_bitmap;
        self.num_moves += 1;
    }

    pub fn non_losing_moves(&self) -> u64 {
        let mut possible_moves = self.possible_moves();
        let opponent_winning_positions = self.opponent_winning_positions();
        let forced_moves = possible_moves & opponent_winning_positions;

        if forced_moves != 0 {
            // if more than one forced move exists, you can't prevent the opponent winning
            if forced_moves & (forced_moves - 1) != 0 {
                return 0;
            } else {
                possible_moves = forced_moves
            }
        }
        // avoid playing below an opponent's winning move
        possible_moves & !(opponent_winning_positions >> 1)
    }

    pub fn possible_moves(&self) -> u64 {
        (self.board_mask + static_masks::bottom_mask()) & static_masks::full_board_mask()
    }

    // create a bitmap of open squares that complete alignments for the opponent
    fn opponent_winning_positions(&self) -> u64 {
        let opp_mask = self.player_mask ^ self.board_mask;
        self.winning_positions(opp_mask)
    }

    fn winning_positions(&self, player_mask: u64) -> u64 {
        // vertical
        // find the top ends of 3-alignemnts
        let mut r = (player_mask << 1) & (player_mask << 2) & (player_mask << 3);

        // horizontal
        let mut p = (player_mask << (HEIGHT + 1)) & (player_mask << (2 * (HEIGHT + 1)));
        // find the right ends of 3-alignments
        r |= p & (player_mask << (3 * (HEIGHT + 1)));
        // find holes of the type ...O O _ O...
        r |= p & (player_mask >> (HEIGHT + 1));

        p = (player_mask >> (HEIGHT + 1)) & (player_mask >> (2 * (HEIGHT + 1)));
        // find the left ends of 3-alignments
        r |= p & (player_mask >> (3 * (HEIGHT + 1)));
        // find holes of the type ...O _ O O...
        r |= p & (player_mask << (HEIGHT + 1));

        // diagonal /
        p = (player_mask << HEIGHT) & (player_mask << (2 * HEIGHT));
        r |= p & (player_mask << (3 * (HEIGHT)));
        r |= p & (player_mask >> (HEIGHT));

        p = (player_mask >> (HEIGHT)) & (player_mask >> (2 * HEIGHT));
        r |= p & (player_mask >> (3 * (HEIGHT)));
        r |= p & (player_mask << (HEIGHT));

        // diagonal \
        p = (player_mask << (HEIGHT + 2)) & (player_mask << (2 * (HEIGHT + 2)));
        r |= p & (player_mask << (3 * (HEIGHT + 2)));
        r |= p & (player_mask >> (HEIGHT + 2));

        p = (player_mask >> (HEIGHT + 2)) & (player_mask >> (2 * (HEIGHT + 2)));
        r |= p & (player_mask >> (3 * (HEIGHT + 2)));
        r |= p & (player_mask << (HEIGHT + 2));

        r & (static_masks::full_board_mask() ^ self.board_mask)
    }

    /// Counts the open ends of 3-alignments the current player would own
    /// after playing `candidate`
    pub fn move_score(&self, candidate: u64) -> i32 {
        self.winning_positions(self.player_mask | candidate)
            .count_ones() as i32
    }

    /// Returns true if the current player has a move that wins immediately
    pub fn can_win_next(&self) -> bool {
        self.winning_positions(self.player_mask) & self.possible_moves() != 0
    }

    pub fn num_moves(&self) -> usize {
        self.num_moves
    }

    /// Returns true if `column` exists and is not full
    pub fn can_play(&self, column: usize) -> bool {
        column < WIDTH && Self::top_mask(column) & self.board_mask == 0
    }

    /// Returns true if dropping a tile in `column` completes an alignment
    /// for the current player
    pub fn is_winning_move(&self, column: usize) -> bool {
        if !self.can_play(column) {
            return false;
        }
        let pos = self.player_mask | self.move_bitmap(column);
        Self::has_alignment(pos)
    }

    fn has_alignment(pos: u64) -> bool {
        // horizontal, both diagonals, vertical
        for &shift in [HEIGHT + 1, HEIGHT, HEIGHT + 2, 1].iter() {
            // mark all runs of 2
            let m = pos & (pos >> shift);
            // check for runs of 2 * (runs of 2)
            if m & (m >> (2 * shift)) != 0 {
                return true;
            }
        }
        false
    }

    pub fn is_full(&self) -> bool {
        self.num_moves == WIDTH * HEIGHT
    }

    /// Returns true for a full board without any alignment
    pub fn is_draw(&self) -> bool {
        self.is_full()
            && !Self::has_alignment(self.player_mask)
            && !Self::has_alignment(self.player_mask ^ self.board_mask)
    }

    // key for transposition table, unique for every position
    pub fn key(&self) -> u64 {
        self.player_mask + self.board_mask
    }

    pub fn mirror_key(&self) -> u64 {
        // no column of the key overflows into its sentinel's neighbour, so
        // mirroring commutes with the addition
        Self::mirror_mask(self.key())
    }

    /// Key shared by a position and its horizontal mirror image
    pub fn canonical_key(&self) -> u64 {
        self.key().min(self.mirror_key())
    }

    /// Returns the position reflected left to right
    pub fn mirror(&self) -> Self {
        Self {
            player_mask: Self::mirror_mask(self.player_mask),
            board_mask: Self::mirror_mask(self.board_mask),
            num_moves: self.num_moves,
        }
    }

    fn mirror_mask(mask: u64) -> u64 {
        let mut mirrored = 0;
        for column in 0..WIDTH {
            let bits = (mask >> (column * (HEIGHT + 1))) & static_masks::padded_column_mask();
            mirrored |= bits << ((WIDTH - 1 - column) * (HEIGHT + 1));
        }
        mirrored
    }
}

impl Default for BitBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BitBoard {
    /// Draws the board top row first, `X` for the first player and `O` for
    /// the second
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first_player = if self.num_moves % 2 == 0 {
            self.player_mask
        } else {
            self.player_mask ^ self.board_mask
        };
        for row in (0..HEIGHT).rev() {
            for column in 0..WIDTH {
                let tile = 1 << (column * (HEIGHT + 1) + row);
                let c = if self.board_mask & tile == 0 {
                    '.'
                } else if first_player & tile != 0 {
                    'X'
                } else {
                    'O'
                };
                write!(f, "{}", c)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
