//! Precomputed exact scores of shallow positions
//!
//! # File layout
//! All integers are big-endian.
//!
//! | field   | type         |
//! |---------|--------------|
//! | magic   | `b"C4BK"`    |
//! | version | `u8` (1)     |
//! | width   | `u8`         |
//! | height  | `u8`         |
//! | depth   | `u8`         |
//! | count   | `u32`        |
//! | entries | `count` × (`u64` canonical key, `i8` score), keys strictly increasing |

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use indicatif::*;
use log::{debug, info};
use rayon::prelude::*;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::bitboard::BitBoard;
use crate::error::{BookError, SolverError};
use crate::solver::{Solver, MAX_SCORE, MIN_SCORE};
use crate::transposition_table::TranspositionTable;
use crate::{HEIGHT, WIDTH};

pub const DEFAULT_BOOK_PATH: &str = "7x6.book";
pub const DEFAULT_BOOK_DEPTH: usize = 12;

const MAGIC: &[u8; 4] = b"C4BK";
const VERSION: u8 = 1;
// positions solved by one worker before it reports progress
const CHUNK_SIZE: usize = 1024;

/// A read-only table of exact scores, cheap to clone and share between threads
#[derive(Clone)]
pub struct OpeningBook(Arc<OpeningBookStorage>);

struct OpeningBookStorage {
    depth: usize,
    keys: Vec<u64>,
    scores: Vec<i8>,
}

impl OpeningBook {
    /// Builds a book from (canonical key, score) pairs of positions with at
    /// most `depth` moves played. Later duplicates of a key are dropped.
    pub fn from_entries<I: IntoIterator<Item = (u64, i32)>>(depth: usize, entries: I) -> Self {
        let depth = depth.min(WIDTH * HEIGHT);
        let mut entries: Vec<(u64, i32)> = entries.into_iter().collect();
        entries.sort_by_key(|&(key, _)| key);
        entries.dedup_by_key(|&mut (key, _)| key);

        let (keys, scores): (Vec<u64>, Vec<i8>) = entries
            .into_iter()
            .map(|(key, score)| (key, score as i8))
            .unzip();
        Self(Arc::new(OpeningBookStorage {
            depth,
            keys,
            scores,
        }))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BookError> {
        let start = Instant::now();
        let book = Self::read_from(BufReader::new(File::open(path.as_ref())?))?;
        info!(
            "loaded opening book {} ({} positions, depth {}) in {:.1}ms",
            path.as_ref().display(),
            book.len(),
            book.depth(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(book)
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, BookError> {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(BookError::BadMagic);
        }
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(BookError::UnsupportedVersion(version));
        }
        let width = reader.read_u8()?;
        let height = reader.read_u8()?;
        if width as usize != WIDTH || height as usize != HEIGHT {
            return Err(BookError::Dimensions { width, height });
        }
        let depth = reader.read_u8()?;
        if depth as usize > WIDTH * HEIGHT {
            return Err(BookError::Depth(depth));
        }
        let count = reader.read_u32::<BigEndian>()? as usize;

        // the count is untrusted until the entries are actually read
        let mut keys: Vec<u64> = Vec::with_capacity(count.min(1 << 20));
        let mut scores: Vec<i8> = Vec::with_capacity(count.min(1 << 20));
        for index in 0..count {
            let key = reader.read_u64::<BigEndian>()?;
            let score = reader.read_i8()?;
            if keys.last().map_or(false, |&last| last >= key) {
                return Err(BookError::Unsorted(index));
            }
            if !(MIN_SCORE..=MAX_SCORE).contains(&(score as i32)) {
                return Err(BookError::ScoreOutOfRange { index, score });
            }
            keys.push(key);
            scores.push(score);
        }
        Ok(Self(Arc::new(OpeningBookStorage {
            depth: depth as usize,
            keys,
            scores,
        })))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BookError> {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_to(&mut file)?;
        file.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), BookError> {
        writer.write_all(MAGIC)?;
        writer.write_u8(VERSION)?;
        writer.write_u8(WIDTH as u8)?;
        writer.write_u8(HEIGHT as u8)?;
        writer.write_u8(self.0.depth as u8)?;
        writer.write_u32::<BigEndian>(self.len() as u32)?;
        for (&key, &score) in self.0.keys.iter().zip(self.0.scores.iter()) {
            writer.write_u64::<BigEndian>(key)?;
            writer.write_i8(score)?;
        }
        Ok(())
    }

    /// The deepest ply stored in the book
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    pub fn len(&self) -> usize {
        self.0.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.keys.is_empty()
    }

    /// Returns the score stored for a canonical key
    pub fn get(&self, key: u64) -> Option<i32> {
        self.0
            .keys
            .binary_search(&key)
            .ok()
            .map(|i| self.0.scores[i] as i32)
    }

    /// Returns the exact score of `board`, if it is shallow enough to be stored
    pub fn lookup(&self, board: &BitBoard) -> Option<i32> {
        if board.num_moves() > self.0.depth {
            return None;
        }
        self.get(board.canonical_key())
    }

    /// Solves every position reachable within `depth` moves of the empty board
    pub fn generate(
        depth: usize,
        table_capacity: usize,
        show_progress: bool,
    ) -> Result<Self, SolverError> {
        Self::generate_from(&BitBoard::new(), depth, table_capacity, show_progress)
    }

    /// Solves every position reachable within `depth` moves of `root`
    ///
    /// The book depth is counted from the empty board, so it is
    /// `root.num_moves() + depth`, capped at a full board. Positions where
    /// the side to move wins immediately are left out, the search finds
    /// those before it would consult the book. Plies are solved
    /// deepest first so each one can use the entries already computed below
    /// it. Each chunk of positions is solved with its own transposition
    /// table of `table_capacity` slots.
    pub fn generate_from(
        root: &BitBoard,
        depth: usize,
        table_capacity: usize,
        show_progress: bool,
    ) -> Result<Self, SolverError> {
        let start = Instant::now();
        let depth = root.num_moves().saturating_add(depth).min(WIDTH * HEIGHT);
        let plies = enumerate_positions(root, depth);
        info!(
            "found {} unique positions up to depth {} in {:.1}s",
            plies.iter().map(Vec::len).sum::<usize>(),
            depth,
            start.elapsed().as_secs_f64()
        );

        let mut entries: Vec<(u64, i32)> = Vec::new();
        let mut book = Self::from_entries(depth, Vec::new());

        for (ply, positions) in plies.iter().enumerate().rev() {
            let ply = root.num_moves() + ply;
            let progress = if show_progress {
                ProgressBar::new(positions.len() as u64)
            } else {
                ProgressBar::hidden()
            };
            progress.set_style(
                ProgressStyle::default_bar()
                    .template("Solving ply {msg}: {bar:40.cyan/blue} {pos}/{len} ~{eta} remaining")
                    .progress_chars("█▓▒░  "),
            );
            progress.set_message(&format!("{:>2}", ply));

            let solved = positions
                .par_chunks(CHUNK_SIZE)
                .map(|chunk| -> Result<Vec<(u64, i32)>, SolverError> {
                    let mut solver =
                        Solver::with_transposition_table(TranspositionTable::with_capacity(
                            table_capacity,
                        )?)
                        .with_opening_book(book.clone());
                    let scores: Vec<(u64, i32)> = chunk
                        .iter()
                        .map(|board| (board.canonical_key(), solver.solve(board, false)))
                        .collect();
                    progress.inc(chunk.len() as u64);
                    Ok(scores)
                })
                .collect::<Result<Vec<_>, SolverError>>()?;

            progress.finish_and_clear();
            entries.extend(solved.into_iter().flatten());
            book = Self::from_entries(depth, entries.iter().copied());
            debug!("ply {} solved, book holds {} positions", ply, book.len());
        }

        info!(
            "opening book generation completed in {}",
            HumanDuration(start.elapsed())
        );
        Ok(book)
    }
}

/// Lists the distinct positions (up to mirroring) of each ply from `root` to
/// `depth` moves from the empty board, leaving out those whose side to move
/// can win immediately
pub(crate) fn enumerate_positions(root: &BitBoard, depth: usize) -> Vec<Vec<BitBoard>> {
    let depth = depth.min(WIDTH * HEIGHT).max(root.num_moves());
    let mut plies = Vec::with_capacity(depth + 1 - root.num_moves());
    let mut frontier = vec![*root];

    for ply in root.num_moves()..=depth {
        plies.push(
            frontier
                .iter()
                .filter(|board| !board.can_win_next())
                .copied()
                .collect::<Vec<_>>(),
        );
        if ply == depth {
            break;
        }

        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for board in frontier.iter() {
            for column in 0..WIDTH {
                // refuses full columns and moves that end the game
                if let Ok(child) = board.play(column) {
                    if seen.insert(child.canonical_key()) {
                        next.push(child);
                    }
                }
            }
        }
        frontier = next;
    }
    plies
}
