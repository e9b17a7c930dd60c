use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use std::io::{stdin, stdout, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use connect4_solver::opening_book::{OpeningBook, DEFAULT_BOOK_PATH};
use connect4_solver::solver::{best_columns, choose_column, Solver, SolverConfig};
use connect4_solver::transposition_table::DEFAULT_CAPACITY;
use connect4_solver::{BitBoard, WIDTH};

/// Reads Connect 4 positions as column digits (1-7), one per line, and
/// writes the score of each one
///
/// Invalid lines (bad digit, full column or a move played after the game was
/// won) are reported on stderr and produce an empty output line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Only compute whether the position is won (1), drawn (0) or lost (-1)
    #[arg(short, long)]
    weak: bool,

    /// Score every column of the position instead of the position itself
    #[arg(short, long)]
    analyze: bool,

    /// Opening book to load, or to write with --generate-book
    #[arg(short, long, default_value = DEFAULT_BOOK_PATH)]
    book: PathBuf,

    /// Number of transposition table entries
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    table_size: usize,

    /// Keep one game across lines and answer every move with a best move.
    /// A line reading "reset" starts a new game. Implies --analyze
    #[arg(long)]
    play: bool,

    /// Seed for picking between equally good moves in --play
    #[arg(long)]
    seed: Option<u64>,

    /// Solve every position up to DEPTH moves, write them to the book path and exit
    #[arg(long, value_name = "DEPTH")]
    generate_book: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    )
    .format_timestamp(None)
    .init();

    if let Some(depth) = args.generate_book {
        let book = OpeningBook::generate(depth, args.table_size, true)?;
        book.save(&args.book)
            .with_context(|| format!("failed to write {}", args.book.display()))?;
        info!("wrote {} positions to {}", book.len(), args.book.display());
        return Ok(());
    }

    let config = SolverConfig {
        table_capacity: args.table_size,
        book_path: Some(args.book.clone()),
    };
    // the search cannot run without its transposition table
    let mut solver = Solver::with_config(&config).context("failed to start the solver")?;

    let stdin = stdin();
    let stdout = stdout();
    let mut out = stdout.lock();

    if args.play {
        let rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut game = Game::new(rng);
        for (l, line) in stdin.lock().lines().enumerate() {
            game.handle_line(&mut solver, &mut out, l + 1, line?.trim(), args.weak)?;
            out.flush()?;
        }
    } else {
        for (l, line) in stdin.lock().lines().enumerate() {
            let line = line?;
            let moves = line.trim();
            match BitBoard::from_moves(moves) {
                Ok(board) => {
                    write!(out, "{}", moves)?;
                    report(&mut solver, &mut out, &board, args.analyze, args.weak)?;
                }
                Err(err) => {
                    error!(
                        "Line {}: Invalid move {} \"{}\": {}",
                        l + 1,
                        err.move_index(),
                        moves,
                        err.source
                    );
                    writeln!(out)?;
                }
            }
            out.flush()?;
        }
    }
    Ok(())
}

/// Writes the score of `board`, or of every column, and ends the line.
/// Returns the column scores when analysing.
fn report<W: Write>(
    solver: &mut Solver,
    out: &mut W,
    board: &BitBoard,
    analyze: bool,
    weak: bool,
) -> Result<Option<[i32; WIDTH]>> {
    let start = Instant::now();
    solver.reset_node_count();

    let scores = if analyze {
        let scores = solver.analyze(board, weak);
        for score in scores.iter() {
            write!(out, " {}", score)?;
        }
        let best = best_columns(&scores);
        if let Some(&column) = best.first() {
            write!(out, " Max: {} Column:", scores[column])?;
            for column in best {
                write!(out, " {}", column + 1)?;
            }
        }
        Some(scores)
    } else {
        write!(out, " {}", solver.solve(board, weak))?;
        None
    };
    writeln!(out)?;

    debug!(
        "{} nodes in {}µs",
        solver.node_count(),
        start.elapsed().as_micros()
    );
    Ok(scores)
}

/// A game continued line by line, answered by the solver
struct Game {
    board: BitBoard,
    history: String,
    rng: StdRng,
}

impl Game {
    fn new(rng: StdRng) -> Self {
        Self {
            board: BitBoard::new(),
            history: String::new(),
            rng,
        }
    }

    fn reset(&mut self) {
        self.board = BitBoard::new();
        self.history.clear();
    }

    fn handle_line<W: Write>(
        &mut self,
        solver: &mut Solver,
        out: &mut W,
        line_number: usize,
        line: &str,
        weak: bool,
    ) -> Result<()> {
        if line == "reset" {
            writeln!(out, "Resetting")?;
            self.reset();
            return Ok(());
        }

        // the game only advances once the whole line is valid
        let board = match self.board.after_moves(line) {
            Ok(board) => board,
            Err(err) => {
                error!(
                    "Line {}: Invalid move {} \"{}\": {}",
                    line_number,
                    self.board.num_moves() + err.move_index(),
                    line,
                    err.source
                );
                writeln!(out)?;
                return Ok(());
            }
        };
        self.board = board;
        self.history.push_str(line);

        write!(out, "{}", self.history)?;
        let scores = match report(solver, out, &self.board, true, weak)? {
            Some(scores) => scores,
            None => return Ok(()),
        };

        match choose_column(&scores, &mut self.rng) {
            Some(column) if self.board.is_winning_move(column) => {
                info!("column {} wins the game, starting a new one", column + 1);
                self.reset();
            }
            Some(column) => {
                // only refuses winning moves, handled above
                if let Ok(next) = self.board.play(column) {
                    self.board = next;
                    self.history.push_str(&(column + 1).to_string());
                    debug!("replied {}\n{}", column + 1, self.board);
                }
                if self.board.is_draw() {
                    info!("the game is drawn, starting a new one");
                    self.reset();
                }
            }
            None => {
                info!("the board is full, starting a new one");
                self.reset();
            }
        }
        Ok(())
    }
}
