#[cfg(test)]
pub mod test {
    use anyhow::{anyhow, Result};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs::File;
    use std::io::{BufRead, BufReader};
    use std::time::{Duration, Instant};

    use crate::error::MoveError;
    use crate::opening_book::enumerate_positions;
    use crate::solver::{best_columns, choose_column, INVALID_MOVE, MAX_SCORE};
    use crate::{BitBoard, OpeningBook, Solver, TranspositionTable, WIDTH};

    // a full board without any alignment
    const DRAWN_GAME: &str = "746336637473574166457736351524215222121451";
    // the side to move has exactly one winning column, the third
    const ONE_WINNING_MOVE: &str = "4712261114742652452672575155316";

    fn read_test_data(path: &str) -> Result<Vec<(String, i32)>> {
        let file = BufReader::new(File::open(path)?);
        let mut positions = Vec::new();

        for line in file.lines() {
            let line = line?;
            let mut test_data = line.split_whitespace();
            let moves = match test_data.next() {
                Some(moves) => moves,
                None => continue,
            };
            let score = test_data
                .next()
                .ok_or(anyhow!("invalid test data: {}", line))?
                .parse::<i32>()?;
            positions.push((moves.to_string(), score));
        }
        Ok(positions)
    }

    fn small_solver() -> Result<Solver> {
        Ok(Solver::with_transposition_table(
            TranspositionTable::with_capacity(1 << 20)?,
        ))
    }

    fn mirror_moves(moves: &str) -> String {
        moves
            .chars()
            .map(|c| match c.to_digit(10) {
                Some(column) => std::char::from_digit(WIDTH as u32 + 1 - column, 10).unwrap(),
                None => c,
            })
            .collect()
    }

    // solves every position of a test file with one solver, strong and weak
    fn check_test_data(name: &str, path: &str) -> Result<()> {
        let positions = read_test_data(path)?;
        assert!(!positions.is_empty());
        let mut solver = small_solver()?;

        let mut times = vec![];
        let mut posis = vec![];

        for (moves, score) in positions.iter() {
            let board = BitBoard::from_moves(moves)?;
            solver.reset_node_count();
            let start_time = Instant::now();
            let calc = solver.solve(&board, false);
            let finish_time = Instant::now();
            assert_eq!(calc, *score, "strong score of {}", moves);
            times.push(finish_time - start_time);
            posis.push(solver.node_count());

            let weak = solver.solve(&board, true);
            assert_eq!(weak, score.signum(), "weak score of {}", moves);
        }

        println!(
            "{}\nMean time: {:.6}ms, Mean no. of positions: {}",
            name,
            (times.iter().sum::<Duration>() / times.len() as u32).as_secs_f64() * 1000.0,
            posis.iter().sum::<usize>() as f64 / posis.len() as f64,
        );
        Ok(())
    }

    #[test]
    pub fn published_positions() -> Result<()> {
        check_test_data("Published", "test_data/published")
    }

    #[test]
    pub fn end_game() -> Result<()> {
        check_test_data("End game", "test_data/end_game")
    }

    #[test]
    pub fn late_game() -> Result<()> {
        check_test_data("Late game", "test_data/late_game")
    }

    #[test]
    pub fn middle_game() -> Result<()> {
        check_test_data("Middle game", "test_data/middle_game")
    }

    #[test]
    pub fn weak_search_matches_strong_sign() -> Result<()> {
        // separate solvers so neither search benefits from the other's table
        let mut strong = small_solver()?;
        let mut weak = small_solver()?;
        for (moves, _) in read_test_data("test_data/late_game")? {
            let board = BitBoard::from_moves(&moves)?;
            assert_eq!(
                weak.solve(&board, true),
                strong.solve(&board, false).signum(),
                "{}",
                moves
            );
        }
        Ok(())
    }

    #[test]
    pub fn solve_is_deterministic() -> Result<()> {
        let mut solver = small_solver()?;
        for (moves, _) in read_test_data("test_data/end_game")? {
            let board = BitBoard::from_moves(&moves)?;
            let first = solver.solve(&board, false);
            // the second call reuses the filled table
            assert_eq!(solver.solve(&board, false), first);
            solver.clear_transposition_table();
            assert_eq!(solver.solve(&board, false), first);
        }
        Ok(())
    }

    #[test]
    pub fn full_board_is_a_draw() -> Result<()> {
        let board = BitBoard::from_moves(DRAWN_GAME)?;
        assert_eq!(board.num_moves(), 42);
        assert!(board.is_full());
        assert!(board.is_draw());
        assert!((0..WIDTH).all(|column| !board.can_play(column)));

        let mut solver = small_solver()?;
        assert_eq!(solver.solve(&board, false), 0);
        assert_eq!(solver.solve(&board, true), 0);
        assert_eq!(solver.analyze(&board, false), [INVALID_MOVE; WIDTH]);
        assert!(best_columns(&solver.analyze(&board, false)).is_empty());

        let last_move = BitBoard::from_moves(&DRAWN_GAME[..41])?;
        assert!(!last_move.is_draw());
        assert_eq!(solver.solve(&last_move, false), 0);
        Ok(())
    }

    #[test]
    pub fn mirrored_positions_share_keys() -> Result<()> {
        let mut solver = small_solver()?;
        for (moves, score) in read_test_data("test_data/end_game")? {
            let board = BitBoard::from_moves(&moves)?;
            let mirrored = BitBoard::from_moves(mirror_moves(&moves))?;

            assert_eq!(board.mirror(), mirrored);
            assert_eq!(board.mirror_key(), mirrored.key());
            assert_eq!(board.canonical_key(), mirrored.canonical_key());
            assert_eq!(solver.solve(&mirrored, false), score);
        }

        // symmetric positions are their own mirror
        let board = BitBoard::from_moves("4444")?;
        assert_eq!(board.key(), board.mirror_key());
        Ok(())
    }

    #[test]
    pub fn analysis_matches_children() -> Result<()> {
        let mut solver = small_solver()?;
        for (moves, score) in read_test_data("test_data/late_game")? {
            let board = BitBoard::from_moves(&moves)?;
            for weak in [false, true].iter().copied() {
                let scores = solver.analyze(&board, weak);
                for column in 0..WIDTH {
                    match board.play(column) {
                        Ok(next) => assert_eq!(scores[column], -solver.solve(&next, weak)),
                        Err(MoveError::ColumnFull(_)) => assert_eq!(scores[column], INVALID_MOVE),
                        Err(err) => return Err(anyhow!("unexpected {} in {}", err, moves)),
                    }
                }
                let best = scores.iter().copied().max().unwrap();
                assert_eq!(best, solver.solve(&board, weak));
                if !weak {
                    assert_eq!(best, score);
                }
            }
        }
        Ok(())
    }

    #[test]
    pub fn analysis_finds_the_winning_move() -> Result<()> {
        let board = BitBoard::from_moves(ONE_WINNING_MOVE)?;
        assert!(board.can_win_next());
        assert!(board.is_winning_move(2));

        let mut solver = small_solver()?;
        let scores = solver.analyze(&board, false);
        assert_eq!(scores, [INVALID_MOVE, INVALID_MOVE, 6, -5, INVALID_MOVE, -5, -5]);
        assert_eq!(scores[2], (WIDTH as i32 * 6 + 1 - 31) / 2);
        assert_eq!(best_columns(&scores), vec![2]);
        assert_eq!(solver.solve(&board, false), 6);

        assert_eq!(
            solver.analyze(&board, true),
            [INVALID_MOVE, INVALID_MOVE, 1, -1, INVALID_MOVE, -1, -1]
        );

        // the winning move itself ends the game and is refused
        assert_eq!(board.play(2), Err(MoveError::GameOver(2)));
        Ok(())
    }

    #[test]
    pub fn fastest_win_scores_max() -> Result<()> {
        let board = BitBoard::from_moves("112233")?;
        let mut solver = small_solver()?;
        assert_eq!(solver.solve(&board, false), MAX_SCORE);
        assert_eq!(Solver::score_to_win_distance(&board, MAX_SCORE), 1);
        Ok(())
    }

    #[test]
    pub fn detects_alignments() -> Result<()> {
        // horizontal, vertical, and both diagonals
        let cases = [
            ("112233", 3),
            ("121212", 0),
            ("144734426523", 2),
            ("5636541735644", 3),
        ];
        for &(moves, column) in cases.iter() {
            let board = BitBoard::from_moves(moves)?;
            assert!(board.is_winning_move(column), "{}", moves);
            assert!(board.can_win_next());
            let winning: Vec<usize> = (0..WIDTH).filter(|&c| board.is_winning_move(c)).collect();
            assert_eq!(winning, vec![column], "{}", moves);
        }
        assert!(!BitBoard::new().can_win_next());
        Ok(())
    }

    #[test]
    pub fn illegal_moves_are_refused() -> Result<()> {
        // move after the game is won
        let err = BitBoard::from_moves("1212121").unwrap_err();
        assert_eq!(err.consumed, 6);
        assert_eq!(err.source, MoveError::GameOver(0));

        let err = BitBoard::from_moves("1111111").unwrap_err();
        assert_eq!(err.consumed, 6);
        assert_eq!(err.move_index(), 7);
        assert_eq!(err.token, '1');
        assert_eq!(err.source, MoveError::ColumnFull(0));

        for bad in ["0", "8", "a", " "].iter() {
            let err = BitBoard::from_moves(format!("44{}4", bad)).unwrap_err();
            assert_eq!(err.consumed, 2);
            assert!(matches!(err.source, MoveError::NotAColumn(_)));
        }

        // playing stops at the first bad move
        let mut board = BitBoard::new();
        assert_eq!(board.play_sequence("11111114"), 6);
        assert_eq!(board, BitBoard::from_moves("111111")?);
        assert!(!board.can_play(0));

        // refused moves leave the position untouched
        let before = board;
        assert_eq!(board.play(0), Err(MoveError::ColumnFull(0)));
        assert_eq!(board.play(WIDTH), Err(MoveError::OutOfRange(WIDTH)));
        assert!(board.after_moves("29").is_err());
        assert_eq!(board, before);
        Ok(())
    }

    #[test]
    pub fn position_encoding() -> Result<()> {
        let empty = BitBoard::new();
        assert_eq!(empty.key(), 0);
        assert_eq!(empty.num_moves(), 0);
        assert!((0..WIDTH).all(|column| empty.can_play(column)));

        let board = BitBoard::from_moves(ONE_WINNING_MOVE)?;
        assert_eq!(board.num_moves(), 31);
        assert_eq!(board.board_mask().count_ones() as usize, board.num_moves());
        assert_eq!(board.player_mask() & !board.board_mask(), 0);

        let board = BitBoard::from_moves("4435")?;
        assert_eq!(board.to_string(), ".......\n.......\n.......\n.......\n...O...\n..XXO..\n");
        Ok(())
    }

    #[test]
    pub fn opening_book_changes_nothing_but_speed() -> Result<()> {
        let positions = read_test_data("test_data/middle_game")?;
        let mut solver = small_solver()?;

        // book every child of the test positions
        let mut entries = Vec::new();
        for (moves, _) in positions.iter() {
            let board = BitBoard::from_moves(moves)?;
            for column in 0..WIDTH {
                if let Ok(next) = board.play(column) {
                    entries.push((next.canonical_key(), solver.solve(&next, false)));
                }
            }
        }
        let book = OpeningBook::from_entries(positions[0].0.len() + 1, entries);

        let mut plain = small_solver()?;
        let mut booked = small_solver()?.with_opening_book(book.clone());
        for (moves, score) in positions.iter() {
            let board = BitBoard::from_moves(moves)?;
            assert_eq!(book.lookup(&board), None);

            plain.reset_node_count();
            booked.reset_node_count();
            assert_eq!(booked.solve(&board, false), *score);
            assert_eq!(plain.solve(&board, false), *score);
            assert_eq!(booked.solve(&board, true), score.signum());
            println!(
                "{}: {} nodes with book, {} without",
                moves,
                booked.node_count(),
                plain.node_count()
            );

            for column in 0..WIDTH {
                if let Ok(next) = board.play(column) {
                    assert_eq!(book.lookup(&next), Some(booked.solve(&next, false)));
                    assert_eq!(book.lookup(&next.mirror()), book.lookup(&next));
                }
            }
        }
        Ok(())
    }

    #[test]
    pub fn generated_book_matches_search() -> Result<()> {
        let root = BitBoard::from_moves("4661166365643747314325")?;
        let book = OpeningBook::generate_from(&root, 4, 1 << 17, false)?;
        assert_eq!(book.depth(), root.num_moves() + 4);
        assert!(!book.is_empty());

        let mut plain = small_solver()?;
        let mut booked = small_solver()?.with_opening_book(book.clone());
        let plies = enumerate_positions(&root, book.depth());
        assert_eq!(plies.len(), 5);
        for positions in plies.iter() {
            for board in positions.iter() {
                let score = plain.solve(board, false);
                assert_eq!(book.lookup(board), Some(score), "{:?}", board);
                assert_eq!(book.lookup(&board.mirror()), Some(score));
                assert_eq!(booked.solve(board, false), score);
                assert_eq!(booked.solve(board, true), score.signum());
                assert_eq!(booked.analyze(board, false), plain.analyze(board, false));
            }
        }

        // one move past the book depth nothing is stored
        for board in plies[4].iter() {
            for column in 0..WIDTH {
                if let Ok(next) = board.play(column) {
                    assert_eq!(book.lookup(&next), None);
                }
            }
        }
        Ok(())
    }

    #[test]
    pub fn opening_book_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("connect4_book_{}.book", std::process::id()));

        let board = BitBoard::from_moves("4455")?;
        let book = OpeningBook::from_entries(4, vec![(board.canonical_key(), 3)]);
        book.save(&path)?;

        let mut solver = small_solver()?;
        assert!(solver.load_book(&path));
        assert_eq!(solver.opening_book().map(OpeningBook::len), Some(1));
        assert_eq!(solver.solve(&board, false), 3);
        assert_eq!(solver.solve(&board.mirror(), true), 1);

        // corrupt files are skipped like missing ones
        std::fs::write(&path, b"not a book")?;
        assert!(!solver.load_book(&path));
        assert!(solver.opening_book().is_none());
        std::fs::remove_file(&path)?;
        assert!(!solver.load_book(&path));

        // the solver still works without a book
        let board = BitBoard::from_moves("112233")?;
        assert_eq!(solver.solve(&board, false), 18);
        Ok(())
    }

    #[test]
    pub fn random_choice_among_best_columns() {
        let scores = [INVALID_MOVE, 2, -3, 2, INVALID_MOVE, 2, 0];
        assert_eq!(best_columns(&scores), vec![1, 3, 5]);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let column = choose_column(&scores, &mut rng).unwrap();
            assert!([1, 3, 5].contains(&column));
        }
        assert_eq!(choose_column(&[INVALID_MOVE; WIDTH], &mut rng), None);
    }

    #[test]
    #[ignore]
    pub fn full_search() -> Result<()> {
        let mut solver = Solver::new();
        let start_time = Instant::now();
        let calc = solver.solve(&BitBoard::new(), false);
        let time = start_time.elapsed();
        let posis = solver.node_count();

        println!(
            "Full game search\n Time: {:.6}s, No. of positions: {}, kpos/s: {}",
            time.as_secs_f64(),
            posis,
            posis as f64 / (1000.0 * time.as_secs_f64())
        );
        // the first player wins with their last tile
        assert_eq!(calc, 1);
        assert_eq!(solver.solve(&BitBoard::from_moves("4")?, false), -1);
        assert_eq!(solver.solve(&BitBoard::from_moves("4")?, true), -1);
        Ok(())
    }
}
