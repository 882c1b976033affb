use crate::logic::board::MoveInput;
use crate::logic::game::{ChessGame, Terminal};

#[test]
fn test_three_fold_repetition() {
    let mut game = ChessGame::new();

    let mut play = |from: &str, to: &str| game.play(&MoveInput::new(from, to)).is_ok();

    // 0. Start: position A (count 1)

    // Knights out and back: A recurs after every fourth ply.
    assert!(play("g1", "f3"));
    assert!(play("g8", "f6"));
    assert!(play("f3", "g1"));
    assert!(play("f6", "g8")); // A (count 2)

    assert!(play("g1", "f3"));
    assert!(play("g8", "f6"));
    assert!(play("f3", "g1"));
    assert!(play("f6", "g8")); // A (count 3)

    assert!(game.is_threefold_repetition());
    assert!(game.is_draw());
    assert_eq!(game.terminal(), Some(Terminal::Draw));
}

#[test]
fn test_two_occurrences_is_not_a_draw() {
    let mut game = ChessGame::new();

    for (from, to) in [("b1", "c3"), ("b8", "c6"), ("c3", "b1"), ("c6", "b8")] {
        assert!(game.play(&MoveInput::new(from, to)).is_ok());
    }

    assert!(!game.is_threefold_repetition());
    assert!(game.terminal().is_none());
}

#[test]
fn test_reset_forgets_repetitions() {
    let mut game = ChessGame::new();
    for _ in 0..2 {
        for (from, to) in [("g1", "f3"), ("g8", "f6"), ("f3", "g1"), ("f6", "g8")] {
            assert!(game.play(&MoveInput::new(from, to)).is_ok());
        }
    }
    assert!(game.is_threefold_repetition());

    game.reset();
    assert!(!game.is_threefold_repetition());
}
